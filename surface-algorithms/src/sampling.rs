//! Poisson-disk subsampling of point sets

use crate::nearest_neighbor::NeighborIndex;
use surface_core::{bounds_of, Point3f};

/// Binary-search steps used to hit an exact sample count
const EXACT_COUNT_ITERATIONS: usize = 24;

/// Parameters for Poisson-disk subsampling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonDiskSampling {
    /// Target number of samples
    pub sample_count: usize,
    /// Minimum distance between samples; `0` derives it from `sample_count`
    pub radius: f32,
    /// Search the radius until the result has exactly `sample_count` samples
    pub exact_count: bool,
}

impl Default for PoissonDiskSampling {
    fn default() -> Self {
        Self {
            sample_count: 1000,
            radius: 0.0,
            exact_count: false,
        }
    }
}

/// Radius that spreads `sample_count` disks over a sheet spanning the bounding box
pub fn poisson_disk_radius(points: &[Point3f], sample_count: usize) -> f32 {
    let (min, max) = bounds_of(points);
    let diagonal = (max - min).magnitude();
    let area = diagonal * diagonal * 0.5;
    (area / (0.7 * std::f32::consts::PI * sample_count.max(1) as f32)).sqrt()
}

/// Accept points in input order, each one covering its `radius` neighbourhood
fn greedy_samples(points: &[Point3f], index: &NeighborIndex, radius: f32) -> Vec<usize> {
    let mut covered = vec![false; points.len()];
    let mut samples = Vec::new();
    for (i, point) in points.iter().enumerate() {
        if covered[i] {
            continue;
        }
        samples.push(i);
        for (j, _) in index.within_radius(point, radius) {
            covered[j] = true;
        }
    }
    samples
}

/// Indices of a subset of `points` in which no two samples are closer than the radius.
///
/// Samples are accepted greedily in input order. With `exact_count` the radius is
/// bisected until the subset has at least `sample_count` members, then it is truncated.
pub fn poisson_disk_subsample(points: &[Point3f], params: &PoissonDiskSampling) -> Vec<usize> {
    if points.is_empty() || params.sample_count == 0 {
        return Vec::new();
    }
    if params.radius <= 0.0 && params.sample_count >= points.len() {
        return (0..points.len()).collect();
    }

    let radius = if params.radius > 0.0 {
        params.radius
    } else {
        poisson_disk_radius(points, params.sample_count)
    };

    let index = NeighborIndex::new(points);
    if !params.exact_count {
        let samples = greedy_samples(points, &index, radius);
        log::debug!(
            "Poisson-disk radius {:.5} kept {} of {} points",
            radius,
            samples.len(),
            points.len()
        );
        return samples;
    }

    // Smaller radius, more samples
    let mut low = 0.0f32;
    let mut high = radius.max(f32::EPSILON);
    while greedy_samples(points, &index, high).len() > params.sample_count && high < f32::MAX / 4.0 {
        low = high;
        high *= 2.0;
    }

    let mut best = greedy_samples(points, &index, low);
    for _ in 0..EXACT_COUNT_ITERATIONS {
        let mid = 0.5 * (low + high);
        let samples = greedy_samples(points, &index, mid);
        if samples.len() >= params.sample_count {
            low = mid;
            best = samples;
            if best.len() == params.sample_count {
                break;
            }
        } else {
            high = mid;
        }
    }

    best.truncate(params.sample_count);
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jittered_grid(n: usize) -> Vec<Point3f> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let x = i as f32 * 0.1 + j as f32 * 0.0007;
                let y = j as f32 * 0.1 + i as f32 * 0.0011;
                points.push(Point3f::new(x, y, 0.01 * ((i * j) % 7) as f32));
            }
        }
        points
    }

    #[test]
    fn test_keeps_everything_when_target_exceeds_input() {
        let points = jittered_grid(5);
        let params = PoissonDiskSampling {
            sample_count: 1000,
            ..Default::default()
        };
        assert_eq!(poisson_disk_subsample(&points, &params).len(), points.len());
    }

    #[test]
    fn test_explicit_radius_separates_samples() {
        let points = jittered_grid(12);
        let params = PoissonDiskSampling {
            sample_count: 10,
            radius: 0.25,
            exact_count: false,
        };
        let samples = poisson_disk_subsample(&points, &params);
        assert!(!samples.is_empty());
        assert!(samples.len() < points.len());
        for (a, &i) in samples.iter().enumerate() {
            for &j in &samples[a + 1..] {
                assert!((points[i] - points[j]).magnitude() > 0.25);
            }
        }
    }

    #[test]
    fn test_exact_count() {
        let points = jittered_grid(15);
        let params = PoissonDiskSampling {
            sample_count: 40,
            radius: 0.0,
            exact_count: true,
        };
        assert_eq!(poisson_disk_subsample(&points, &params).len(), 40);
    }

    #[test]
    fn test_flat_grid_with_shared_coordinates() {
        // 30 x 30 at z = 0, spacing 0.1: 30 points share every x and y value
        let points: Vec<Point3f> = (0..30)
            .flat_map(|i| (0..30).map(move |j| Point3f::new(i as f32 * 0.1, j as f32 * 0.1, 0.0)))
            .collect();

        let spaced = poisson_disk_subsample(
            &points,
            &PoissonDiskSampling {
                sample_count: 10,
                radius: 0.15,
                exact_count: false,
            },
        );
        // every other row and column survives
        assert_eq!(spaced.len(), 15 * 15);

        let exact = poisson_disk_subsample(
            &points,
            &PoissonDiskSampling {
                sample_count: 100,
                radius: 0.0,
                exact_count: true,
            },
        );
        assert_eq!(exact.len(), 100);
    }

    #[test]
    fn test_empty_input() {
        assert!(poisson_disk_subsample(&[], &PoissonDiskSampling::default()).is_empty());
    }
}
