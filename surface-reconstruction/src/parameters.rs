//! Parameter schemas, flattening, and per-stage overrides
//!
//! Each backend describes its stages as a schema: an ordered map from stage (filter)
//! name to a list of `{name, description, value}` entries. Before dispatch the schema
//! is flattened into a [`FilterChain`] of `name -> value` maps, and the caller's
//! overrides are merged in per stage.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use surface_core::{Error, Result};

/// Flat keyword arguments of one stage
pub type KeyValues = serde_json::Map<String, Value>;

/// One documented parameter of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub value: Value,
}

/// Shorthand for building schema tables
pub fn spec(name: &str, description: &str, value: impl Into<Value>) -> ParameterSpec {
    ParameterSpec {
        name: name.to_string(),
        description: description.to_string(),
        value: value.into(),
    }
}

/// The three shapes a stage entry may take in a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterParameters {
    /// `[{name, description, value}, ...]`
    List(Vec<ParameterSpec>),
    /// A single `{name, description, value}` entry
    Single(ParameterSpec),
    /// Already-flat keyword arguments, copied as they are
    Map(KeyValues),
}

impl FilterParameters {
    /// Flatten into `name -> value`
    pub fn key_values(&self) -> KeyValues {
        match self {
            FilterParameters::List(specs) => specs
                .iter()
                .map(|s| (s.name.clone(), s.value.clone()))
                .collect(),
            FilterParameters::Single(s) => {
                let mut map = KeyValues::new();
                map.insert(s.name.clone(), s.value.clone());
                map
            }
            FilterParameters::Map(map) => map.clone(),
        }
    }
}

/// Ordered stage declarations of a backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "KeyValues", into = "KeyValues")]
pub struct ParameterSchema {
    filters: Vec<(String, FilterParameters)>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage; stages run in the order they are added
    pub fn with_filter(mut self, name: &str, parameters: FilterParameters) -> Self {
        match self.filters.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = parameters,
            None => self.filters.push((name.to_string(), parameters)),
        }
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn get(&self, name: &str) -> Option<&FilterParameters> {
        self.filters.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Flatten every stage into keyword arguments, keeping declaration order
    pub fn key_values(&self) -> FilterChain {
        FilterChain {
            stages: self
                .filters
                .iter()
                .map(|(name, params)| (name.clone(), params.key_values()))
                .collect(),
        }
    }
}

impl TryFrom<KeyValues> for ParameterSchema {
    type Error = serde_json::Error;

    fn try_from(map: KeyValues) -> std::result::Result<Self, Self::Error> {
        let filters = map
            .into_iter()
            .map(|(name, value)| {
                serde_json::from_value::<FilterParameters>(value).map(|params| (name, params))
            })
            .collect::<std::result::Result<Vec<_>, serde_json::Error>>()?;
        Ok(Self { filters })
    }
}

impl From<ParameterSchema> for KeyValues {
    fn from(schema: ParameterSchema) -> Self {
        schema
            .filters
            .into_iter()
            .map(|(name, params)| {
                let value = match params {
                    FilterParameters::List(specs) => Value::Array(
                        specs
                            .into_iter()
                            .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
                            .collect(),
                    ),
                    FilterParameters::Single(s) => serde_json::to_value(s).unwrap_or(Value::Null),
                    FilterParameters::Map(map) => Value::Object(map),
                };
                (name, value)
            })
            .collect()
    }
}

/// `null`, `false`, `0`, `""`, `[]` and `{}` all switch a stage off
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Stages with their flat keyword arguments, in dispatch order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    stages: Vec<(String, KeyValues)>,
}

impl FilterChain {
    pub fn from_stages(stages: Vec<(String, KeyValues)>) -> Self {
        Self { stages }
    }

    pub fn get(&self, name: &str) -> Option<&KeyValues> {
        self.stages.iter().find(|(n, _)| n == name).map(|(_, kv)| kv)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeyValues)> {
        self.stages.iter().map(|(n, kv)| (n.as_str(), kv))
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the stages [`FilterChain::for_each_stage`] would dispatch
    pub fn enabled_stages(&self) -> Vec<&str> {
        self.iter()
            .filter(|(_, kv)| !kv.is_empty())
            .map(|(n, _)| n)
            .collect()
    }

    /// Merge per-stage overrides into a copy of this chain.
    ///
    /// A falsy override (`null`, `false`, `{}`, ...) disables the stage, an object
    /// updates its keys, anything else is rejected. Overrides for stages the chain
    /// does not declare are ignored.
    pub fn merge(&self, overrides: &KeyValues) -> Result<FilterChain> {
        for name in overrides.keys() {
            if self.get(name).is_none() {
                log::warn!("Ignoring parameters for undeclared filter \"{}\"", name);
            }
        }

        let mut merged = self.clone();
        for (name, kv) in merged.stages.iter_mut() {
            let Some(update) = overrides.get(name.as_str()) else {
                continue;
            };
            if is_falsy(update) {
                kv.clear();
                continue;
            }
            match update {
                Value::Object(map) => {
                    for (key, value) in map {
                        kv.insert(key.clone(), value.clone());
                    }
                }
                other => {
                    return Err(Error::invalid_parameter(
                        name.as_str(),
                        format!("expected an object of parameters, got {}", other),
                    ))
                }
            }
        }
        Ok(merged)
    }

    /// Call `callback` for every stage with non-empty arguments, in order.
    ///
    /// Stops at the first error. Returns how many stages were dispatched.
    pub fn for_each_stage<F>(&self, mut callback: F) -> Result<usize>
    where
        F: FnMut(&str, &KeyValues) -> Result<()>,
    {
        let mut dispatched = 0;
        for (name, kv) in &self.stages {
            if kv.is_empty() {
                log::debug!("Skipping disabled filter \"{}\"", name);
                continue;
            }
            callback(name, kv)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }
}

/// Decode a stage's keyword arguments into its typed parameter struct
pub fn decode_stage<T: DeserializeOwned>(filter: &str, kv: &KeyValues) -> Result<T> {
    serde_json::from_value(Value::Object(kv.clone()))
        .map_err(|e| Error::invalid_parameter(filter, e.to_string()))
}

/// Arguments of one `poisson_mesh` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoissonParams {
    /// Write the resulting mesh to the output file
    pub save_file: bool,
    /// Overrides the output file given at construction
    pub output_file: Option<PathBuf>,
    /// Per-stage overrides, keyed by filter name
    pub filters: Option<KeyValues>,
}

impl Default for PoissonParams {
    fn default() -> Self {
        Self {
            save_file: true,
            output_file: None,
            filters: None,
        }
    }
}

impl PoissonParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_saving(mut self) -> Self {
        self.save_file = false;
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_filters(mut self, filters: KeyValues) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Override (or, with a falsy value, disable) a single stage
    pub fn with_filter(mut self, name: &str, parameters: Value) -> Self {
        self.filters
            .get_or_insert_with(KeyValues::new)
            .insert(name.to_string(), parameters);
        self
    }

    /// Parse either a full `{"filters": {...}, "save_file": ..}` document or a bare
    /// filters object such as `{"estimate_normals": {...}, ...}`
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Object(map) = value else {
            return Err(Error::invalid_parameter(
                "filters",
                "expected a JSON object".to_string(),
            ));
        };

        let is_document = ["filters", "save_file", "output_file"]
            .iter()
            .any(|key| map.contains_key(*key));
        if is_document {
            Ok(serde_json::from_value(Value::Object(map))?)
        } else {
            Ok(Self::default().with_filters(map))
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ParameterSchema {
        ParameterSchema::new()
            .with_filter(
                "estimate_normals",
                FilterParameters::List(vec![
                    spec("fast_normal_computation", "Fast normal estimation", true),
                    spec("normals", "Points normals", json!([1, 3])),
                ]),
            )
            .with_filter(
                "orient",
                FilterParameters::Single(spec("k", "Nearest neighbors", 100)),
            )
            .with_filter(
                "poisson",
                FilterParameters::Map(json!({"depth": 8, "scale": 1.1}).as_object().unwrap().clone()),
            )
    }

    fn overrides(value: Value) -> KeyValues {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_flattening_all_three_shapes() {
        let chain = schema().key_values();
        assert_eq!(chain.len(), 3);
        assert_eq!(
            chain.get("estimate_normals").unwrap(),
            &overrides(json!({"fast_normal_computation": true, "normals": [1, 3]}))
        );
        assert_eq!(chain.get("orient").unwrap(), &overrides(json!({"k": 100})));
        assert_eq!(chain.get("poisson").unwrap()["depth"], json!(8));
    }

    #[test]
    fn test_schema_json_keeps_declaration_order() {
        let json = serde_json::to_string(&schema()).unwrap();
        let estimate = json.find("estimate_normals").unwrap();
        let orient = json.find("orient").unwrap();
        let poisson = json.find("poisson").unwrap();
        assert!(estimate < orient && orient < poisson);

        let parsed = ParameterSchema::from_json(&json).unwrap();
        assert_eq!(parsed, schema());
        let names: Vec<&str> = parsed.filter_names().collect();
        assert_eq!(names, vec!["estimate_normals", "orient", "poisson"]);
    }

    #[test]
    fn test_dict_with_name_and_value_is_a_single_spec() {
        let parsed = ParameterSchema::from_json(r#"{"a": {"name": "k", "value": 5}}"#).unwrap();
        assert!(matches!(parsed.get("a"), Some(FilterParameters::Single(_))));
        assert_eq!(parsed.key_values().get("a").unwrap(), &overrides(json!({"k": 5})));
    }

    #[test]
    fn test_merge_updates_and_disables() {
        let chain = schema().key_values();
        let merged = chain
            .merge(&overrides(json!({
                "estimate_normals": {"fast_normal_computation": false},
                "orient": false,
                "unknown_stage": {"x": 1}
            })))
            .unwrap();

        let estimate = merged.get("estimate_normals").unwrap();
        assert_eq!(estimate["fast_normal_computation"], json!(false));
        assert_eq!(estimate["normals"], json!([1, 3]));
        assert!(merged.get("orient").unwrap().is_empty());
        assert!(merged.get("unknown_stage").is_none());
        assert_eq!(merged.enabled_stages(), vec!["estimate_normals", "poisson"]);

        // the source chain is left untouched
        assert_eq!(chain.get("orient").unwrap()["k"], json!(100));
    }

    #[test]
    fn test_merge_rejects_non_object_override() {
        let err = schema()
            .key_values()
            .merge(&overrides(json!({"poisson": 5})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { ref filter, .. } if filter == "poisson"));

        // `true` does not mean "keep the defaults"; leaving the stage out does
        let err = schema()
            .key_values()
            .merge(&overrides(json!({"poisson": true})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[test]
    fn test_for_each_stage_skips_empty_and_stops_on_error() {
        let chain = schema()
            .key_values()
            .merge(&overrides(json!({"orient": null})))
            .unwrap();

        let mut seen = Vec::new();
        let count = chain
            .for_each_stage(|name, _| {
                seen.push(name.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen, vec!["estimate_normals", "poisson"]);

        let result = chain.for_each_stage(|name, _| {
            Err(Error::UnknownFilter { name: name.to_string() })
        });
        assert!(matches!(result, Err(Error::UnknownFilter { ref name }) if name == "estimate_normals"));
    }

    #[test]
    fn test_decode_stage_reports_filter() {
        #[derive(Debug, Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Orient {
            k: usize,
        }
        let ok: Orient = decode_stage("orient", &overrides(json!({"k": 7}))).unwrap();
        assert_eq!(ok.k, 7);

        let err = decode_stage::<Orient>("orient", &overrides(json!({"kk": 7}))).unwrap_err();
        assert!(err.to_string().contains("\"orient\""));
    }

    #[test]
    fn test_poisson_params_from_bare_and_full_json() {
        let bare = PoissonParams::from_json(r#"{"orient": {"k": 3}}"#).unwrap();
        assert!(bare.save_file);
        assert_eq!(bare.filters.unwrap()["orient"], json!({"k": 3}));

        let full = PoissonParams::from_json(
            r#"{"save_file": false, "output_file": "out.ply", "filters": {"orient": false}}"#,
        )
        .unwrap();
        assert!(!full.save_file);
        assert_eq!(full.output_file, Some(PathBuf::from("out.ply")));
        assert_eq!(full.filters.unwrap()["orient"], json!(false));

        assert!(PoissonParams::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_poisson_params_builder() {
        let params = PoissonParams::new()
            .without_saving()
            .with_filter("orient", json!({"k": 4}))
            .with_filter("poisson", Value::Null);
        assert!(!params.save_file);
        let filters = params.filters.unwrap();
        assert_eq!(filters.len(), 2);
        assert!(filters["poisson"].is_null());
    }
}
