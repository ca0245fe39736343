//! Error types for surface reconstruction

use thiserror::Error;

/// Main error type for surface reconstruction operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("The point cloud file \"{path}\" was not found")]
    FileNotFound { path: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("Invalid parameter for filter \"{filter}\": {message}")]
    InvalidParameter { filter: String, message: String },

    #[error("Unknown filter \"{name}\"")]
    UnknownFilter { name: String },

    #[error(
        "The method type \"{method}\" was not registered. \
         Use SurfaceReconstruction::register_type() to register this type"
    )]
    NotRegistered { method: String },

    #[error("The type \"{name}\" was registered!")]
    AlreadyRegistered { name: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`]
    pub fn invalid_parameter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            filter: filter.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for surface reconstruction operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_registered_message_names_register_type() {
        let err = Error::NotRegistered { method: "otherlibrary".to_string() };
        let msg = err.to_string();
        assert!(msg.contains("\"otherlibrary\" was not registered"));
        assert!(msg.contains("register_type()"));
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
    }
}
