//! Error types for packaging operations.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while packaging a plugin.
#[derive(Debug, Error)]
pub enum PackError {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Manifest validation error.
    #[error("invalid manifest: {0}")]
    Validation(String),

    /// The same relative path is present in two or more asset sources.
    #[error("asset conflict: {} path(s) present in multiple sources", conflicts.len())]
    AssetConflict {
        /// Every conflicting path with the labels of the sources carrying it.
        conflicts: Vec<AssetConflict>,
    },

    /// Enumerated input exceeds the configured archive limit.
    #[error("archive {dimension} limit exceeded: {actual} > {limit}")]
    LimitExceeded {
        /// Which limit was breached: "entry count" or "byte".
        dimension: &'static str,
        /// Running total at the moment of the breach.
        actual: u64,
        /// Configured ceiling.
        limit: u64,
    },

    /// A required packaging input is missing from the project.
    #[error("missing input: {0}")]
    MissingInput(String),
}

/// One conflicting relative path and the asset sources that carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetConflict {
    /// Forward-slash relative path of the conflicting file.
    pub path: String,
    /// Labels of every source containing the path.
    pub sources: Vec<String>,
}

impl fmt::Display for AssetConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {})", self.path, self.sources.join(", "))
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;

    #[test]
    fn PackError___io___displays_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PackError = io_err.into();

        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn PackError___validation___displays_message() {
        let err = PackError::Validation("id is missing".to_string());

        assert_eq!(err.to_string(), "invalid manifest: id is missing");
    }

    #[test]
    fn PackError___asset_conflict___counts_paths() {
        let err = PackError::AssetConflict {
            conflicts: vec![
                AssetConflict {
                    path: "logo.png".to_string(),
                    sources: vec!["project".to_string(), "source".to_string()],
                },
                AssetConflict {
                    path: "style.css".to_string(),
                    sources: vec!["build".to_string(), "project".to_string()],
                },
            ],
        };

        assert!(err.to_string().contains("2 path(s)"));
    }

    #[test]
    fn PackError___limit_exceeded___displays_all_fields() {
        let err = PackError::LimitExceeded {
            dimension: "byte",
            actual: 2048,
            limit: 1024,
        };

        let msg = err.to_string();
        assert!(msg.contains("byte"));
        assert!(msg.contains("2048"));
        assert!(msg.contains("1024"));
    }

    #[test]
    fn AssetConflict___display___lists_sources() {
        let conflict = AssetConflict {
            path: "icons/app.svg".to_string(),
            sources: vec!["project".to_string(), "source".to_string()],
        };

        assert_eq!(conflict.to_string(), "icons/app.svg (in project, source)");
    }

    #[test]
    fn PackError___from_json_error___converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: PackError = json_err.into();

        assert!(matches!(err, PackError::Json(_)));
    }
}
