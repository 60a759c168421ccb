//! Error types for smsfwd

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid number pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Forward failed: {0}")]
    Forward(String),

    #[error("mmcli error: {0}")]
    Mmcli(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Forward("mail: spawn failed".to_string());
        assert!(err.to_string().contains("spawn failed"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_pattern_error_mentions_pattern() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = Error::Pattern {
            pattern: "(".to_string(),
            source,
        };
        assert!(err.to_string().contains("\"(\""));
    }
}
