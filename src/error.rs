use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the value engine and the network modules.
///
/// Division by zero and overflow are not errors: they flow through the graph
/// as `inf`/`NaN` like any other float.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid exponent {0}: only integral exponents are supported")]
    InvalidExponent(f64),

    #[error("Bad weights: got {actual}, need {expected}")]
    ParameterCount { expected: usize, actual: usize },

    #[error("Input width mismatch: expected {expected}, got {actual}")]
    InputWidth { expected: usize, actual: usize },

    #[error("Output width mismatch: expected {expected}, got {actual}")]
    OutputWidth { expected: usize, actual: usize },

    #[error("Graph rendering failed: {0}")]
    Graph(String),
}

/// Errors produced while reading the run configuration from the environment.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("config validation: {0}")]
    Validation(String),

    #[error("env var {key}: {message}")]
    EnvVar { key: String, message: String },

    #[error("env var {key}={value:?}: {message}")]
    Parse {
        key: String,
        value: String,
        message: String,
    },
}

/// Errors produced while loading samples or weights from disk.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("{0:?} contains no records")]
    Empty(PathBuf),
}

/// Top-level error for a training run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to write {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_count_message() {
        let e = EngineError::ParameterCount {
            expected: 337,
            actual: 336,
        };
        assert_eq!(e.to_string(), "Bad weights: got 336, need 337");
    }

    #[test]
    fn test_run_error_wraps_config_error() {
        let e: RunError = ConfigError::Validation("steps must be greater than 0".to_string()).into();
        assert!(matches!(e, RunError::Config(_)));
        assert_eq!(e.to_string(), "config validation: steps must be greater than 0");
    }
}
