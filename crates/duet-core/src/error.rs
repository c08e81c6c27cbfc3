//! Error types for Duet Core

use thiserror::Error;

/// Result type alias using Duet Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the query pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unparsable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Relation / column storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Membership index errors
    #[error("Index error: {0}")]
    Index(String),

    /// Pipeline construction errors (unknown binding, column or relation)
    #[error("Plan error: {0}")]
    Plan(String),

    /// Native code generation errors
    #[error("Codegen error: {0}")]
    Codegen(String),

    /// Interpreted and compiled execution disagreed
    #[error("Result mismatch: interpreted `{interpreted}`, compiled `{compiled}`")]
    ResultMismatch {
        /// Rendered interpreted result
        interpreted: String,
        /// Rendered compiled result
        compiled: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an index error
    pub fn index(msg: impl Into<String>) -> Self {
        Self::Index(msg.into())
    }

    /// Create a plan error
    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan(msg.into())
    }

    /// Create a codegen error
    pub fn codegen(msg: impl Into<String>) -> Self {
        Self::Codegen(msg.into())
    }
}

impl From<cranelift_module::ModuleError> for Error {
    fn from(err: cranelift_module::ModuleError) -> Self {
        Self::Codegen(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::plan("binding 3 out of range").to_string(),
            "Plan error: binding 3 out of range"
        );
        assert_eq!(Error::codegen("bad isa").to_string(), "Codegen error: bad isa");
    }

    #[test]
    fn test_mismatch_display() {
        let err = Error::ResultMismatch {
            interpreted: "110".to_string(),
            compiled: "NULL".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Result mismatch: interpreted `110`, compiled `NULL`"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
