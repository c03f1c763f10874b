use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the abuse filter engine
#[derive(Error, Debug)]
pub enum AbuseFilterError {
    /// Unusable configuration or environment
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every problem found by `ConfigValidator`
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// A duration or timestamp that could not be turned into an expiry
    #[error("Invalid expiry: '{0}'")]
    InvalidExpiry(String),

    /// Malformed consequence parameters declared by a filter
    #[error("Invalid parameters for '{action}' on filter {filter}: {message}")]
    InvalidParameters {
        filter: String,
        action: String,
        message: String,
    },

    /// Consequence name with no registered constructor
    #[error("Unknown consequence: {0}")]
    UnknownConsequence(String),

    /// Filter key that does not parse or does not exist
    #[error("Filter not found: {key}")]
    FilterNotFound { key: String },

    /// Abuse log entry not found
    #[error("Abuse log entry not found: {id}")]
    LogEntryNotFound { id: i64 },

    /// Filesystem failure, with what was being attempted
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Hit files, variable dumps and stored action maps
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One failed configuration check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted key, e.g. `range_block.ipv4_prefix`
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for abuse filter operations
pub type Result<T> = std::result::Result<T, AbuseFilterError>;
