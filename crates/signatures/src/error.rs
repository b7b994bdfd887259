use thiserror::Error;

/// Result type for signature engine operations
pub type Result<T> = std::result::Result<T, SignatureError>;

/// Errors surfaced by the signature engine.
///
/// Parsing, merging and diffing never fail; these cover configuration and the
/// persistence collaborator.
#[derive(Error, Debug)]
pub enum SignatureError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file is not valid TOML
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The persistence store rejected or failed a call
    #[error("Store error for system {system_id}: {message}")]
    Store { system_id: String, message: String },

    /// IO error occurred
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SignatureError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a store error
    pub fn store(system_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            system_id: system_id.into(),
            message: msg.into(),
        }
    }
}
