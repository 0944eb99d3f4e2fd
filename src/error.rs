use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("Missing credential: set {0}")]
    MissingCredential(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Errors returned by the remote alert service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Alert service returned error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Alert not found: {0}")]
    NotFound(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Errors that abort a reconciliation run
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Unsupported query shape for alert '{0}': only AND-joined string queries can be decomposed")]
    UnsupportedQuery(String),

    #[error("Composite alert '{0}' has no team tag to give its sub-alerts")]
    MissingTeam(String),

    #[error("Remote call failed: {0}")]
    Service(#[from] ServiceError),
}
