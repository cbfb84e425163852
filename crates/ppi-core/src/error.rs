use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read retailers file {path}: {source}")]
    RetailersFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse retailers YAML: {0}")]
    RetailersFileParse(#[source] serde_yaml::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Retailer '{retailer}' {reason}")]
    InvalidRetailer { retailer: String, reason: String },

    #[error("Retailer '{retailer}' has unsupported action '{action}'")]
    UnsupportedAction { retailer: String, action: String },

    #[error("Retailer '{retailer}' step {index} ({action}): {reason}")]
    InvalidStep {
        retailer: String,
        index: usize,
        action: String,
        reason: String,
    },

    #[error("Retailer '{retailer}' field '{field}' {reason}")]
    InvalidField {
        retailer: String,
        field: String,
        reason: String,
    },

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
