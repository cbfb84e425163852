use ppi_core::WaitPolicy;
use thiserror::Error;

/// Failures reported by a [`crate::Page`] driver.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out after {timeout_ms}ms {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("invalid selector \"{selector}\": {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("page driver error: {0}")]
    Driver(String),
}

impl PageError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Timeout { .. })
    }
}

/// Failures of a single target's scrape.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Hard (HTTP 404) or soft (not-found selector) missing product page.
    #[error("{message}")]
    NotFound {
        http_status: Option<u16>,
        message: String,
    },

    #[error("Retailer '{retailer}' required field '{field}' not found (tried selectors: {selectors:?})")]
    MissingField {
        retailer: String,
        field: String,
        selectors: Vec<String>,
    },

    #[error("No 'goto' step in flow for retailer '{retailer}'")]
    MissingGoto { retailer: String },

    #[error("URL template \"{template}\" has a bad placeholder '{key}'")]
    Template { template: String, key: String },

    #[error("navigation to {url} timed out after {timeout_ms}ms waiting for {wait_policy}")]
    NavigationTimeout {
        url: String,
        wait_policy: WaitPolicy,
        timeout_ms: u64,
    },

    #[error(transparent)]
    Page(#[from] PageError),

    #[error("Missing retailer_id in targets row")]
    MissingRetailerId,

    #[error("Missing product_id in targets row")]
    MissingProductId,

    #[error("Retailer '{0}' not found in config")]
    UnknownRetailer(String),
}

impl FlowError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, FlowError::NotFound { .. })
    }

    /// HTTP status carried by a not-found failure, if any.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FlowError::NotFound { http_status, .. } => *http_status,
            _ => None,
        }
    }

    /// Whether a `retry` step may re-attempt after this failure.
    ///
    /// Not-found pages and configuration-shaped problems come back the same
    /// on every attempt.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            FlowError::MissingField { .. }
                | FlowError::NavigationTimeout { .. }
                | FlowError::Page(_)
        )
    }
}
