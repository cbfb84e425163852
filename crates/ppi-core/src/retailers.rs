//! Retailer flow definitions.
//!
//! Two shapes live here. [`RetailerDefinition`] mirrors the YAML file loosely
//! so that shape problems can be reported with the retailer id attached, and
//! [`RetailerConfig`] is the validated, typed flow produced by
//! [`crate::normalize_retailers`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

pub const DEFAULT_GOTO_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WAIT_FOR_SELECTOR_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WAIT_FOR_TIMEOUT_MS: u64 = 1_000;

/// Page readiness condition a navigation waits for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitPolicy {
    #[default]
    DomContentLoaded,
    NetworkIdle,
    Load,
}

impl std::fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitPolicy::DomContentLoaded => write!(f, "domcontentloaded"),
            WaitPolicy::NetworkIdle => write!(f, "networkidle"),
            WaitPolicy::Load => write!(f, "load"),
        }
    }
}

/// Element state a `wait_for_selector` step blocks on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    Attached,
    #[default]
    Visible,
}

impl std::fmt::Display for WaitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitState::Attached => write!(f, "attached"),
            WaitState::Visible => write!(f, "visible"),
        }
    }
}

// ---------------------------------------------------------------------------
// Loose on-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetailerDefinition {
    pub base_url: String,
    /// Kept untyped so a non-list flow is reported against its retailer.
    pub flow: Option<serde_yaml::Value>,
    pub goto_wait_until: Option<WaitPolicy>,
    pub goto_timeout_ms: Option<u64>,
    pub not_found: Option<NotFoundDefinition>,
    pub pricing: Option<PricingDefinition>,
    pub discount: Option<DiscountDefinition>,
    pub unit_price: Option<UnitPriceDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StepDefinition {
    pub action: Option<String>,
    pub url: Option<String>,
    pub wait_until: Option<WaitPolicy>,
    pub timeout_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub selector: Option<String>,
    pub state: Option<WaitState>,
    pub limit: Option<i64>,
    pub fields: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FieldDefinition {
    pub selector: Option<String>,
    pub selectors_priority: Option<Vec<String>>,
    pub optional: Option<bool>,
    pub discounted_price_override: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NotFoundDefinition {
    pub any_selectors: Vec<String>,
}

/// Legacy `pricing:` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PricingDefinition {
    pub final_price: Option<FinalPriceDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FinalPriceDefinition {
    pub selectors_priority: Option<Vec<String>>,
}

/// Legacy `discount:` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DiscountDefinition {
    pub selector: Option<String>,
    pub optional: Option<bool>,
    pub discounted_price_override: Option<bool>,
}

/// Legacy `unit_price:` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UnitPriceDefinition {
    pub selector: Option<String>,
    pub optional: Option<bool>,
}

// ---------------------------------------------------------------------------
// Validated shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetailerConfig {
    pub base_url: String,
    pub flow: Vec<FlowStep>,
    pub goto_wait_policy: WaitPolicy,
    pub goto_timeout_ms: u64,
    /// Selectors whose presence marks a soft not-found page.
    pub not_found_selectors: Vec<String>,
}

impl RetailerConfig {
    /// Template of the first `goto` step, which defines the target URL.
    #[must_use]
    pub fn first_goto_template(&self) -> Option<&str> {
        self.flow.iter().find_map(|step| match step {
            FlowStep::Goto { url_template, .. } => Some(url_template.as_str()),
            _ => None,
        })
    }

    /// Largest navigation or selector-wait budget any step can spend.
    #[must_use]
    pub fn longest_timeout_ms(&self) -> u64 {
        self.flow
            .iter()
            .filter_map(|step| match step {
                FlowStep::Goto { timeout_ms, .. } => {
                    Some(timeout_ms.unwrap_or(self.goto_timeout_ms))
                }
                FlowStep::WaitForSelector { timeout_ms, .. } => Some(*timeout_ms),
                _ => None,
            })
            .fold(self.goto_timeout_ms, u64::max)
    }

    /// Names of every field declared by the flow's extract steps, in order.
    #[must_use]
    pub fn extract_field_names(&self) -> Vec<&str> {
        self.flow
            .iter()
            .filter_map(|step| match step {
                FlowStep::Extract { fields } => Some(fields),
                _ => None,
            })
            .flatten()
            .map(|field| field.name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    Goto {
        url_template: String,
        wait_policy: Option<WaitPolicy>,
        timeout_ms: Option<u64>,
    },
    WaitForSelector {
        selector: String,
        state: WaitState,
        timeout_ms: u64,
    },
    WaitForTimeout {
        duration_ms: u64,
    },
    Extract {
        fields: Vec<ExtractField>,
    },
    /// Steps after this one are re-attempted on failure, up to `limit` tries.
    Retry {
        limit: u32,
    },
}

impl FlowStep {
    /// The YAML action tag for this step.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            FlowStep::Goto { .. } => "goto",
            FlowStep::WaitForSelector { .. } => "wait_for_selector",
            FlowStep::WaitForTimeout { .. } => "wait_for_timeout",
            FlowStep::Extract { .. } => "extract",
            FlowStep::Retry { .. } => "retry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractField {
    pub name: String,
    pub spec: FieldSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub source: SelectorSource,
    pub optional: bool,
    pub discounted_price_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorSource {
    Single(String),
    Priority(Vec<String>),
}

impl SelectorSource {
    /// The selectors to try, in priority order.
    #[must_use]
    pub fn selectors(&self) -> &[String] {
        match self {
            SelectorSource::Single(selector) => std::slice::from_ref(selector),
            SelectorSource::Priority(selectors) => selectors,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load retailer definitions from a YAML file.
///
/// Accepts both `{retailers: {id: ...}}` and a bare `{id: ...}` mapping.
/// Definitions are returned unvalidated; pass them through
/// [`crate::normalize_retailers`] before use.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read or is not a mapping of
/// retailer definitions.
pub fn load_retailers(path: &Path) -> Result<BTreeMap<String, RetailerDefinition>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RetailersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_retailers(&content)
}

/// Parse retailer definitions from YAML text. See [`load_retailers`].
///
/// # Errors
///
/// Returns `ConfigError` if the text is not valid YAML or not a mapping.
pub fn parse_retailers(content: &str) -> Result<BTreeMap<String, RetailerDefinition>, ConfigError> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(ConfigError::RetailersFileParse)?;

    let serde_yaml::Value::Mapping(top) = document else {
        return Err(ConfigError::Validation(
            "YAML config must be a mapping at the top level".to_string(),
        ));
    };

    let retailers = match top.get("retailers") {
        Some(serde_yaml::Value::Mapping(inner)) => inner.clone(),
        Some(_) => {
            return Err(ConfigError::Validation(
                "Retailers config must be a mapping".to_string(),
            ))
        }
        None => top,
    };

    let mut definitions = BTreeMap::new();
    for (key, value) in retailers {
        let Some(id) = key.as_str().map(str::to_owned) else {
            return Err(ConfigError::Validation(format!(
                "retailer ids must be strings, got {key:?}"
            )));
        };
        if !value.is_mapping() {
            return Err(ConfigError::InvalidRetailer {
                retailer: id,
                reason: "must be a mapping".to_string(),
            });
        }
        let definition: RetailerDefinition =
            serde_yaml::from_value(value).map_err(|e| ConfigError::InvalidRetailer {
                retailer: id.clone(),
                reason: e.to_string(),
            })?;
        definitions.insert(id, definition);
    }

    Ok(definitions)
}
