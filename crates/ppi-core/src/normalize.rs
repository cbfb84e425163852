//! Validation and legacy bridging for retailer definitions.
//!
//! [`normalize_retailers`] turns loose [`RetailerDefinition`]s into typed
//! [`RetailerConfig`]s. It never touches its input: the returned configs are
//! fresh values, so normalizing the same definitions twice yields the same
//! result.

use std::collections::BTreeMap;

use crate::retailers::{
    ExtractField, FieldDefinition, FieldSpec, FlowStep, RetailerConfig, RetailerDefinition,
    SelectorSource, StepDefinition, DEFAULT_GOTO_TIMEOUT_MS, DEFAULT_WAIT_FOR_SELECTOR_TIMEOUT_MS,
    DEFAULT_WAIT_FOR_TIMEOUT_MS,
};
use crate::ConfigError;

/// Validate every retailer and build its typed flow.
///
/// # Errors
///
/// Returns the first [`ConfigError`] encountered; no partial result is
/// produced.
pub fn normalize_retailers(
    definitions: &BTreeMap<String, RetailerDefinition>,
) -> Result<BTreeMap<String, RetailerConfig>, ConfigError> {
    definitions
        .iter()
        .map(|(id, definition)| Ok((id.clone(), normalize_retailer(id, definition)?)))
        .collect()
}

/// Validate a single retailer definition.
///
/// When the flow has no `extract` step, one is appended from the legacy
/// `pricing` / `discount` / `unit_price` blocks. An explicit `extract` step
/// always wins and the legacy blocks are ignored.
///
/// # Errors
///
/// Returns [`ConfigError`] naming the retailer (and field, where relevant)
/// when the flow or any field schema is invalid.
pub fn normalize_retailer(
    retailer_id: &str,
    definition: &RetailerDefinition,
) -> Result<RetailerConfig, ConfigError> {
    let raw_steps = match &definition.flow {
        Some(serde_yaml::Value::Sequence(steps)) => steps,
        _ => return Err(invalid_retailer(retailer_id, "flow must be a list")),
    };
    if raw_steps.is_empty() {
        return Err(invalid_retailer(retailer_id, "flow must be a non-empty list"));
    }

    let mut flow = raw_steps
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_step(retailer_id, index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    if !flow.iter().any(|step| matches!(step, FlowStep::Extract { .. })) {
        let fields = legacy_extract_fields(definition);
        if !fields.is_empty() {
            flow.push(FlowStep::Extract { fields });
        }
    }

    validate_flow_order(retailer_id, &flow)?;

    Ok(RetailerConfig {
        base_url: definition.base_url.clone(),
        flow,
        goto_wait_policy: definition.goto_wait_until.unwrap_or_default(),
        goto_timeout_ms: definition.goto_timeout_ms.unwrap_or(DEFAULT_GOTO_TIMEOUT_MS),
        not_found_selectors: definition
            .not_found
            .as_ref()
            .map(|nf| nf.any_selectors.clone())
            .unwrap_or_default(),
    })
}

fn invalid_retailer(retailer_id: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidRetailer {
        retailer: retailer_id.to_owned(),
        reason: reason.to_owned(),
    }
}

fn parse_step(
    retailer_id: &str,
    index: usize,
    raw: &serde_yaml::Value,
) -> Result<FlowStep, ConfigError> {
    let raw_action = raw
        .get("action")
        .and_then(serde_yaml::Value::as_str)
        .unwrap_or_default()
        .to_owned();
    if !raw.is_mapping() {
        return Err(ConfigError::InvalidStep {
            retailer: retailer_id.to_owned(),
            index,
            action: raw_action,
            reason: "step must be a mapping".to_string(),
        });
    }
    let step: StepDefinition =
        serde_yaml::from_value(raw.clone()).map_err(|e| ConfigError::InvalidStep {
            retailer: retailer_id.to_owned(),
            index,
            action: raw_action,
            reason: e.to_string(),
        })?;

    let action = step.action.clone().unwrap_or_default();
    let step_error = |reason: &str| ConfigError::InvalidStep {
        retailer: retailer_id.to_owned(),
        index,
        action: action.clone(),
        reason: reason.to_owned(),
    };

    match action.as_str() {
        "goto" => {
            let url_template = non_empty(step.url).ok_or_else(|| step_error("missing 'url'"))?;
            Ok(FlowStep::Goto {
                url_template,
                wait_policy: step.wait_until,
                timeout_ms: step.timeout_ms,
            })
        }
        "wait_for_selector" => {
            let selector =
                non_empty(step.selector).ok_or_else(|| step_error("missing 'selector'"))?;
            Ok(FlowStep::WaitForSelector {
                selector,
                state: step.state.unwrap_or_default(),
                timeout_ms: step
                    .timeout_ms
                    .unwrap_or(DEFAULT_WAIT_FOR_SELECTOR_TIMEOUT_MS),
            })
        }
        "wait_for_timeout" => Ok(FlowStep::WaitForTimeout {
            duration_ms: step
                .duration_ms
                .or(step.timeout_ms)
                .unwrap_or(DEFAULT_WAIT_FOR_TIMEOUT_MS),
        }),
        "extract" => {
            let fields = parse_extract_fields(retailer_id, step.fields.as_ref())?;
            Ok(FlowStep::Extract { fields })
        }
        "retry" => {
            let limit = step.limit.ok_or_else(|| step_error("missing 'limit'"))?;
            let limit = u32::try_from(limit)
                .ok()
                .filter(|limit| *limit >= 1)
                .ok_or_else(|| step_error("'limit' must be an integer >= 1"))?;
            Ok(FlowStep::Retry { limit })
        }
        _ => Err(ConfigError::UnsupportedAction {
            retailer: retailer_id.to_owned(),
            action: action.clone(),
        }),
    }
}

fn parse_extract_fields(
    retailer_id: &str,
    raw: Option<&serde_yaml::Value>,
) -> Result<Vec<ExtractField>, ConfigError> {
    let mapping = match raw {
        Some(serde_yaml::Value::Mapping(mapping)) if !mapping.is_empty() => mapping,
        _ => {
            return Err(invalid_retailer(
                retailer_id,
                "extract.fields must be a non-empty mapping",
            ))
        }
    };

    let mut fields = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let name = key
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("{key:?}"));
        let field_error = |reason: String| ConfigError::InvalidField {
            retailer: retailer_id.to_owned(),
            field: name.clone(),
            reason,
        };

        if !value.is_mapping() {
            return Err(field_error("must be a mapping".to_string()));
        }
        let definition: FieldDefinition =
            serde_yaml::from_value(value.clone()).map_err(|e| field_error(e.to_string()))?;

        let selector = non_empty(definition.selector);
        let priority = definition
            .selectors_priority
            .filter(|selectors| !selectors.is_empty());

        let source = match (selector, priority) {
            (Some(selector), None) => SelectorSource::Single(selector),
            (None, Some(selectors)) => SelectorSource::Priority(selectors),
            _ => {
                return Err(field_error(
                    "must define exactly one of selector or selectors_priority".to_string(),
                ))
            }
        };

        fields.push(ExtractField {
            name: name.clone(),
            spec: FieldSpec {
                source,
                optional: definition.optional.unwrap_or(false),
                discounted_price_override: definition.discounted_price_override.unwrap_or(false),
            },
        });
    }

    Ok(fields)
}

/// Build extract fields from the legacy `pricing` / `discount` /
/// `unit_price` blocks. Blocks without a selector contribute nothing.
fn legacy_extract_fields(definition: &RetailerDefinition) -> Vec<ExtractField> {
    let mut fields = Vec::new();

    let final_price = definition
        .pricing
        .as_ref()
        .and_then(|pricing| pricing.final_price.as_ref())
        .and_then(|fp| fp.selectors_priority.clone())
        .filter(|selectors| !selectors.is_empty());
    if let Some(selectors) = final_price {
        fields.push(ExtractField {
            name: "final_price".to_string(),
            spec: FieldSpec {
                source: SelectorSource::Priority(selectors),
                // Legacy configs always tolerated a missing final price.
                optional: true,
                discounted_price_override: false,
            },
        });
    }

    if let Some(discount) = &definition.discount {
        if let Some(selector) = non_empty(discount.selector.clone()) {
            fields.push(ExtractField {
                name: "discount".to_string(),
                spec: FieldSpec {
                    source: SelectorSource::Single(selector),
                    optional: discount.optional.unwrap_or(true),
                    discounted_price_override: discount.discounted_price_override.unwrap_or(false),
                },
            });
        }
    }

    if let Some(unit_price) = &definition.unit_price {
        if let Some(selector) = non_empty(unit_price.selector.clone()) {
            fields.push(ExtractField {
                name: "unit_price".to_string(),
                spec: FieldSpec {
                    source: SelectorSource::Single(selector),
                    optional: unit_price.optional.unwrap_or(true),
                    discounted_price_override: false,
                },
            });
        }
    }

    fields
}

fn validate_flow_order(retailer_id: &str, flow: &[FlowStep]) -> Result<(), ConfigError> {
    let Some(first_goto) = flow
        .iter()
        .position(|step| matches!(step, FlowStep::Goto { .. }))
    else {
        return Err(invalid_retailer(
            retailer_id,
            "flow must contain a 'goto' step",
        ));
    };

    if let Some(early) = flow[..first_goto].iter().find(|step| {
        matches!(
            step,
            FlowStep::WaitForSelector { .. } | FlowStep::Extract { .. }
        )
    }) {
        return Err(invalid_retailer(
            retailer_id,
            &format!(
                "flow has '{}' before its first 'goto' step",
                early.action()
            ),
        ));
    }

    let retry_steps = flow
        .iter()
        .filter(|step| matches!(step, FlowStep::Retry { .. }))
        .count();
    if retry_steps > 1 {
        return Err(invalid_retailer(
            retailer_id,
            "flow may declare at most one 'retry' step",
        ));
    }

    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
