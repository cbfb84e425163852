//! Retailer flow interpreter.
//!
//! [`run_one`] executes a retailer's normalized step list for one target and
//! returns the accumulated [`ResultRow`]. Steps run strictly in order against
//! the shared page; the only control-flow step is `retry`, which re-runs the
//! remainder of the flow after a retriable failure.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ppi_core::{ExtractField, FlowStep, RetailerConfig, Target, WaitPolicy};

use crate::error::{FlowError, PageError};
use crate::page::Page;
use crate::price::normalize_price_text;
use crate::selectors::first_value;
use crate::template::render_template;

pub const FINAL_PRICE_FIELD: &str = "final_price";
pub const DISCOUNT_FIELD: &str = "discount";
pub const UNIT_PRICE_FIELD: &str = "unit_price";

const HTTP_NOT_FOUND: u16 = 404;

/// Everything collected for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub url: String,
    pub collected_at: DateTime<Utc>,
    /// Attempts used, counting the first. Only a `retry` step raises it.
    pub tries: u32,
    /// Status of the most recent navigation.
    pub http_status: Option<u16>,
    pub final_price: Option<String>,
    pub discount: Option<String>,
    pub discount_flag: bool,
    pub unit_price_text: Option<String>,
    /// Custom extract fields beyond the built-in price columns.
    pub extra: BTreeMap<String, Option<String>>,
}

impl ResultRow {
    fn new(url: String, extra_fields: &[&str]) -> Self {
        Self {
            url,
            collected_at: Utc::now(),
            tries: 1,
            http_status: None,
            final_price: None,
            discount: None,
            discount_flag: false,
            unit_price_text: None,
            extra: extra_fields
                .iter()
                .map(|name| ((*name).to_owned(), None))
                .collect(),
        }
    }

    /// Store an extracted value under its column.
    ///
    /// Price-named fields keep only their numeric token, and the discount
    /// field drives `discount_flag`.
    pub fn set_field(&mut self, name: &str, value: Option<String>) {
        match name {
            FINAL_PRICE_FIELD => self.final_price = normalize_price_text(value.as_deref()),
            DISCOUNT_FIELD => {
                self.discount_flag = value.is_some();
                self.discount = value;
            }
            UNIT_PRICE_FIELD | "unit_price_text" => self.unit_price_text = value,
            other => {
                let value = if is_price_field(other) {
                    normalize_price_text(value.as_deref())
                } else {
                    value
                };
                self.extra.insert(other.to_owned(), value);
            }
        }
    }

    /// Non-null values by name, for multi-hop URL templates.
    fn template_values(&self) -> impl Iterator<Item = (&str, &str)> {
        let builtins = [
            ("url", Some(self.url.as_str())),
            (FINAL_PRICE_FIELD, self.final_price.as_deref()),
            (DISCOUNT_FIELD, self.discount.as_deref()),
            (UNIT_PRICE_FIELD, self.unit_price_text.as_deref()),
            ("unit_price_text", self.unit_price_text.as_deref()),
        ];
        builtins
            .into_iter()
            .filter_map(|(name, value)| value.map(|v| (name, v)))
            .chain(
                self.extra
                    .iter()
                    .filter_map(|(name, value)| value.as_deref().map(|v| (name.as_str(), v))),
            )
    }
}

fn is_price_field(name: &str) -> bool {
    name.ends_with("_price") && name != UNIT_PRICE_FIELD
}

fn base_vars(config: &RetailerConfig, target: &Target) -> BTreeMap<String, String> {
    let mut vars = target.fields().clone();
    vars.insert("base_url".to_owned(), config.base_url.clone());
    vars
}

/// Build the target URL from the flow's first `goto` template.
///
/// # Errors
///
/// Returns [`FlowError::MissingGoto`] when the flow never navigates, or
/// [`FlowError::Template`] when the template names an unknown key or
/// has an unpaired brace.
pub fn build_url(
    retailer_id: &str,
    config: &RetailerConfig,
    target: &Target,
) -> Result<String, FlowError> {
    let template = config
        .first_goto_template()
        .ok_or_else(|| FlowError::MissingGoto {
            retailer: retailer_id.to_owned(),
        })?;
    render_template(template, &base_vars(config, target))
}

/// Scrape one target.
///
/// # Errors
///
/// - [`FlowError::NotFound`] for an HTTP 404 navigation or a matching
///   not-found selector.
/// - [`FlowError::MissingField`] when a required field resolves to nothing.
/// - [`FlowError::NavigationTimeout`] / [`FlowError::Page`] for driver
///   failures that survive the retry policy.
pub async fn run_one(
    page: &dyn Page,
    retailer_id: &str,
    config: &RetailerConfig,
    target: &Target,
) -> Result<ResultRow, FlowError> {
    let url = build_url(retailer_id, config, target)?;
    let extra_fields: Vec<&str> = config
        .extract_field_names()
        .into_iter()
        .filter(|name| !is_builtin_field(name))
        .collect();

    let mut run = FlowRun {
        page,
        retailer_id,
        config,
        target,
        row: ResultRow::new(url, &extra_fields),
    };
    tracing::debug!(retailer = retailer_id, url = %run.row.url, "running flow");

    match run.execute(&config.flow).await {
        Ok(()) => {}
        Err(err @ FlowError::MissingField { .. }) => {
            // A missing product page explains a missing field better than
            // the field error does.
            return match run.check_soft_not_found().await {
                Err(not_found @ FlowError::NotFound { .. }) => Err(not_found),
                Err(check_err) => {
                    tracing::debug!(
                        retailer = retailer_id,
                        error = %check_err,
                        "soft not-found check failed after missing field"
                    );
                    Err(err)
                }
                Ok(()) => Err(err),
            };
        }
        Err(err) => return Err(err),
    }

    run.check_soft_not_found().await?;
    Ok(run.row)
}

fn is_builtin_field(name: &str) -> bool {
    matches!(
        name,
        FINAL_PRICE_FIELD | DISCOUNT_FIELD | UNIT_PRICE_FIELD | "unit_price_text"
    )
}

struct FlowRun<'a> {
    page: &'a dyn Page,
    retailer_id: &'a str,
    config: &'a RetailerConfig,
    target: &'a Target,
    row: ResultRow,
}

impl FlowRun<'_> {
    async fn execute(&mut self, flow: &[FlowStep]) -> Result<(), FlowError> {
        let retry = flow.iter().enumerate().find_map(|(index, step)| match step {
            FlowStep::Retry { limit } => Some((index, *limit)),
            _ => None,
        });
        match retry {
            Some((index, limit)) => {
                self.run_steps(&flow[..index]).await?;
                self.run_with_retry(limit, &flow[index + 1..]).await
            }
            None => self.run_steps(flow).await,
        }
    }

    async fn run_steps(&mut self, steps: &[FlowStep]) -> Result<(), FlowError> {
        for step in steps {
            self.execute_step(step).await?;
        }
        Ok(())
    }

    async fn run_with_retry(&mut self, limit: u32, steps: &[FlowStep]) -> Result<(), FlowError> {
        let mut attempt = 1;
        loop {
            self.row.tries = attempt;
            match self.run_steps(steps).await {
                Ok(()) => return Ok(()),
                Err(err) if !err.is_retriable() || attempt >= limit => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        retailer = self.retailer_id,
                        attempt,
                        limit,
                        error = %err,
                        "flow attempt failed, retrying"
                    );
                    attempt += 1;
                }
            }
        }
    }

    async fn execute_step(&mut self, step: &FlowStep) -> Result<(), FlowError> {
        match step {
            FlowStep::Goto {
                url_template,
                wait_policy,
                timeout_ms,
            } => {
                let url = render_template(url_template, &self.template_vars())?;
                self.navigate(
                    &url,
                    wait_policy.unwrap_or(self.config.goto_wait_policy),
                    timeout_ms.unwrap_or(self.config.goto_timeout_ms),
                )
                .await
            }
            FlowStep::WaitForSelector {
                selector,
                state,
                timeout_ms,
            } => {
                self.page.wait_for(selector, *state, *timeout_ms).await?;
                Ok(())
            }
            FlowStep::WaitForTimeout { duration_ms } => {
                self.page.sleep(*duration_ms).await;
                Ok(())
            }
            FlowStep::Extract { fields } => self.extract(fields).await,
            // Handled by `execute`; a second retry inside the retried block
            // has no further effect.
            FlowStep::Retry { .. } => Ok(()),
        }
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait_policy: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<(), FlowError> {
        let navigation = match self.page.goto(url, wait_policy, timeout_ms).await {
            Ok(navigation) => navigation,
            Err(err) if err.is_timeout() && wait_policy == WaitPolicy::NetworkIdle => {
                // Pages with long-lived background connections never go idle
                // even once the product data has rendered.
                tracing::warn!(
                    retailer = self.retailer_id,
                    url,
                    timeout_ms,
                    "networkidle navigation timed out, falling back to domcontentloaded"
                );
                self.page
                    .goto(url, WaitPolicy::DomContentLoaded, timeout_ms)
                    .await
                    .map_err(|e| {
                        navigation_error(e, url, WaitPolicy::DomContentLoaded, timeout_ms)
                    })?
            }
            Err(err) => return Err(navigation_error(err, url, wait_policy, timeout_ms)),
        };

        self.row.http_status = navigation.status;
        if navigation.status == Some(HTTP_NOT_FOUND) {
            return Err(FlowError::NotFound {
                http_status: Some(HTTP_NOT_FOUND),
                message: format!("HTTP {HTTP_NOT_FOUND}"),
            });
        }
        Ok(())
    }

    async fn extract(&mut self, fields: &[ExtractField]) -> Result<(), FlowError> {
        let mut discounted_price = None;

        for field in fields {
            let selectors = field.spec.source.selectors();
            let value = first_value(self.page, selectors).await?;

            let Some(value) = value else {
                if field.spec.optional {
                    tracing::debug!(
                        retailer = self.retailer_id,
                        field = %field.name,
                        "optional field not found"
                    );
                    self.row.set_field(&field.name, None);
                    continue;
                }
                return Err(FlowError::MissingField {
                    retailer: self.retailer_id.to_owned(),
                    field: field.name.clone(),
                    selectors: selectors.to_vec(),
                });
            };

            if field.name == DISCOUNT_FIELD && field.spec.discounted_price_override {
                discounted_price = normalize_price_text(Some(&value));
            }
            self.row.set_field(&field.name, Some(value));
        }

        // Applied after the whole step so field order cannot undo it.
        if let Some(price) = discounted_price {
            self.row.final_price = Some(price);
        }
        Ok(())
    }

    async fn check_soft_not_found(&self) -> Result<(), FlowError> {
        for selector in &self.config.not_found_selectors {
            if self.page.locate_first(selector).await?.is_some() {
                return Err(FlowError::NotFound {
                    http_status: self.row.http_status,
                    message: format!("Soft 404 / product not found (matched: {selector})"),
                });
            }
        }
        Ok(())
    }

    fn template_vars(&self) -> BTreeMap<String, String> {
        let mut vars = base_vars(self.config, self.target);
        vars.extend(
            self.row
                .template_values()
                .map(|(name, value)| (name.to_owned(), value.to_owned())),
        );
        vars
    }
}

fn navigation_error(
    err: PageError,
    url: &str,
    wait_policy: WaitPolicy,
    timeout_ms: u64,
) -> FlowError {
    if err.is_timeout() {
        FlowError::NavigationTimeout {
            url: url.to_owned(),
            wait_policy,
            timeout_ms,
        }
    } else {
        FlowError::Page(err)
    }
}

#[cfg(test)]
#[path = "flow_test.rs"]
mod tests;
