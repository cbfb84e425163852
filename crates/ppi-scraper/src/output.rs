//! Output row assembly and the tabular column schema.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use ppi_core::{RetailerConfig, Target};

use crate::error::FlowError;
use crate::flow::{ResultRow, DISCOUNT_FIELD, FINAL_PRICE_FIELD, UNIT_PRICE_FIELD};

/// Fixed leading columns of every results file, in order.
pub const OUTPUT_FIELDS: [&str; 9] = [
    "retailer_id",
    "product_id",
    "url",
    "collected_at",
    "final_price",
    "discount",
    "discount_flag",
    "unit_price_text",
    "error",
];

/// `error` value recorded for hard and soft not-found pages.
pub const NOT_FOUND_CODE: &str = "NOT_FOUND";

/// One row of the results sink. Exactly one is produced per target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub retailer_id: Option<String>,
    pub product_id: Option<String>,
    pub url: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    pub final_price: Option<String>,
    pub discount: Option<String>,
    pub discount_flag: bool,
    pub unit_price_text: Option<String>,
    pub error: Option<String>,
    pub http_status: Option<u16>,
    pub tries: Option<u32>,
    pub extra: BTreeMap<String, Option<String>>,
}

impl OutputRow {
    fn base(target: &Target) -> Self {
        Self {
            retailer_id: target.retailer_id().map(str::to_owned),
            product_id: target.product_id().map(str::to_owned),
            url: None,
            collected_at: None,
            final_price: None,
            discount: None,
            discount_flag: false,
            unit_price_text: None,
            error: None,
            http_status: None,
            tries: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.error.as_deref() == Some(NOT_FOUND_CODE)
    }
}

/// Merge a target with the outcome of its scrape.
///
/// On failure every extraction column keeps its initial null/false value;
/// not-found outcomes record [`NOT_FOUND_CODE`] plus their HTTP status, and
/// anything else records the error message.
#[must_use]
pub fn assemble_row(target: &Target, outcome: Result<ResultRow, FlowError>) -> OutputRow {
    let mut row = OutputRow::base(target);
    match outcome {
        Ok(result) => {
            row.url = Some(result.url);
            row.collected_at = Some(result.collected_at);
            row.final_price = result.final_price;
            row.discount = result.discount;
            row.discount_flag = result.discount_flag;
            row.unit_price_text = result.unit_price_text;
            row.http_status = result.http_status;
            row.tries = Some(result.tries);
            row.extra = result.extra;
        }
        Err(err) if err.is_not_found() => {
            row.http_status = err.http_status();
            row.error = Some(NOT_FOUND_CODE.to_owned());
        }
        Err(err) => row.error = Some(err.to_string()),
    }
    row
}

/// Column layout for a results file: the fixed columns followed by every
/// custom extract field any retailer declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSchema {
    extra_columns: Vec<String>,
}

impl OutputSchema {
    #[must_use]
    pub fn from_retailers<'a, I>(retailers: I) -> Self
    where
        I: IntoIterator<Item = &'a RetailerConfig>,
    {
        let extra: BTreeSet<String> = retailers
            .into_iter()
            .flat_map(|config| config.extract_field_names())
            .filter(|name| !is_fixed_field(name))
            .map(str::to_owned)
            .collect();
        Self {
            extra_columns: extra.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    #[must_use]
    pub fn header(&self) -> Vec<String> {
        OUTPUT_FIELDS
            .iter()
            .map(|field| (*field).to_owned())
            .chain(self.extra_columns.iter().cloned())
            .collect()
    }

    /// Render `row` as cells matching [`Self::header`]. Nulls become empty
    /// cells.
    #[must_use]
    pub fn record(&self, row: &OutputRow) -> Vec<String> {
        let cell = |value: Option<&str>| value.unwrap_or_default().to_owned();
        let mut record = vec![
            cell(row.retailer_id.as_deref()),
            cell(row.product_id.as_deref()),
            cell(row.url.as_deref()),
            row.collected_at
                .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            cell(row.final_price.as_deref()),
            cell(row.discount.as_deref()),
            row.discount_flag.to_string(),
            cell(row.unit_price_text.as_deref()),
            cell(row.error.as_deref()),
        ];
        record.extend(
            self.extra_columns
                .iter()
                .map(|column| cell(row.extra.get(column).and_then(Option::as_deref))),
        );
        record
    }
}

fn is_fixed_field(name: &str) -> bool {
    matches!(
        name,
        FINAL_PRICE_FIELD | DISCOUNT_FIELD | UNIT_PRICE_FIELD | "unit_price_text"
    ) || OUTPUT_FIELDS.contains(&name)
}
