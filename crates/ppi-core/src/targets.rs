use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Column names accepted for the retailer id, in lookup order.
const RETAILER_ID_COLUMNS: [&str; 3] = ["retailer_id", "retail_id", "retail"];

/// One input row: the retailer and product to scrape, plus any extra columns
/// available to URL templates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target {
    fields: BTreeMap<String, String>,
}

impl Target {
    #[must_use]
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    /// Build a target from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// The retailer id, checking the alias columns in order. Blank values
    /// count as missing.
    #[must_use]
    pub fn retailer_id(&self) -> Option<&str> {
        RETAILER_ID_COLUMNS
            .iter()
            .find_map(|column| self.get(column))
    }

    #[must_use]
    pub fn product_id(&self) -> Option<&str> {
        self.get("product_id")
    }

    /// A non-blank column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// All columns, including blank ones.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}
