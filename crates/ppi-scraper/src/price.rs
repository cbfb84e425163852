use std::sync::LazyLock;

use regex::Regex;

static PRICE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid price regex"));

/// Keep the first numeric token of a price string.
///
/// Thousands separators are dropped before matching, so `"₪ 1,234.56"`
/// becomes `"1234.56"`. Text without digits is returned trimmed; blank input
/// yields `None`.
#[must_use]
pub fn normalize_price_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_commas = trimmed.replace(',', "");
    match PRICE_TOKEN.find(&without_commas) {
        Some(token) => Some(token.as_str().to_owned()),
        None => Some(trimmed.to_owned()),
    }
}
