//! Selector modifiers and value resolution.
//!
//! A raw selector may carry a suffix that changes what is read from the
//! matched element:
//!
//! - `meta[itemprop='price']::attr(content)` reads the `content` attribute.
//! - `span.price::parentText` reads the text of the element's parent.
//! - anything else reads the element's own text.
//!
//! [`parse_selector`] is pure; [`resolve`] and [`first_value`] query a page.

use crate::error::PageError;
use crate::page::Page;

const ATTR_MARKER: &str = "::attr(";
const PARENT_TEXT_SUFFIXES: [&str; 2] = ["::parentText", "::parent_text"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorMode {
    Text,
    ParentText,
    Attr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorSpec {
    pub selector: String,
    pub mode: SelectorMode,
    /// Set iff `mode` is [`SelectorMode::Attr`].
    pub attr_name: Option<String>,
}

/// Split a raw selector into its base selector and read mode.
#[must_use]
pub fn parse_selector(raw: &str) -> SelectorSpec {
    let raw = raw.trim();

    if let Some((base, rest)) = raw.split_once(ATTR_MARKER) {
        let name = rest.trim_end_matches(')').trim();
        return SelectorSpec {
            selector: base.trim().to_owned(),
            mode: SelectorMode::Attr,
            attr_name: Some(name.to_owned()),
        };
    }

    for suffix in PARENT_TEXT_SUFFIXES {
        if let Some(base) = raw.strip_suffix(suffix) {
            return SelectorSpec {
                selector: base.trim().to_owned(),
                mode: SelectorMode::ParentText,
                attr_name: None,
            };
        }
    }

    SelectorSpec {
        selector: raw.to_owned(),
        mode: SelectorMode::Text,
        attr_name: None,
    }
}

/// Replace non-breaking spaces and trim. Blank input becomes `None`.
#[must_use]
pub fn normalize_text(value: Option<&str>) -> Option<String> {
    let replaced = value?.replace('\u{a0}', " ");
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Resolve one raw selector against `page`.
///
/// A selector that matches nothing resolves to `Ok(None)`.
///
/// # Errors
///
/// Propagates driver failures from the page.
pub async fn resolve(page: &dyn Page, raw: &str) -> Result<Option<String>, PageError> {
    let spec = parse_selector(raw);
    let Some(element) = page.locate_first(&spec.selector).await? else {
        return Ok(None);
    };

    let value = match (spec.mode, spec.attr_name.as_deref()) {
        (SelectorMode::Attr, Some(name)) => element.attribute(name).await?,
        (SelectorMode::ParentText, _) => match element.parent().await? {
            Some(parent) => parent.text().await?,
            None => None,
        },
        _ => element.text().await?,
    };

    Ok(normalize_text(value.as_deref()))
}

/// Resolve selectors in priority order and return the first non-empty value.
///
/// # Errors
///
/// Propagates driver failures from the page.
pub async fn first_value(
    page: &dyn Page,
    selectors: &[String],
) -> Result<Option<String>, PageError> {
    for raw in selectors {
        if let Some(value) = resolve(page, raw).await? {
            tracing::trace!(selector = %raw, value = %value, "selector resolved");
            return Ok(Some(value));
        }
    }
    Ok(None)
}

#[cfg(test)]
#[path = "selectors_test.rs"]
mod tests;
