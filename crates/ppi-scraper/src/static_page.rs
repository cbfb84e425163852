//! A [`Page`] backed by fixed HTML documents.
//!
//! Each URL maps to a status code and an HTML body. Selectors are evaluated
//! with the `scraper` crate's CSS engine, so retailer flows can be exercised
//! against saved pages without a browser. Nothing is rendered: `visible`
//! waits only check that the element exists and is not `hidden`, and
//! screenshots are unsupported.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ppi_core::{WaitPolicy, WaitState};
use scraper::{ElementRef, Html, Selector};

use crate::error::PageError;
use crate::page::{Element, Navigation, Page};

#[derive(Debug, Clone)]
struct StaticDocument {
    status: u16,
    html: String,
}

#[derive(Debug, Default)]
pub struct StaticHtmlPage {
    documents: HashMap<String, StaticDocument>,
    current: Mutex<Option<String>>,
    visits: Mutex<Vec<(String, WaitPolicy)>>,
}

impl StaticHtmlPage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` with `status` when `url` is visited.
    #[must_use]
    pub fn with_document(
        mut self,
        url: impl Into<String>,
        status: u16,
        html: impl Into<String>,
    ) -> Self {
        self.documents.insert(
            url.into(),
            StaticDocument {
                status,
                html: html.into(),
            },
        );
        self
    }

    /// Every navigation so far, with the wait policy it used.
    #[must_use]
    pub fn visits(&self) -> Vec<(String, WaitPolicy)> {
        lock(&self.visits).clone()
    }

    fn current_html(&self) -> Option<String> {
        lock(&self.current).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn parse_css(selector: &str) -> Result<Selector, PageError> {
    Selector::parse(selector).map_err(|e| PageError::InvalidSelector {
        selector: selector.to_owned(),
        reason: e.to_string(),
    })
}

/// Owned copy of an element, taken while the parsed document is alive.
#[derive(Debug, Clone)]
struct StaticElement {
    text: String,
    attributes: HashMap<String, String>,
    parent: Option<Box<StaticElement>>,
}

impl StaticElement {
    fn snapshot(element: ElementRef<'_>) -> Self {
        Self {
            text: element.text().collect(),
            attributes: element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            parent: element
                .parent()
                .and_then(ElementRef::wrap)
                .map(|parent| Box::new(Self::snapshot(parent))),
        }
    }
}

#[async_trait]
impl Element for StaticElement {
    async fn text(&self) -> Result<Option<String>, PageError> {
        Ok(Some(self.text.clone()))
    }

    async fn parent(&self) -> Result<Option<Box<dyn Element>>, PageError> {
        Ok(self
            .parent
            .as_ref()
            .map(|parent| Box::new((**parent).clone()) as Box<dyn Element>))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, PageError> {
        Ok(self.attributes.get(name).cloned())
    }
}

#[async_trait]
impl Page for StaticHtmlPage {
    async fn goto(
        &self,
        url: &str,
        wait_policy: WaitPolicy,
        _timeout_ms: u64,
    ) -> Result<Navigation, PageError> {
        lock(&self.visits).push((url.to_owned(), wait_policy));

        let (status, html) = match self.documents.get(url) {
            Some(document) => (document.status, document.html.clone()),
            None => (404, String::new()),
        };
        *lock(&self.current) = Some(html);

        Ok(Navigation {
            status: Some(status),
        })
    }

    async fn locate_first(&self, selector: &str) -> Result<Option<Box<dyn Element>>, PageError> {
        let css = parse_css(selector)?;
        let Some(html) = self.current_html() else {
            return Ok(None);
        };
        let document = Html::parse_document(&html);
        let found = document
            .select(&css)
            .next()
            .map(|element| Box::new(StaticElement::snapshot(element)) as Box<dyn Element>);
        Ok(found)
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout_ms: u64,
    ) -> Result<(), PageError> {
        let css = parse_css(selector)?;
        let satisfied = self.current_html().is_some_and(|html| {
            let document = Html::parse_document(&html);
            let mut matches = document.select(&css);
            match state {
                WaitState::Attached => matches.next().is_some(),
                WaitState::Visible => {
                    matches.any(|element| element.value().attr("hidden").is_none())
                }
            }
        });

        if satisfied {
            Ok(())
        } else {
            Err(PageError::Timeout {
                operation: format!("waiting for \"{selector}\" to be {state}"),
                timeout_ms,
            })
        }
    }

    async fn sleep(&self, _duration_ms: u64) {}

    async fn content(&self) -> Result<String, PageError> {
        Ok(self.current_html().unwrap_or_default())
    }

    async fn screenshot(&self, _path: &Path) -> Result<(), PageError> {
        Err(PageError::Driver(
            "static pages cannot be screenshotted".to_string(),
        ))
    }
}
