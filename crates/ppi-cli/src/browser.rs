//! Chromium page driver over the DevTools protocol.
//!
//! `domcontentloaded` and `load` both complete when `Page.navigate` reports the
//! load; `networkidle` additionally waits for the resource-timing entry count
//! to stay flat for [`NETWORK_QUIET_WINDOW`]. The HTTP status is read from the
//! navigation timing entry.
//!
//! Every CDP request carries its own deadline; [`request_timeout`] keeps it
//! above the longest step budget so step timeouts are the ones that fire.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element as CdpElement;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use ppi_core::{WaitPolicy, WaitState};
use ppi_scraper::{Element, Navigation, Page, PageError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const NETWORK_QUIET_WINDOW: Duration = Duration::from_millis(500);
/// chromiumoxide's own default request timeout.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT_HEADROOM: Duration = Duration::from_secs(5);

const NAVIGATION_STATUS_JS: &str =
    "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0";
const RESOURCE_COUNT_JS: &str = "performance.getEntriesByType('resource').length";
/// Text as rendered, so hidden nodes and script bodies stay out of prices.
const RENDERED_TEXT_JS: &str = "return (n.innerText ?? n.textContent);";

/// CDP request deadline for flows whose longest step waits `longest_step_ms`.
pub(crate) fn request_timeout(longest_step_ms: u64) -> Duration {
    Duration::from_millis(longest_step_ms).max(MIN_REQUEST_TIMEOUT) + REQUEST_TIMEOUT_HEADROOM
}

/// A launched browser plus the task pumping its CDP event stream.
pub(crate) struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    pub(crate) async fn launch(
        headless: bool,
        chrome_path: Option<&Path>,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut builder = BrowserConfig::builder().request_timeout(request_timeout);
        if !headless {
            builder = builder.with_head();
        }
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(|e| anyhow::anyhow!(e))?;

        let (browser, mut events) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser event error");
                }
            }
        });
        tracing::info!(
            headless,
            request_timeout_ms = request_timeout.as_millis(),
            "browser launched"
        );

        Ok(Self { browser, handler })
    }

    pub(crate) async fn new_page(&self) -> anyhow::Result<ChromiumPage> {
        let page = self.browser.new_page("about:blank").await?;
        Ok(ChromiumPage { page })
    }

    pub(crate) async fn close(mut self) -> anyhow::Result<()> {
        let closed = self.browser.close().await;
        self.handler.abort();
        closed?;
        self.browser.wait().await?;
        tracing::debug!("browser closed");
        Ok(())
    }
}

pub(crate) struct ChromiumPage {
    page: chromiumoxide::Page,
}

fn driver_error(err: impl std::fmt::Display) -> PageError {
    PageError::Driver(err.to_string())
}

fn timeout_error(operation: String, timeout_ms: u64) -> PageError {
    PageError::Timeout {
        operation,
        timeout_ms,
    }
}

/// A CDP request that hit its deadline is a timeout of the step it served.
fn cdp_error(err: CdpError, operation: impl FnOnce() -> String, timeout_ms: u64) -> PageError {
    match err {
        CdpError::Timeout => timeout_error(operation(), timeout_ms),
        other => driver_error(other),
    }
}

/// Quote `value` as a JavaScript string literal.
fn js_string(value: &str) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

impl ChromiumPage {
    async fn evaluate_u64(&self, expression: &str) -> Result<u64, CdpError> {
        Ok(self.page.evaluate(expression).await?.into_value::<u64>()?)
    }

    async fn evaluate_bool(&self, expression: String) -> Result<bool, CdpError> {
        Ok(self.page.evaluate(expression).await?.into_value::<bool>()?)
    }

    async fn wait_for_network_idle(&self) -> Result<(), CdpError> {
        let mut last_count = self.evaluate_u64(RESOURCE_COUNT_JS).await?;
        let mut quiet_since = Instant::now();
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            let count = self.evaluate_u64(RESOURCE_COUNT_JS).await?;
            if count != last_count {
                last_count = count;
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= NETWORK_QUIET_WINDOW {
                return Ok(());
            }
        }
    }

    async fn selector_state(&self, selector: &str, state: WaitState) -> Result<bool, CdpError> {
        let visible_check = match state {
            WaitState::Attached => "true",
            WaitState::Visible => {
                "(() => { const s = getComputedStyle(el); const r = el.getBoundingClientRect(); \
                 return s.visibility !== 'hidden' && s.display !== 'none' && r.width > 0 && r.height > 0; })()"
            }
        };
        let expression = format!(
            "(() => {{ const el = document.querySelector({}); return !!el && {visible_check}; }})()",
            js_string(selector)?
        );
        self.evaluate_bool(expression).await
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(
        &self,
        url: &str,
        wait_policy: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<Navigation, PageError> {
        let budget = Duration::from_millis(timeout_ms);
        let started = Instant::now();
        let operation = || format!("navigating to {url} ({wait_policy})");

        tokio::time::timeout(budget, self.page.goto(url.to_string()))
            .await
            .map_err(|_| timeout_error(operation(), timeout_ms))?
            .map_err(|e| cdp_error(e, operation, timeout_ms))?;

        if wait_policy == WaitPolicy::NetworkIdle {
            let remaining = budget.saturating_sub(started.elapsed());
            tokio::time::timeout(remaining, self.wait_for_network_idle())
                .await
                .map_err(|_| timeout_error(operation(), timeout_ms))?
                .map_err(|e| cdp_error(e, operation, timeout_ms))?;
        }

        let status = self
            .evaluate_u64(NAVIGATION_STATUS_JS)
            .await
            .map_err(|e| cdp_error(e, operation, timeout_ms))?;
        Ok(Navigation {
            status: u16::try_from(status).ok().filter(|s| *s != 0),
        })
    }

    async fn locate_first(&self, selector: &str) -> Result<Option<Box<dyn Element>>, PageError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| PageError::InvalidSelector {
                selector: selector.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(elements.into_iter().next().map(|element| {
            Box::new(ChromiumElement {
                element: Arc::new(element),
                depth: 0,
            }) as Box<dyn Element>
        }))
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout_ms: u64,
    ) -> Result<(), PageError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let operation = || format!("waiting for \"{selector}\" to be {state}");
        loop {
            let present = self
                .selector_state(selector, state)
                .await
                .map_err(|e| match e {
                    CdpError::Timeout => timeout_error(operation(), timeout_ms),
                    other => PageError::InvalidSelector {
                        selector: selector.to_owned(),
                        reason: other.to_string(),
                    },
                })?;
            if present {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(timeout_error(operation(), timeout_ms));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn content(&self) -> Result<String, PageError> {
        self.page.content().await.map_err(driver_error)
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .map(|_| ())
            .map_err(driver_error)
    }
}

/// An element handle, or one of its ancestors `depth` levels up.
struct ChromiumElement {
    element: Arc<CdpElement>,
    depth: u32,
}

impl ChromiumElement {
    /// Run `body` against the addressed node `n`; a missing ancestor yields
    /// `null`.
    async fn call(&self, depth: u32, body: &str) -> Result<Option<serde_json::Value>, PageError> {
        let function = format!(
            "function() {{ let n = this; for (let i = 0; i < {depth}; i++) {{ n = n && n.parentElement; }} \
             if (!n) {{ return null; }} {body} }}"
        );
        let returned = self
            .element
            .call_js_fn(function, false)
            .await
            .map_err(driver_error)?;
        Ok(returned.result.value.filter(|value| !value.is_null()))
    }

    async fn call_string(&self, body: &str) -> Result<Option<String>, PageError> {
        Ok(self
            .call(self.depth, body)
            .await?
            .and_then(|value| value.as_str().map(str::to_owned)))
    }
}

#[async_trait]
impl Element for ChromiumElement {
    async fn text(&self) -> Result<Option<String>, PageError> {
        self.call_string(RENDERED_TEXT_JS).await
    }

    async fn parent(&self) -> Result<Option<Box<dyn Element>>, PageError> {
        let depth = self.depth + 1;
        let exists = self
            .call(depth, "return true;")
            .await?
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        Ok(exists.then(|| {
            Box::new(ChromiumElement {
                element: Arc::clone(&self.element),
                depth,
            }) as Box<dyn Element>
        }))
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, PageError> {
        let name = js_string(name).map_err(driver_error)?;
        self.call_string(&format!("return n.getAttribute({name});"))
            .await
    }
}
