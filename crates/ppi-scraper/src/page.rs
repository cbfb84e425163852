//! Page driver seam.
//!
//! The flow interpreter only talks to a browser through these traits. The CLI
//! plugs in a Chromium session; tests and offline runs use
//! [`crate::StaticHtmlPage`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ppi_core::{WaitPolicy, WaitState};

use crate::error::PageError;

/// Result of a navigation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Main-document HTTP status, when the driver can observe it.
    pub status: Option<u16>,
}

#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for `wait_policy`. Exceeding `timeout_ms` must
    /// surface as [`PageError::Timeout`].
    async fn goto(
        &self,
        url: &str,
        wait_policy: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<Navigation, PageError>;

    /// First element matching `selector`, or `None` when nothing matches.
    async fn locate_first(&self, selector: &str) -> Result<Option<Box<dyn Element>>, PageError>;

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout_ms: u64,
    ) -> Result<(), PageError>;

    async fn sleep(&self, duration_ms: u64) {
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
    }

    /// Serialized HTML of the current page.
    async fn content(&self) -> Result<String, PageError>;

    /// Full-page screenshot written to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), PageError>;
}

#[async_trait]
pub trait Element: Send + Sync {
    /// Rendered text content.
    async fn text(&self) -> Result<Option<String>, PageError>;

    async fn parent(&self) -> Result<Option<Box<dyn Element>>, PageError>;

    async fn attribute(&self, name: &str) -> Result<Option<String>, PageError>;
}
