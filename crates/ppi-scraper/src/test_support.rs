//! Fault-injecting page used by unit tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ppi_core::{WaitPolicy, WaitState};

use crate::error::PageError;
use crate::page::{Element, Navigation, Page};
use crate::static_page::StaticHtmlPage;

/// Wraps a [`StaticHtmlPage`], logging every driver call and failing
/// navigations or waits from pre-loaded queues.
#[derive(Debug, Default)]
pub(crate) struct ScriptedPage {
    inner: StaticHtmlPage,
    goto_failures: Mutex<VecDeque<PageError>>,
    wait_failures: Mutex<VecDeque<PageError>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPage {
    pub(crate) fn new(inner: StaticHtmlPage) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub(crate) fn fail_next_goto(self, error: PageError) -> Self {
        self.goto_failures.lock().unwrap().push_back(error);
        self
    }

    pub(crate) fn fail_next_wait(self, error: PageError) -> Self {
        self.wait_failures.lock().unwrap().push_back(error);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub(crate) fn timeout(operation: &str) -> PageError {
    PageError::Timeout {
        operation: operation.to_string(),
        timeout_ms: 10,
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(
        &self,
        url: &str,
        wait_policy: WaitPolicy,
        timeout_ms: u64,
    ) -> Result<Navigation, PageError> {
        self.record(format!("goto {url} {wait_policy}"));
        let failure = self.goto_failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.goto(url, wait_policy, timeout_ms).await
    }

    async fn locate_first(&self, selector: &str) -> Result<Option<Box<dyn Element>>, PageError> {
        self.record(format!("locate {selector}"));
        self.inner.locate_first(selector).await
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout_ms: u64,
    ) -> Result<(), PageError> {
        self.record(format!("wait {selector} {state}"));
        let failure = self.wait_failures.lock().unwrap().pop_front();
        if let Some(error) = failure {
            return Err(error);
        }
        self.inner.wait_for(selector, state, timeout_ms).await
    }

    async fn sleep(&self, duration_ms: u64) {
        self.record(format!("sleep {duration_ms}"));
    }

    async fn content(&self) -> Result<String, PageError> {
        self.record("content".to_string());
        self.inner.content().await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        self.record(format!("screenshot {}", path.display()));
        self.inner.screenshot(path).await
    }
}
