//! Page capability trait.
//!
//! The engine never drives a browser directly. Consumers implement
//! [`PageHandle`] over their automation backend (CDP, WebDriver, etc.) and
//! hand a reference to the resolver. Every method is a suspension point
//! bounded by the caller-supplied or configured timeout.

use crate::error::EngineResult;
use async_trait::async_trait;
use std::time::Duration;

/// Abstract handle to a live browser page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Navigate to a URL and wait for the load to settle.
    async fn navigate(&self, url: &str) -> EngineResult<()>;

    /// Wait until an element matching `selector` is attached to the DOM.
    ///
    /// Attached means present in the document, not necessarily visible.
    /// Returns `Ok(false)` on timeout rather than an error; a missing
    /// element is a normal outcome for the resolver.
    async fn wait_for_selector_attached(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> EngineResult<bool>;

    /// Capture a full-page PNG screenshot.
    async fn screenshot(&self) -> EngineResult<Vec<u8>>;

    /// Full HTML content of the current document.
    async fn html(&self) -> EngineResult<String>;

    /// Inner text of the first element matching `selector`.
    async fn inner_text(&self, selector: &str, timeout: Duration) -> EngineResult<String>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str, timeout: Duration) -> EngineResult<()>;

    /// Fill the first element matching `selector` with `text`.
    async fn fill(&self, selector: &str, text: &str, timeout: Duration) -> EngineResult<()>;

    /// Current page URL.
    fn url(&self) -> String;

    /// Current page title.
    async fn title(&self) -> EngineResult<String>;
}
