//! The public selector resolution contract.
//!
//! `resolve` returns a working selector for (context, element), healing
//! transparently when the cached selector is stale or absent. Validation
//! waits generously for attachment before declaring staleness: in practice
//! the dominant failure mode is slow load, not a broken selector.

use crate::config::HealConfig;
use crate::discovery::{DiscoveryMode, VisionDiscovery};
use crate::error::EngineResult;
use crate::knowledge::KnowledgeStore;
use crate::llm::ChatModel;
use crate::page::PageHandle;
use dashmap::DashMap;
use std::sync::Arc;

/// Selector lookup with transparent self-healing.
pub struct SelectorResolver {
    cfg: HealConfig,
    store: Arc<KnowledgeStore>,
    discovery: VisionDiscovery,
    /// Last reported failure per (context, element), folded into the next
    /// targeted discovery prompt.
    diagnostics: DashMap<(String, String), String>,
}

impl SelectorResolver {
    /// Build a resolver over a shared store and model backend.
    pub fn new(cfg: HealConfig, store: Arc<KnowledgeStore>, model: Arc<dyn ChatModel>) -> Self {
        let discovery = VisionDiscovery::new(cfg.clone(), store.clone(), model);
        Self {
            cfg,
            store,
            discovery,
            diagnostics: DashMap::new(),
        }
    }

    /// Resolve a selector for (context, element).
    ///
    /// Cached and still attached → returned unchanged. Stale or missing →
    /// one targeted discovery pass, then whatever the cache now holds. An
    /// empty string means the element could not be located; that is a
    /// caller decision, not an error.
    pub async fn resolve(
        &self,
        page: &dyn PageHandle,
        context: &str,
        element: &str,
    ) -> EngineResult<String> {
        if let Some(selector) = self.store.get(context, element) {
            match page
                .wait_for_selector_attached(&selector, self.cfg.validate_timeout)
                .await
            {
                Ok(true) => return Ok(selector),
                Ok(false) => {
                    log::warn!(
                        "selector '{element}' ('{selector}') in '{context}' not attached after wait"
                    );
                }
                Err(e) => {
                    log::warn!("validation of '{element}' in '{context}' failed: {e}");
                }
            }
        }

        log::info!("selector '{element}' in '{context}' invalid or missing; starting repair");
        if let Err(e) = self.run_targeted_discovery(page, context, element).await {
            log::warn!("discovery for '{element}' in '{context}' failed: {e}");
        }

        let healed = self.store.get(context, element).unwrap_or_default();
        if healed.is_empty() {
            log::warn!("no selector found for '{element}' in '{context}' after repair");
        } else {
            log::info!("selector for '{element}' in '{context}': {healed}");
        }
        Ok(healed)
    }

    /// Re-discover every known key under `context` in one pass.
    ///
    /// Used opportunistically (e.g. once per new page-context visit) to
    /// amortize the two model calls across many keys. Returns the number of
    /// selectors refreshed.
    pub async fn resolve_bulk(
        &self,
        page: &dyn PageHandle,
        context: &str,
    ) -> EngineResult<usize> {
        self.discovery
            .discover(page, context, DiscoveryMode::Bulk, None)
            .await
    }

    /// Record a selector failure for diagnostics and decay.
    ///
    /// Does not trigger healing; the retry layer owns that decision. The
    /// reason text enriches the next targeted discovery prompt for this
    /// element.
    pub fn report_failure(&self, context: &str, element: &str, reason: &str) {
        log::warn!("failure reported for '{element}' in '{context}': {reason}");
        self.diagnostics.insert(
            (context.to_string(), element.to_string()),
            reason.to_string(),
        );
        self.store.record_failure(context, element);
    }

    /// Tier-2 heal hook: force one targeted discovery and return whatever
    /// the cache holds afterwards (empty when the element stayed missing).
    pub async fn heal(
        &self,
        page: &dyn PageHandle,
        context: &str,
        element: &str,
    ) -> EngineResult<String> {
        self.run_targeted_discovery(page, context, element).await?;
        Ok(self.store.get(context, element).unwrap_or_default())
    }

    async fn run_targeted_discovery(
        &self,
        page: &dyn PageHandle,
        context: &str,
        element: &str,
    ) -> EngineResult<usize> {
        let diagnostic = self
            .diagnostics
            .remove(&(context.to_string(), element.to_string()))
            .map(|(_, reason)| reason)
            .unwrap_or_else(|| {
                format!("Selector '{element}' in '{context}' was invalid or missing.")
            });

        self.discovery
            .discover(
                page,
                context,
                DiscoveryMode::Targeted(element.to_string()),
                Some(&diagnostic),
            )
            .await
    }

    /// The knowledge store backing this resolver.
    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }
}
