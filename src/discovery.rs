//! Vision-assisted selector discovery.
//!
//! Two model calls per pass: a visual inventory from the screenshot alone,
//! then a mapping call that combines the inventory, the slimmed HTML and
//! the explicit key list. Results are applied under a strict upsert policy
//! so model hallucinations never pollute the knowledge base.

use crate::config::{CallPurpose, HealConfig};
use crate::error::{EngineError, EngineResult};
use crate::helpers::{best_effort_parse_json_object, clean_html_content};
use crate::knowledge::KnowledgeStore;
use crate::llm::{ChatModel, CompletionOptions, Message};
use crate::page::PageHandle;
use crate::prompts::{
    build_bulk_mapping_prompt, build_targeted_mapping_prompt, VISUAL_INVENTORY_PROMPT,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How a discovery pass scopes its key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Resolve exactly one element key; the key is accepted even if new.
    Targeted(String),
    /// Re-resolve every key already known under the context; unknown keys
    /// returned by the model are discarded.
    Bulk,
}

/// Screenshot + HTML + two model calls → selector upserts.
pub struct VisionDiscovery {
    cfg: HealConfig,
    store: Arc<KnowledgeStore>,
    model: Arc<dyn ChatModel>,
}

impl VisionDiscovery {
    /// Build a discovery engine over a shared store and model backend.
    pub fn new(cfg: HealConfig, store: Arc<KnowledgeStore>, model: Arc<dyn ChatModel>) -> Self {
        Self { cfg, store, model }
    }

    /// Run one discovery pass for `context`.
    ///
    /// Returns the number of selectors upserted. Zero found in bulk mode is
    /// a valid outcome (elements may live behind unopened tabs); capture or
    /// parse failures are errors and mutate nothing.
    pub async fn discover(
        &self,
        page: &dyn PageHandle,
        context: &str,
        mode: DiscoveryMode,
        diagnostic: Option<&str>,
    ) -> EngineResult<usize> {
        log::debug!("discovery pass for '{context}' on {}", page.url());
        let existing: HashSet<String> = self.store.context_keys(context).into_iter().collect();

        let keys_to_find: Vec<String> = match &mode {
            DiscoveryMode::Targeted(key) => {
                log::info!("targeted discovery for '{key}' in '{context}'");
                vec![key.clone()]
            }
            DiscoveryMode::Bulk => {
                log::info!(
                    "bulk discovery for context '{context}' ({} keys)",
                    existing.len()
                );
                existing.iter().cloned().collect()
            }
        };
        if keys_to_find.is_empty() {
            log::debug!("no keys known under '{context}'; nothing to discover");
            return Ok(0);
        }

        let screenshot = page.screenshot().await?;
        if screenshot.is_empty() {
            return Err(EngineError::Page("screenshot capture returned no data".into()));
        }
        let html = page.html().await?;
        let html = clean_html_content(&html, self.cfg.html_char_budget);

        // First call: visual inventory from the screenshot alone.
        let inventory = self
            .model
            .complete(
                CallPurpose::Analysis,
                vec![Message::user_with_image(
                    VISUAL_INVENTORY_PROMPT,
                    BASE64.encode(&screenshot),
                )],
                &CompletionOptions::default(),
            )
            .await?;
        if inventory.trim().is_empty() {
            return Err(EngineError::Remote("empty visual inventory response".into()));
        }

        // Second call: map the inventory plus HTML onto selector strings.
        let (prompt, purpose) = match &mode {
            DiscoveryMode::Targeted(key) => (
                build_targeted_mapping_prompt(context, key, diagnostic, &inventory, &html),
                CallPurpose::Analysis,
            ),
            DiscoveryMode::Bulk => (
                build_bulk_mapping_prompt(&keys_to_find, &inventory, &html),
                CallPurpose::Enrichment,
            ),
        };

        let raw = self
            .model
            .complete(purpose, vec![Message::user(prompt)], &CompletionOptions::json())
            .await?;
        let parsed = best_effort_parse_json_object(&raw)?;
        let mapping = parsed
            .as_object()
            .ok_or(EngineError::InvalidField("selector mapping was not an object"))?;

        // Strict upsert: bulk mode only accepts pre-existing keys; targeted
        // mode accepts the single requested key even when new.
        let mut accepted: HashMap<String, String> = HashMap::new();
        for (key, value) in mapping {
            let Some(selector) = value.as_str() else {
                log::warn!("mapping for '{key}' was not a string; ignored");
                continue;
            };
            if selector.trim().is_empty() {
                continue;
            }

            match &mode {
                DiscoveryMode::Targeted(target) => {
                    if key == target {
                        accepted.insert(key.clone(), selector.to_string());
                    }
                }
                DiscoveryMode::Bulk => {
                    if existing.contains(key) {
                        accepted.insert(key.clone(), selector.to_string());
                    } else {
                        log::warn!(
                            "model hallucinated key '{key}' in '{context}'; ignored (strict upsert)"
                        );
                    }
                }
            }
        }

        let count = self.store.upsert_batch(context, &accepted);
        match &mode {
            DiscoveryMode::Targeted(key) if count > 0 => {
                log::info!("healed '{key}' in '{context}'");
            }
            DiscoveryMode::Targeted(key) => {
                log::info!(
                    "'{key}' not found in current page state; it may require interaction to reveal"
                );
            }
            DiscoveryMode::Bulk => {
                log::info!(
                    "upserted {count}/{} elements in context '{context}'",
                    keys_to_find.len()
                );
            }
        }
        Ok(count)
    }
}
