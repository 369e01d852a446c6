//! # selector_heal
//!
//! A self-healing selector resolution engine for browser automation.
//!
//! Scrapers break when site markup changes. This crate keeps a persistent
//! knowledge base of CSS selectors keyed by (page context, logical element),
//! validates them against the live page before use, and repairs stale
//! entries automatically with a vision-capable language model: one call to
//! inventory a screenshot, one call to map logical keys onto fresh
//! selectors, applied under a strict upsert policy.
//!
//! ## Features
//!
//! - **Persistent knowledge base**: JSON-backed selector store with atomic
//!   writes and failure-decay eviction
//! - **Transparent healing**: `resolve` validates cached selectors and
//!   repairs them in place on staleness
//! - **Retry escalation**: fixed-delay retries, then exactly one heal pass
//!   and one recovery attempt
//! - **Provider health rotation**: credential probing, round-robin key
//!   rotation, per-model rate-limit tracking, quality-first or
//!   throughput-first model chains
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use selector_heal::{
//!     ChatModel, HealConfig, KnowledgeStore, ProviderHealthManager,
//!     RoutedClient, SelectorResolver,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = HealConfig::default();
//!     let store = Arc::new(KnowledgeStore::open(
//!         &cfg.knowledge_path,
//!         cfg.failure_purge_threshold,
//!     ));
//!     let health = Arc::new(ProviderHealthManager::new(cfg.clone()));
//!     let model: Arc<dyn ChatModel> = Arc::new(RoutedClient::new(cfg.clone(), health));
//!     let resolver = SelectorResolver::new(cfg, store, model);
//!
//!     // `page` is your PageHandle implementation (e.g. over chromiumoxide).
//!     let selector = resolver.resolve(&page, "match_page", "home_score").await?;
//!     if !selector.is_empty() {
//!         let text = page.inner_text(&selector, std::time::Duration::from_secs(5)).await?;
//!         println!("home score: {text}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Retry with Healing
//!
//! ```rust,ignore
//! use selector_heal::{run_with_healing, HealPolicy, ResolverHeal};
//!
//! let policy = HealPolicy::from_config(&cfg);
//! let heal = ResolverHeal::new(&resolver, &page, "match_page", "home_score");
//!
//! let score = run_with_healing(&policy, || async {
//!     let sel = resolver.resolve(&page, "match_page", "home_score").await?;
//!     page.inner_text(&sel, std::time::Duration::from_secs(5)).await
//! }, Some(&heal)).await?;
//! ```

#![warn(missing_docs)]

mod config;
mod discovery;
mod error;
mod health;
pub mod helpers;
mod knowledge;
mod llm;
mod page;
mod prompts;
mod resolver;
mod retry;

pub use config::{CallPurpose, HealConfig, ProviderConfig};
pub use discovery::{DiscoveryMode, VisionDiscovery};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use health::ProviderHealthManager;
pub use knowledge::KnowledgeStore;
pub use llm::{ChatModel, CompletionOptions, ContentPart, ImageUrl, Message, MessageContent, RoutedClient};
pub use page::PageHandle;
pub use prompts::{build_bulk_mapping_prompt, build_targeted_mapping_prompt, VISUAL_INVENTORY_PROMPT};
pub use resolver::SelectorResolver;
pub use retry::{run_with_healing, Heal, HealPolicy, ResolverHeal};
