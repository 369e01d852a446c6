//! Engine configuration.
//!
//! All services in this crate are explicitly constructed from a
//! [`HealConfig`] and passed by handle; there is no hidden global state.

use std::path::PathBuf;
use std::time::Duration;

/// Intent of a model call, used to pick a model priority chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallPurpose {
    /// Critical analysis calls: walk the quality-first (descending) chain.
    Analysis,
    /// Bulk enrichment calls: walk the throughput-first (ascending) chain.
    Enrichment,
}

/// Configuration for one LLM provider pool.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Human-readable provider name used in logs.
    pub name: String,
    /// OpenAI-compatible chat-completions endpoint.
    pub api_url: String,
    /// Environment variable holding the credential(s).
    ///
    /// For rotating pools the value is comma-separated.
    pub key_env_var: String,
    /// Model used for the single-key provider's calls and for probes.
    pub default_model: String,
}

impl ProviderConfig {
    /// Read the configured credentials from the environment.
    ///
    /// Splits on commas so a single-key provider yields one entry.
    pub fn keys_from_env(&self) -> Vec<String> {
        std::env::var(&self.key_env_var)
            .unwrap_or_default()
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Engine-wide configuration with builder-style setters.
#[derive(Debug, Clone)]
pub struct HealConfig {
    /// On-disk location of the selector knowledge snapshot.
    pub knowledge_path: PathBuf,
    /// How long to wait for a cached selector to attach before declaring it
    /// stale. Generous on purpose: the dominant failure mode is slow load,
    /// not a broken selector.
    pub validate_timeout: Duration,
    /// Default Tier-1 retry count for wrapped operations.
    pub max_retries: usize,
    /// Fixed delay between Tier-1 retries.
    pub retry_delay: Duration,
    /// Character budget for the simplified HTML snapshot sent to the model.
    pub html_char_budget: usize,
    /// Minimum interval between provider health probes.
    pub probe_interval: Duration,
    /// Timeout for a single health probe request.
    pub probe_timeout: Duration,
    /// Timeout for a full model call.
    pub model_call_timeout: Duration,
    /// Consecutive selector failures before the store purges an entry.
    pub failure_purge_threshold: u32,
    /// Single-key provider, tried first for vision inventory calls.
    pub primary_provider: ProviderConfig,
    /// Multi-key rotating provider backing the model chains.
    pub rotating_provider: ProviderConfig,
    /// Quality-first model chain for [`CallPurpose::Analysis`].
    pub models_descending: Vec<String>,
    /// Throughput-first model chain for [`CallPurpose::Enrichment`].
    pub models_ascending: Vec<String>,
    /// Cheapest model, used for health probes.
    pub probe_model: String,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            knowledge_path: PathBuf::from("db/knowledge.json"),
            validate_timeout: Duration::from_secs(120),
            max_retries: 2,
            retry_delay: Duration::from_secs(2),
            html_char_budget: 100_000,
            probe_interval: Duration::from_secs(900),
            probe_timeout: Duration::from_secs(10),
            model_call_timeout: Duration::from_secs(180),
            failure_purge_threshold: 3,
            primary_provider: ProviderConfig {
                name: "primary".to_string(),
                api_url: "https://api.x.ai/v1/chat/completions".to_string(),
                key_env_var: "PRIMARY_API_KEY".to_string(),
                default_model: "grok-4-latest".to_string(),
            },
            rotating_provider: ProviderConfig {
                name: "rotating".to_string(),
                api_url:
                    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
                        .to_string(),
                key_env_var: "ROTATING_API_KEYS".to_string(),
                default_model: "gemini-2.5-flash-lite".to_string(),
            },
            models_descending: vec![
                "gemini-2.5-pro".to_string(),
                "gemini-3-flash-preview".to_string(),
                "gemini-2.5-flash".to_string(),
                "gemini-2.0-flash".to_string(),
            ],
            models_ascending: vec![
                "gemini-2.5-flash-lite".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-2.5-flash".to_string(),
                "gemini-3-flash-preview".to_string(),
            ],
            probe_model: "gemini-2.5-flash-lite".to_string(),
        }
    }
}

impl HealConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the knowledge snapshot path.
    pub fn with_knowledge_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_path = path.into();
        self
    }

    /// Set the selector validation timeout.
    pub fn with_validate_timeout(mut self, timeout: Duration) -> Self {
        self.validate_timeout = timeout;
        self
    }

    /// Set the default Tier-1 retry count.
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the fixed delay between retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the HTML character budget for discovery.
    pub fn with_html_char_budget(mut self, budget: usize) -> Self {
        self.html_char_budget = budget;
        self
    }

    /// Set the probe re-check interval.
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Set the primary (single-key) provider.
    pub fn with_primary_provider(mut self, provider: ProviderConfig) -> Self {
        self.primary_provider = provider;
        self
    }

    /// Set the rotating (multi-key) provider.
    pub fn with_rotating_provider(mut self, provider: ProviderConfig) -> Self {
        self.rotating_provider = provider;
        self
    }

    /// Set both model chains at once.
    pub fn with_model_chains(
        mut self,
        descending: Vec<String>,
        ascending: Vec<String>,
    ) -> Self {
        self.models_descending = descending;
        self.models_ascending = ascending;
        self
    }

    /// The model priority chain for a call purpose.
    pub fn model_chain(&self, purpose: CallPurpose) -> &[String] {
        match purpose {
            CallPurpose::Analysis => &self.models_descending,
            CallPurpose::Enrichment => &self.models_ascending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = HealConfig::default();
        assert_eq!(cfg.validate_timeout, Duration::from_secs(120));
        assert_eq!(cfg.max_retries, 2);
        assert_eq!(cfg.probe_interval, Duration::from_secs(900));
        assert_eq!(cfg.failure_purge_threshold, 3);
        assert!(!cfg.models_descending.is_empty());
        assert!(!cfg.models_ascending.is_empty());
    }

    #[test]
    fn test_builder_setters() {
        let cfg = HealConfig::new()
            .with_max_retries(5)
            .with_retry_delay(Duration::from_millis(10))
            .with_html_char_budget(5000)
            .with_knowledge_path("/tmp/kb.json");

        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.retry_delay, Duration::from_millis(10));
        assert_eq!(cfg.html_char_budget, 5000);
        assert_eq!(cfg.knowledge_path, PathBuf::from("/tmp/kb.json"));
    }

    #[test]
    fn test_model_chain_selection() {
        let cfg = HealConfig::new().with_model_chains(
            vec!["big".into(), "mid".into()],
            vec!["small".into(), "mid".into()],
        );

        assert_eq!(cfg.model_chain(CallPurpose::Analysis)[0], "big");
        assert_eq!(cfg.model_chain(CallPurpose::Enrichment)[0], "small");
    }

    #[test]
    fn test_keys_from_env_splits_commas() {
        let provider = ProviderConfig {
            name: "test".into(),
            api_url: "http://localhost".into(),
            key_env_var: "SELECTOR_HEAL_TEST_KEYS".into(),
            default_model: "m".into(),
        };

        std::env::set_var("SELECTOR_HEAL_TEST_KEYS", "k1, k2 ,,k3");
        let keys = provider.keys_from_env();
        std::env::remove_var("SELECTOR_HEAL_TEST_KEYS");

        assert_eq!(keys, vec!["k1", "k2", "k3"]);
    }
}
