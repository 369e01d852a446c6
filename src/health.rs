//! LLM provider health tracking and credential rotation.
//!
//! Tracks liveness of two provider pools: a single-key primary provider and
//! a rotating multi-key provider. Probes are time-boxed (one burst per
//! interval) and guarded by a single initialization lock so concurrent
//! callers wait on one probe instead of stampeding the providers.
//!
//! Rate-limited credentials are excluded per model only; hard auth failures
//! remove a credential from every pool for the life of the process.

use crate::config::{CallPurpose, HealConfig};
use crate::helpers::mask_key;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

struct HealthState {
    primary_active: bool,
    /// Rotating keys as configured at startup.
    configured: Vec<String>,
    /// Rotating keys that passed (or were optimistically covered by) a probe.
    active: Vec<String>,
    rotation_index: usize,
    /// model → keys exhausted (rate-limited) for that model.
    exhausted: HashMap<String, HashSet<String>>,
    last_probe: Option<Instant>,
    initialized: bool,
}

/// Shared health and routing state for all model calls.
pub struct ProviderHealthManager {
    cfg: HealConfig,
    primary_key: Option<String>,
    state: Mutex<HealthState>,
    /// Serializes the probe burst; held across the probe awaits.
    init_lock: tokio::sync::Mutex<()>,
    client: reqwest::Client,
}

impl ProviderHealthManager {
    /// Build a manager reading credentials from the environment once.
    pub fn new(cfg: HealConfig) -> Self {
        let primary_key = cfg.primary_provider.keys_from_env().into_iter().next();
        let rotating_keys = cfg.rotating_provider.keys_from_env();
        Self::with_keys(cfg, primary_key, rotating_keys)
    }

    /// Build a manager with explicit credentials (dependency injection).
    pub fn with_keys(
        cfg: HealConfig,
        primary_key: Option<String>,
        rotating_keys: Vec<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(cfg.probe_timeout)
            .build()
            .unwrap_or_default();

        Self {
            cfg,
            primary_key,
            state: Mutex::new(HealthState {
                primary_active: false,
                configured: rotating_keys,
                active: Vec::new(),
                rotation_index: 0,
                exhausted: HashMap::new(),
                last_probe: None,
                initialized: false,
            }),
            init_lock: tokio::sync::Mutex::new(()),
            client,
        }
    }

    /// Probe providers if this is the first call or the interval elapsed.
    ///
    /// Safe to call on every model invocation: the fast path is a single
    /// lock acquisition, and concurrent callers reuse one in-flight probe.
    pub async fn ensure_initialized(&self) {
        if self.is_fresh() {
            return;
        }
        let _guard = self.init_lock.lock().await;
        if self.is_fresh() {
            return;
        }
        self.probe_all().await;
    }

    fn is_fresh(&self) -> bool {
        let st = self.state.lock();
        st.initialized
            && st
                .last_probe
                .is_some_and(|t| t.elapsed() < self.cfg.probe_interval)
    }

    async fn probe_all(&self) {
        log::info!("probing llm providers");

        let primary_alive = match &self.primary_key {
            Some(key) => {
                self.probe_key(
                    &self.cfg.primary_provider.api_url,
                    &self.cfg.primary_provider.default_model,
                    key,
                )
                .await
            }
            None => false,
        };
        log::info!(
            "provider '{}': {}",
            self.cfg.primary_provider.name,
            if primary_alive { "active" } else { "inactive" }
        );

        // Probing every rotating key would burn quota; sample first, middle
        // and last, and mark the whole pool active if any sample is alive.
        let configured = self.state.lock().configured.clone();
        let mut any_alive = false;
        if !configured.is_empty() {
            let mut sample: Vec<usize> = vec![0, configured.len() / 2, configured.len() - 1];
            sample.dedup();
            for idx in sample {
                if self
                    .probe_key(
                        &self.cfg.rotating_provider.api_url,
                        &self.cfg.probe_model,
                        &configured[idx],
                    )
                    .await
                {
                    any_alive = true;
                    break;
                }
            }
        }

        let mut st = self.state.lock();
        st.primary_active = primary_alive;
        st.active = if any_alive {
            st.configured.clone()
        } else {
            Vec::new()
        };
        st.exhausted.clear();
        st.last_probe = Some(Instant::now());
        st.initialized = true;

        log::info!(
            "provider '{}': {} ({} keys)",
            self.cfg.rotating_provider.name,
            if any_alive { "active" } else { "inactive" },
            st.active.len()
        );
        if !st.primary_active && st.active.is_empty() {
            log::error!("all llm providers are offline; healing is unavailable");
        }
    }

    /// Minimal liveness request. 200 and 429 both mean the credential is
    /// usable (429 is rate-limited-but-alive); auth or transport failures
    /// mean dead.
    async fn probe_key(&self, api_url: &str, model: &str, api_key: &str) -> bool {
        let payload = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": "ping"}],
            "max_tokens": 5,
            "temperature": 0,
        });

        match self
            .client
            .post(api_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                status.is_success() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Err(_) => false,
        }
    }

    /// Provider names ordered active-first.
    pub fn ordered_providers(&self) -> Vec<String> {
        let st = self.state.lock();
        let primary = self.cfg.primary_provider.name.clone();
        let rotating = self.cfg.rotating_provider.name.clone();
        if !st.initialized {
            return vec![primary, rotating];
        }

        let mut active = Vec::new();
        let mut inactive = Vec::new();
        if st.primary_active {
            active.push(primary);
        } else {
            inactive.push(primary);
        }
        if !st.active.is_empty() {
            active.push(rotating);
        } else {
            inactive.push(rotating);
        }
        active.extend(inactive);
        active
    }

    /// Whether the named provider has at least one usable credential.
    pub fn is_provider_active(&self, name: &str) -> bool {
        let st = self.state.lock();
        if name == self.cfg.primary_provider.name {
            st.primary_active
        } else if name == self.cfg.rotating_provider.name {
            !st.active.is_empty()
        } else {
            false
        }
    }

    /// Model priority chain for a call purpose.
    pub fn model_chain(&self, purpose: CallPurpose) -> Vec<String> {
        self.cfg.model_chain(purpose).to_vec()
    }

    /// The primary provider's single credential, if configured.
    pub fn primary_key(&self) -> Option<String> {
        self.primary_key.clone()
    }

    /// Next rotating credential for `model`, strict round-robin over the
    /// eligible pool. `None` means every key is exhausted for this model
    /// and the caller should step down the chain.
    pub fn next_rotating_key(&self, model: &str) -> Option<String> {
        let mut st = self.state.lock();

        let pool = if st.active.is_empty() {
            st.configured.clone()
        } else {
            st.active.clone()
        };
        if pool.is_empty() {
            return None;
        }

        let exhausted = st.exhausted.get(model).cloned().unwrap_or_default();
        let available: Vec<String> = pool
            .into_iter()
            .filter(|k| !exhausted.contains(k))
            .collect();
        if available.is_empty() {
            return None;
        }

        let key = available[st.rotation_index % available.len()].clone();
        st.rotation_index = st.rotation_index.wrapping_add(1);
        Some(key)
    }

    /// Mark a credential rate-limited for one model only.
    pub fn on_rate_limited(&self, key: &str, model: &str) {
        let mut st = self.state.lock();
        st.exhausted
            .entry(model.to_string())
            .or_default()
            .insert(key.to_string());

        let exhausted_for_model = st.exhausted.get(model).map(|s| s.len()).unwrap_or(0);
        let pool_len = if st.active.is_empty() {
            st.configured.len()
        } else {
            st.active.len()
        };
        let remaining = pool_len.saturating_sub(exhausted_for_model);
        log::warn!(
            "key {} exhausted for {model}; {remaining} keys remaining for this model",
            mask_key(key)
        );
        if remaining == 0 {
            log::warn!("all keys exhausted for {model}; callers will downgrade");
        }
    }

    /// Permanently remove a credential from every pool.
    pub fn on_forbidden(&self, key: &str) {
        let mut st = self.state.lock();
        st.active.retain(|k| k != key);
        st.configured.retain(|k| k != key);
        log::warn!(
            "key {} permanently removed (forbidden); {} active, {} configured",
            mask_key(key),
            st.active.len(),
            st.configured.len()
        );
    }

    /// Clear per-model exhaustion. Run once per outer operational cycle,
    /// not per request.
    pub fn reset_exhaustion(&self) {
        self.state.lock().exhausted.clear();
    }
}
