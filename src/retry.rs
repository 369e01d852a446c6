//! Retry-with-healing combinator.
//!
//! Two escalation tiers around an operation closure: fixed-delay retries
//! first, then exactly one heal pass followed by one recovery attempt. The
//! heal escape hatch fires at most once per invocation, which keeps a
//! permanently-broken page from looping screenshot-and-ask forever.

use crate::config::HealConfig;
use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::page::PageHandle;
use crate::resolver::SelectorResolver;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Retry/healing parameters for one wrapped operation.
#[derive(Debug, Clone)]
pub struct HealPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: usize,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Whether the heal tier may run at all.
    pub enable_healing: bool,
}

impl Default for HealPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_secs(2),
            enable_healing: true,
        }
    }
}

impl HealPolicy {
    /// Derive a policy from engine configuration.
    pub fn from_config(cfg: &HealConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            delay: cfg.retry_delay,
            enable_healing: true,
        }
    }

    /// Set the retry count.
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the inter-attempt delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Disable the heal tier, leaving plain retries.
    pub fn without_healing(mut self) -> Self {
        self.enable_healing = false;
        self
    }
}

/// One-shot recovery hook invoked between the retry tier and the final
/// attempt. Returns whether recovery produced anything worth retrying with.
#[async_trait]
pub trait Heal: Send + Sync {
    /// Attempt recovery; `Ok(true)` means state changed and one more
    /// attempt of the wrapped operation is warranted.
    async fn heal(&self) -> EngineResult<bool>;
}

/// [`Heal`] adapter that re-discovers one selector through a resolver.
pub struct ResolverHeal<'a> {
    resolver: &'a SelectorResolver,
    page: &'a dyn PageHandle,
    context: &'a str,
    element: &'a str,
}

impl<'a> ResolverHeal<'a> {
    /// Bind the heal hook to a specific (context, element) on a live page.
    pub fn new(
        resolver: &'a SelectorResolver,
        page: &'a dyn PageHandle,
        context: &'a str,
        element: &'a str,
    ) -> Self {
        Self {
            resolver,
            page,
            context,
            element,
        }
    }
}

#[async_trait]
impl Heal for ResolverHeal<'_> {
    async fn heal(&self) -> EngineResult<bool> {
        let selector = self
            .resolver
            .heal(self.page, self.context, self.element)
            .await?;
        Ok(!selector.is_empty())
    }
}

/// Run `op` with tier-1 retries and an optional tier-2 heal.
///
/// Attempt sequence: initial call, then up to `policy.max_retries` retries
/// spaced by `policy.delay`. If all fail and healing is enabled with a hook
/// present, the hook runs once; a successful heal earns exactly one final
/// attempt. The terminal error comes back wrapped as fatal so callers can
/// distinguish "healing already tried" from a first-time failure.
///
/// Errors already classified [`ErrorKind::Fatal`] abort immediately without
/// retrying.
pub async fn run_with_healing<T, F, Fut>(
    policy: &HealPolicy,
    mut op: F,
    heal: Option<&dyn Heal>,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == ErrorKind::Fatal => return Err(e),
            Err(e) => {
                log::warn!(
                    "attempt {}/{} failed: {e}",
                    attempt + 1,
                    policy.max_retries + 1
                );
                last_err = Some(e);
            }
        }
        if attempt < policy.max_retries {
            tokio::time::sleep(policy.delay).await;
        }
    }

    // Infallible: the loop above always runs at least once.
    let exhausted = match last_err {
        Some(e) => e,
        None => return Err(EngineError::Timeout.into_fatal()),
    };

    let hook = match (policy.enable_healing, heal) {
        (true, Some(hook)) => hook,
        _ => return Err(exhausted.into_fatal()),
    };

    log::warn!("retries exhausted ({exhausted}); attempting selector heal");
    match hook.heal().await {
        Ok(true) => {
            log::info!("heal succeeded; one recovery attempt");
            op().await.map_err(|e| e.into_fatal())
        }
        Ok(false) => {
            log::warn!("heal found no replacement selector");
            Err(exhausted.into_fatal())
        }
        Err(heal_err) => {
            log::warn!("heal pass failed: {heal_err}");
            Err(exhausted.into_fatal())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct CountingHeal {
        calls: Mutex<u32>,
        outcome: EngineResult<bool>,
    }

    impl CountingHeal {
        fn returning(outcome: EngineResult<bool>) -> Self {
            Self {
                calls: Mutex::new(0),
                outcome,
            }
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl Heal for CountingHeal {
        async fn heal(&self) -> EngineResult<bool> {
            *self.calls.lock() += 1;
            match &self.outcome {
                Ok(b) => Ok(*b),
                Err(_) => Err(EngineError::Remote("heal backend down".into())),
            }
        }
    }

    fn fast_policy() -> HealPolicy {
        HealPolicy::default().with_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_skips_everything() {
        let heal = CountingHeal::returning(Ok(true));
        let result = run_with_healing(&fast_policy(), || async { Ok::<_, EngineError>(7) }, Some(&heal)).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(heal.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_retries() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let result = run_with_healing(
            &fast_policy(),
            move || {
                let counter = counter.clone();
                async move {
                    let mut n = counter.lock();
                    *n += 1;
                    if *n < 2 {
                        Err(EngineError::Timeout)
                    } else {
                        Ok("value")
                    }
                }
            },
            None,
        )
        .await;

        assert_eq!(result.unwrap(), "value");
        assert_eq!(*attempts.lock(), 2);
    }

    #[tokio::test]
    async fn test_heal_fires_exactly_once() {
        let heal = CountingHeal::returning(Ok(true));
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let result: EngineResult<()> = run_with_healing(
            &fast_policy(),
            move || {
                let counter = counter.clone();
                async move {
                    *counter.lock() += 1;
                    Err(EngineError::StaleSelector {
                        context: "match_page".into(),
                        element: "home_score".into(),
                    })
                }
            },
            Some(&heal),
        )
        .await;

        // Policy default is 2 retries: 3 tier-1 attempts, then one heal and
        // one recovery attempt. The heal never runs twice.
        assert!(result.is_err());
        assert_eq!(heal.call_count(), 1);
        assert_eq!(*attempts.lock(), 4);
    }

    #[tokio::test]
    async fn test_success_after_heal() {
        struct FlagHeal {
            flag: Arc<Mutex<bool>>,
            calls: Mutex<u32>,
        }

        #[async_trait]
        impl Heal for FlagHeal {
            async fn heal(&self) -> EngineResult<bool> {
                *self.calls.lock() += 1;
                *self.flag.lock() = true;
                Ok(true)
            }
        }

        let flag = Arc::new(Mutex::new(false));
        let heal = FlagHeal {
            flag: flag.clone(),
            calls: Mutex::new(0),
        };

        let op_flag = flag.clone();
        let result = run_with_healing(
            &fast_policy(),
            move || {
                let op_flag = op_flag.clone();
                async move {
                    if *op_flag.lock() {
                        Ok("recovered")
                    } else {
                        Err(EngineError::StaleSelector {
                            context: "match_page".into(),
                            element: "home_score".into(),
                        })
                    }
                }
            },
            Some(&heal),
        )
        .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(*heal.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_final_error_is_fatal() {
        let result: EngineResult<()> = run_with_healing(
            &fast_policy().without_healing(),
            || async { Err(EngineError::Timeout) },
            None,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn test_no_heal_when_disabled() {
        let heal = CountingHeal::returning(Ok(true));
        let result: EngineResult<()> = run_with_healing(
            &fast_policy().without_healing(),
            || async {
                Err(EngineError::StaleSelector {
                    context: "c".into(),
                    element: "e".into(),
                })
            },
            Some(&heal),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(heal.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_heal_returns_original_error() {
        let heal = CountingHeal::returning(Ok(false));
        let result: EngineResult<()> = run_with_healing(
            &fast_policy(),
            || async { Err(EngineError::Timeout) },
            Some(&heal),
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(heal.call_count(), 1);
        match err {
            EngineError::Fatal(inner) => assert!(matches!(*inner, EngineError::Timeout)),
            other => panic!("expected Fatal, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_without_retrying() {
        let attempts = Arc::new(Mutex::new(0u32));
        let counter = attempts.clone();

        let result: EngineResult<()> = run_with_healing(
            &fast_policy(),
            move || {
                let counter = counter.clone();
                async move {
                    *counter.lock() += 1;
                    Err(EngineError::Timeout.into_fatal())
                }
            },
            None,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*attempts.lock(), 1);
    }
}
