//! Provider-routing chat client.
//!
//! Walks providers active-first, then the purpose-selected model chain of
//! the rotating pool, feeding rate-limit and auth failures back into the
//! health manager. Callers see a single `complete` that either returns
//! response text or a final error once every option is spent.

use super::{ChatModel, CompletionOptions, Message};
use crate::config::{CallPurpose, HealConfig};
use crate::error::{EngineError, EngineResult};
use crate::health::ProviderHealthManager;
use crate::helpers::mask_key;
use async_trait::async_trait;
use std::sync::Arc;

/// [`ChatModel`] implementation backed by OpenAI-compatible HTTP endpoints.
pub struct RoutedClient {
    cfg: HealConfig,
    health: Arc<ProviderHealthManager>,
    client: reqwest::Client,
}

impl RoutedClient {
    /// Build a routed client sharing the given health manager.
    pub fn new(cfg: HealConfig, health: Arc<ProviderHealthManager>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(cfg.model_call_timeout)
            .build()
            .unwrap_or_default();
        Self {
            cfg,
            health,
            client,
        }
    }

    /// One request against one endpoint/credential/model.
    async fn call_endpoint(
        &self,
        api_url: &str,
        api_key: &str,
        model: &str,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> EngineResult<String> {
        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": false,
        });
        if options.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(api_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EngineError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(EngineError::Forbidden);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EngineError::Remote(format!("HTTP {status}: {error_text}")));
        }

        let json: serde_json::Value = response.json().await?;
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or(EngineError::MissingField("choices[0].message.content"))?
            .to_string();

        Ok(content)
    }

    /// Walk the rotating provider's chain for `purpose`, drawing keys from
    /// the health manager and reporting failures back.
    async fn complete_rotating(
        &self,
        purpose: CallPurpose,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> EngineResult<String> {
        let mut last_err: Option<EngineError> = None;

        for model in self.health.model_chain(purpose) {
            loop {
                let Some(key) = self.health.next_rotating_key(&model) else {
                    // Every key exhausted for this model: step down the chain.
                    log::debug!("stepping down from model {model}");
                    break;
                };

                match self
                    .call_endpoint(
                        &self.cfg.rotating_provider.api_url,
                        &key,
                        &model,
                        messages,
                        options,
                    )
                    .await
                {
                    Ok(text) => return Ok(text),
                    Err(EngineError::RateLimited) => {
                        self.health.on_rate_limited(&key, &model);
                    }
                    Err(EngineError::Forbidden) => {
                        self.health.on_forbidden(&key);
                    }
                    Err(e) => {
                        log::warn!(
                            "model {model} via key {} failed: {e}",
                            mask_key(&key)
                        );
                        last_err = Some(e);
                        break;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(EngineError::NoCredentials {
            model: self
                .health
                .model_chain(purpose)
                .last()
                .cloned()
                .unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl ChatModel for RoutedClient {
    async fn complete(
        &self,
        purpose: CallPurpose,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> EngineResult<String> {
        self.health.ensure_initialized().await;

        let mut last_err: Option<EngineError> = None;
        for provider in self.health.ordered_providers() {
            if !self.health.is_provider_active(&provider) {
                continue;
            }

            if provider == self.cfg.primary_provider.name {
                let Some(key) = self.health.primary_key() else {
                    continue;
                };
                match self
                    .call_endpoint(
                        &self.cfg.primary_provider.api_url,
                        &key,
                        &self.cfg.primary_provider.default_model,
                        &messages,
                        options,
                    )
                    .await
                {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        log::warn!("primary provider failed: {e}; falling back");
                        last_err = Some(e);
                    }
                }
            } else {
                match self.complete_rotating(purpose, &messages, options).await {
                    Ok(text) => return Ok(text),
                    Err(e) => last_err = Some(e),
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| EngineError::Remote("no usable llm provider".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_without_providers_fails_fast() {
        let cfg = HealConfig::default();
        let health = Arc::new(ProviderHealthManager::with_keys(
            cfg.clone(),
            None,
            Vec::new(),
        ));
        let client = RoutedClient::new(cfg, health);

        let err = client
            .complete(
                CallPurpose::Analysis,
                vec![Message::user("ping")],
                &CompletionOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Remote(_)));
    }
}
