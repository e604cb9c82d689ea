use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use pacemaker_core::config::{BotIdentity, LlmConfig};
use pacemaker_core::interfaces::{LlmBackend, LlmBackendError};
use pacemaker_core::types::{LlmDecision, LlmDecisionResult, StructuredContext};
use pacemaker_credentials::{CredentialOutcome, CredentialPool};

use crate::error::{LlmError, Result};
use crate::parse::{fallback_decision, parse_decision};
use crate::prompt::{build_prompt, build_reformat_prompt};

/// Deterministic jitter derived from the current timestamp, avoiding a `rand`
/// dependency — same trick the channel manager's backoff uses.
fn jitter_millis(max_millis: u64) -> u64 {
    if max_millis == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos as u64) % max_millis
}

fn backoff_delay(attempt: u32, cfg: &LlmConfig) -> Duration {
    let exp = cfg.base_delay_ms.saturating_mul(1u64 << attempt.saturating_sub(1));
    let with_jitter = exp + jitter_millis(1000);
    Duration::from_millis(with_jitter.min(cfg.cap_delay_ms))
}

/// C2: builds prompts, invokes the remote model via the `LlmBackend`
/// boundary, parses structured replies, retries across transient failures.
pub struct LlmClient {
    config: LlmConfig,
    bot: BotIdentity,
    credentials: Arc<CredentialPool>,
    backend: Arc<dyn LlmBackend>,
}

impl LlmClient {
    pub fn new(config: LlmConfig, bot: BotIdentity, credentials: Arc<CredentialPool>, backend: Arc<dyn LlmBackend>) -> Self {
        Self { config, bot, credentials, backend }
    }

    /// `generate(userMessage, structuredContext) → LLMDecision` (spec §4.2).
    #[instrument(skip(self, user_message, context))]
    pub async fn generate(&self, user_message: &str, context: &StructuredContext) -> Result<LlmDecisionResult> {
        let prompt = build_prompt(&self.bot, user_message, context);
        let mut last_err: Option<LlmError> = None;

        for attempt in 1..=self.config.max_attempts {
            let credential = self.credentials.acquire();

            match self.backend.complete(&prompt, &credential).await {
                Ok(completion) => {
                    self.credentials.report_outcome(&credential, CredentialOutcome::Success);
                    let decision = self.decide(&prompt, &completion.text).await;
                    return Ok(LlmDecisionResult {
                        decision,
                        tokens_used: completion.tokens_used,
                        correlated_inbound_ids: Vec::new(),
                    });
                }
                Err(backend_err) => {
                    self.report_failure(&credential, &backend_err);
                    let err: LlmError = backend_err.into();
                    warn!(attempt, max = self.config.max_attempts, error = %err, "llm call failed");

                    if matches!(err, LlmError::RateLimited | LlmError::CredentialInvalid(_)) {
                        self.credentials.rotate();
                    }

                    last_err = Some(err);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(backoff_delay(attempt, &self.config)).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(LlmError::Exhausted { attempts: self.config.max_attempts }))
    }

    /// One-shot reachability probe used at startup (spec §4.8
    /// `initialize()`). A failure here is logged but never fatal — the
    /// orchestrator boots regardless and the regular retry path in
    /// `generate()` handles transient backend issues on the live path.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> bool {
        let credential = self.credentials.acquire();
        match self.backend.complete("ping", &credential).await {
            Ok(_) => {
                self.credentials.report_outcome(&credential, CredentialOutcome::Success);
                true
            }
            Err(backend_err) => {
                self.report_failure(&credential, &backend_err);
                warn!(error = %backend_err, "llm backend health probe failed, continuing in degraded mode");
                false
            }
        }
    }

    fn report_failure(&self, credential: &str, err: &LlmBackendError) {
        let outcome = match err {
            LlmBackendError::RateLimited { .. } => CredentialOutcome::RateLimited,
            LlmBackendError::CredentialInvalid(_) => CredentialOutcome::CredentialInvalid,
            LlmBackendError::TransientRemote(_) => CredentialOutcome::Other,
        };
        self.credentials.report_outcome(credential, outcome);
    }

    /// Parse the raw completion text, with the one-shot reformat retry and
    /// raw-text fallback spec §4.2 step 3 describes.
    async fn decide(&self, original_prompt: &str, raw_text: &str) -> LlmDecision {
        if let Ok(decision) = parse_decision(raw_text) {
            return decision;
        }

        info!("initial response failed to parse, issuing reformat retry");
        let reformat_prompt = build_reformat_prompt(original_prompt, raw_text);
        let credential = self.credentials.acquire();
        match self.backend.complete(&reformat_prompt, &credential).await {
            Ok(completion) => {
                self.credentials.report_outcome(&credential, CredentialOutcome::Success);
                match parse_decision(&completion.text) {
                    Ok(decision) => decision,
                    Err(_) => {
                        warn!("reformat retry also failed to parse, falling back to raw text");
                        fallback_decision(raw_text)
                    }
                }
            }
            Err(backend_err) => {
                self.report_failure(&credential, &backend_err);
                warn!("reformat retry call itself failed, falling back to original raw text");
                fallback_decision(raw_text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pacemaker_core::interfaces::LlmCompletion;
    use pacemaker_core::types::ContextSummary;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cfg() -> LlmConfig {
        LlmConfig {
            model: "test-model".into(),
            max_attempts: 3,
            base_delay_ms: 1,
            cap_delay_ms: 5,
            endpoint: "http://example.invalid".into(),
        }
    }

    fn bot() -> BotIdentity {
        BotIdentity { bot_id: "bot-1".into(), bot_name: Some("Botty".into()) }
    }

    fn empty_context() -> StructuredContext {
        StructuredContext {
            summary: ContextSummary { message_count: 0, user_count: 0, timespan_seconds: 0, has_high_priority: false },
            queue_messages: vec![],
            recent_history: vec![],
        }
    }

    struct ScriptedBackend {
        responses: Vec<std::result::Result<&'static str, LlmBackendError>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn complete(&self, _prompt: &str, _credential: &str) -> std::result::Result<LlmCompletion, LlmBackendError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match &self.responses[idx.min(self.responses.len() - 1)] {
                Ok(text) => Ok(LlmCompletion { text: text.to_string(), tokens_used: 10 }),
                Err(e) => Err(clone_err(e)),
            }
        }
    }

    fn clone_err(e: &LlmBackendError) -> LlmBackendError {
        match e {
            LlmBackendError::RateLimited { retry_after_ms } => LlmBackendError::RateLimited { retry_after_ms: *retry_after_ms },
            LlmBackendError::CredentialInvalid(s) => LlmBackendError::CredentialInvalid(s.clone()),
            LlmBackendError::TransientRemote(s) => LlmBackendError::TransientRemote(s.clone()),
        }
    }

    #[tokio::test]
    async fn successful_call_parses_reply() {
        let pool = Arc::new(CredentialPool::new(vec!["k1".into()], vec![]).unwrap());
        let backend = Arc::new(ScriptedBackend {
            responses: vec![Ok(r#"{"messages": ["hi"], "thinking": "t"}"#)],
            calls: AtomicU32::new(0),
        });
        let client = LlmClient::new(cfg(), bot(), pool, backend);
        let result = client.generate("hello", &empty_context()).await.unwrap();
        assert!(matches!(result.decision, LlmDecision::Reply { .. }));
    }

    #[tokio::test]
    async fn transient_failure_then_success_retries() {
        let pool = Arc::new(CredentialPool::new(vec!["k1".into()], vec![]).unwrap());
        let backend = Arc::new(ScriptedBackend {
            responses: vec![
                Err(LlmBackendError::TransientRemote("boom".into())),
                Ok(r#"{"reason": "nothing", "thinking": "t"}"#),
            ],
            calls: AtomicU32::new(0),
        });
        let client = LlmClient::new(cfg(), bot(), pool, backend);
        let result = client.generate("hello", &empty_context()).await.unwrap();
        assert!(matches!(result.decision, LlmDecision::NoReply { .. }));
    }

    #[tokio::test]
    async fn malformed_response_falls_back_after_reformat_fails() {
        let pool = Arc::new(CredentialPool::new(vec!["k1".into()], vec![]).unwrap());
        let backend = Arc::new(ScriptedBackend {
            responses: vec![Ok("not json"), Ok("still not json")],
            calls: AtomicU32::new(0),
        });
        let client = LlmClient::new(cfg(), bot(), pool, backend);
        let result = client.generate("hello", &empty_context()).await.unwrap();
        match result.decision {
            LlmDecision::Reply { thinking, messages, .. } => {
                assert_eq!(thinking, "format fallback");
                assert_eq!(messages, vec!["not json".to_string()], "fallback must wrap the original raw text, not the reformat response");
            }
            _ => panic!("expected fallback reply"),
        }
    }

    #[tokio::test]
    async fn exhausting_all_attempts_returns_error() {
        let pool = Arc::new(CredentialPool::new(vec!["k1".into()], vec![]).unwrap());
        let backend = Arc::new(ScriptedBackend {
            responses: vec![
                Err(LlmBackendError::TransientRemote("boom".into())),
                Err(LlmBackendError::TransientRemote("boom".into())),
                Err(LlmBackendError::TransientRemote("boom".into())),
            ],
            calls: AtomicU32::new(0),
        });
        let client = LlmClient::new(cfg(), bot(), pool, backend);
        assert!(client.generate("hello", &empty_context()).await.is_err());
    }
}
