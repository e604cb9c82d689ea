use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pacemaker_core::interfaces::{LlmBackend, LlmBackendError, LlmCompletion};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    text: String,
    #[serde(default)]
    tokens_used: u32,
}

/// The concrete `LlmBackend` the service binary wires up by default:
/// a single JSON-over-HTTP endpoint, authenticated with a bearer credential
/// acquired from the credential pool by the caller.
pub struct HttpLlmBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpLlmBackend {
    pub fn new(endpoint: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            model,
        }
    }
}

/// Gateways that don't set the expected status code still announce these
/// conditions in the response body (spec §7's taxonomy is "HTTP 429, or
/// message contains ..." / "401/403 or textual ..." — both halves matter).
const RATE_LIMIT_MARKERS: [&str; 2] = ["rate limit", "quota exceeded"];
const CREDENTIAL_INVALID_MARKERS: [&str; 2] = ["invalid key", "api key"];

fn body_contains_any(body: &str, markers: &[&str]) -> bool {
    let lower = body.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

#[async_trait]
impl LlmBackend for HttpLlmBackend {
    async fn complete(&self, prompt: &str, credential: &str) -> Result<LlmCompletion, LlmBackendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .json(&CompletionRequest { model: &self.model, prompt })
            .send()
            .await
            .map_err(|e| LlmBackendError::TransientRemote(e.to_string()))?;

        let status = response.status();
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(|secs| secs * 1000)
            .unwrap_or(1000);

        let body_text = response
            .text()
            .await
            .map_err(|e| LlmBackendError::TransientRemote(e.to_string()))?;

        if status.as_u16() == 429 || body_contains_any(&body_text, &RATE_LIMIT_MARKERS) {
            return Err(LlmBackendError::RateLimited { retry_after_ms });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 || body_contains_any(&body_text, &CREDENTIAL_INVALID_MARKERS) {
            return Err(LlmBackendError::CredentialInvalid(format!(
                "backend rejected credential with status {status}"
            )));
        }
        if !status.is_success() {
            return Err(LlmBackendError::TransientRemote(format!(
                "backend returned status {status}"
            )));
        }

        let body: CompletionResponse =
            serde_json::from_str(&body_text).map_err(|e| LlmBackendError::TransientRemote(e.to_string()))?;

        Ok(LlmCompletion { text: body.text, tokens_used: body.tokens_used })
    }
}
