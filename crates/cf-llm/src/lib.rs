use cf_core::{retry_with_backoff, BackoffPolicy, CfError, CfResult, ErrorKind};
use genai::chat::{ChatMessage, ChatRequest, ContentPart, MessageContent};
use genai::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const DEFAULT_SEMAPHORE_PERMITS: usize = 8;
const MAX_SCHEMA_REPAIR_TURNS: u32 = 2;

/// The degradation ladder resolved once at construction (spec §4.5), replacing
/// the teacher's per-call `std::env::var` probes in `provider::*::check()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Credentials present, requests go out for real.
    Full,
    /// No credentials found for the configured provider; calls fail fast
    /// with a typed error instead of attempting a network round-trip.
    NoCredentials,
    /// Forced off, e.g. by tests, regardless of credential state.
    Disabled,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub provider: String,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_concurrency: usize,
    pub mode: Option<GatewayMode>,
}

impl GatewayConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
            max_retries: BackoffPolicy::GATEWAY.max_attempts,
            max_concurrency: DEFAULT_SEMAPHORE_PERMITS,
            mode: None,
        }
    }

    /// Force a mode regardless of environment credentials (tests use this to
    /// select [`GatewayMode::Disabled`] without touching process env vars).
    pub fn with_mode(mut self, mode: GatewayMode) -> Self {
        self.mode = Some(mode);
        self
    }

    fn resolve_mode(&self) -> GatewayMode {
        if let Some(mode) = self.mode {
            return mode;
        }
        let has_credentials = match self.provider.as_str() {
            "claude" | "anthropic" => std::env::var("ANTHROPIC_API_KEY").is_ok(),
            "openai" => std::env::var("OPENAI_API_KEY").is_ok(),
            "ollama" => true, // reachability is checked, not a static credential
            _ => false,
        };
        if has_credentials {
            GatewayMode::Full
        } else {
            GatewayMode::NoCredentials
        }
    }
}

/// Classify a `genai` chat error as retryable or not (spec §4.5/§7: "4xx are
/// non-retried"). `genai`'s own error enum isn't guaranteed stable across
/// providers, so this walks the `source()` chain looking for the underlying
/// `reqwest::Error` and inspects its HTTP status instead of matching on
/// `genai`'s variants directly.
fn classify_chat_error(e: &(dyn std::error::Error + 'static)) -> ErrorKind {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = Some(e);
    while let Some(err) = cause {
        if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
            if reqwest_err.status().is_some_and(|s| s.is_client_error()) {
                return ErrorKind::GatewayPermanent;
            }
            return ErrorKind::GatewayTransient;
        }
        cause = err.source();
    }
    ErrorKind::GatewayTransient
}

/// Wraps [`genai::Client`] behind one degradation-aware surface for every
/// consumer (pipeline enrichment, JSON repair, PDF image description).
pub struct LlmGateway {
    config: GatewayConfig,
    mode: GatewayMode,
    client: Client,
    semaphore: Arc<Semaphore>,
}

impl LlmGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let mode = config.resolve_mode();
        let semaphore = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            client: Client::default(),
            config,
            mode,
            semaphore,
        }
    }

    pub fn mode(&self) -> GatewayMode {
        self.mode
    }

    fn ensure_usable(&self) -> CfResult<()> {
        match self.mode {
            GatewayMode::Full => Ok(()),
            GatewayMode::NoCredentials => Err(CfError::new(
                ErrorKind::GatewayPermanent,
                format!("no credentials configured for provider '{}'", self.config.provider),
            )),
            GatewayMode::Disabled => Err(CfError::new(
                ErrorKind::GatewayPermanent,
                "gateway explicitly disabled",
            )),
        }
    }

    async fn exec_with_retry(&self, request: ChatRequest) -> CfResult<String> {
        self.ensure_usable()?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CfError::new(ErrorKind::GatewayPermanent, "gateway semaphore closed"))?;

        let model = self.config.model.clone();
        let client = &self.client;
        let policy = BackoffPolicy {
            max_attempts: self.config.max_retries,
            ..BackoffPolicy::GATEWAY
        };
        retry_with_backoff(policy, move |_attempt| {
            let request = request.clone();
            let model = model.clone();
            async move {
                client
                    .exec_chat(&model, request, None)
                    .await
                    .map(|resp| resp.first_text().unwrap_or_default().trim().to_string())
                    .map_err(|e| {
                        let kind = classify_chat_error(&e);
                        CfError::with_source(kind, "chat request failed", e)
                    })
            }
        })
        .await
    }

    /// Plain text completion.
    pub async fn generate_text(&self, prompt: &str) -> CfResult<String> {
        let request = ChatRequest::from_messages(vec![ChatMessage::user(prompt)]);
        self.exec_with_retry(request).await
    }

    /// Describe an embedded image (spec §4.8), grounded on the teacher's
    /// `VisionProvider::ask` image-plus-prompt message shape.
    pub async fn describe_image(&self, prompt: &str, image_bytes: &[u8], mime: &str) -> CfResult<String> {
        use base64::Engine;
        let b64 = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let image_part = ContentPart::from_binary_base64(mime, b64, None::<String>);
        let message = ChatMessage::user(MessageContent::from_text(prompt).append(image_part));
        let request = ChatRequest::from_messages(vec![message]);
        self.exec_with_retry(request).await
    }

    /// Ask the model for a value matching a schema description, with up to
    /// two repair turns if the first response fails to parse as JSON.
    pub async fn generate_structured(&self, instruction: &str, context: &str) -> CfResult<serde_json::Value> {
        let mut prompt = format!(
            "{instruction}\n\nRespond with ONLY the JSON value, no commentary, no code fences.\n\n{context}"
        );
        let mut last_err = None;
        for turn in 0..=MAX_SCHEMA_REPAIR_TURNS {
            let text = self.exec_with_retry(ChatRequest::from_messages(vec![ChatMessage::user(prompt.clone())])).await?;
            match serde_json::from_str::<serde_json::Value>(text.trim()) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(turn, error = %e, "structured response failed to parse, retrying");
                    last_err = Some(e);
                    prompt = format!(
                        "The following text must become valid JSON matching the original request. \
                         Fix only the syntax, keep all data:\n\n{text}"
                    );
                }
            }
        }
        Err(CfError::with_source(
            ErrorKind::SchemaViolation,
            "model response never parsed as JSON",
            last_err.unwrap(),
        ))
    }

    pub fn provider_name(&self) -> &str {
        &self.config.provider
    }

    pub fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Pick a sensible default model id for a provider, mirroring the teacher's
/// `default_model` lookup table.
pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "ollama" => "qwen2.5vl",
        "openai" => "gpt-4o",
        "claude" | "anthropic" => "claude-opus-4-6",
        _ => "claude-opus-4-6",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_gateway_fails_fast_without_network() {
        let gateway = LlmGateway::new(GatewayConfig::new("claude", "claude-opus-4-6").with_mode(GatewayMode::Disabled));
        let err = gateway.generate_text("hello").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GatewayPermanent);
    }

    #[tokio::test]
    async fn no_credentials_mode_is_distinguishable_from_disabled() {
        let gateway = LlmGateway::new(GatewayConfig::new("claude", "m").with_mode(GatewayMode::NoCredentials));
        assert_eq!(gateway.mode(), GatewayMode::NoCredentials);
    }

    #[test]
    fn error_with_no_reqwest_cause_defaults_to_transient() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(classify_chat_error(&io_err), ErrorKind::GatewayTransient);
    }

    #[test]
    fn default_models_match_known_providers() {
        assert_eq!(default_model("ollama"), "qwen2.5vl");
        assert_eq!(default_model("openai"), "gpt-4o");
    }
}
