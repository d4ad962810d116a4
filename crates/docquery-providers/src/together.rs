use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use docquery_core::config::{DEFAULT_ENDPOINT, ENV_TOGETHER_API_KEY};
use docquery_core::{
    Completion, CompletionProvider, CompletionRequest, DocqueryConfig, Error, Result, TokenUsage,
};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider for the Together AI chat completions API (OpenAI compatible).
pub struct TogetherProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Together API key.
    api_key: String,
    /// Chat completions endpoint.
    endpoint: String,
}

impl TogetherProvider {
    /// Creates a new `TogetherProvider` with the given API key.
    ///
    /// # Errors
    /// Returns an error if the key is empty or the HTTP client cannot be built.
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_timeout(api_key, DEFAULT_TIMEOUT)
    }

    /// Creates a provider whose requests time out after `timeout`.
    ///
    /// # Errors
    /// Returns an error if the key is empty or the HTTP client cannot be built.
    pub fn with_timeout(api_key: String, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_TOGETHER_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        })
    }

    /// Creates a provider from config, falling back to `TOGETHER_API_KEY`.
    ///
    /// # Errors
    /// Returns an error if no API key is available.
    pub fn from_config(config: &DocqueryConfig) -> Result<Self> {
        let api_key = config.get_api_key().ok_or_else(|| {
            Error::MissingApiKey(format!(
                "{ENV_TOGETHER_API_KEY} or config.toml together_api_key"
            ))
        })?;
        let provider = Self::with_timeout(
            api_key,
            Duration::from_secs(config.model.timeout_seconds),
        )?;
        Ok(provider.with_endpoint(config.model.endpoint.clone()))
    }

    /// Points the provider at a different chat completions endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

/// Request payload sent to the chat completions endpoint.
#[derive(Debug, Serialize)]
struct ChatRequest<'req> {
    /// Model identifier.
    model: &'req str,
    /// Single user message carrying the whole prompt.
    messages: [ChatMessage<'req>; 1],
    /// Maximum number of tokens allowed in the completion.
    max_tokens: u32,
    /// Sampling temperature.
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'req> {
    role: &'static str,
    content: &'req str,
}

/// Response payload returned on success.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    /// Candidate completions; only the first is used.
    #[serde(default)]
    choices: Vec<ChatChoice>,
    /// Token accounting, if reported.
    usage: Option<ChatUsage>,
}

/// A choice carries either a chat `message` or legacy completion `text`.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Error body shape shared by OpenAI-compatible services.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    /// Some services send a string here, others a number.
    #[serde(default)]
    code: Option<JsonValue>,
}

impl ErrorDetail {
    fn is_rate_limit(&self) -> bool {
        [self.kind.as_deref(), self.code.as_ref().and_then(JsonValue::as_str)]
            .into_iter()
            .flatten()
            .any(|tag| tag.starts_with("rate_limit"))
    }
}

/// Classifies a non-success HTTP response.
///
/// HTTP 429, or an error body typed as a rate limit, is transient; every
/// other failure is terminal.
fn classify_failure(status: StatusCode, body: &str) -> Error {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error);
    let message = detail
        .as_ref()
        .and_then(|inner| inner.message.clone())
        .unwrap_or_else(|| body.trim().to_owned());

    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || detail.as_ref().is_some_and(ErrorDetail::is_rate_limit);

    if rate_limited {
        Error::RateLimited(format!("Together API {status}: {message}"))
    } else {
        Error::Provider(format!("Together API error {status}: {message}"))
    }
}

/// Pulls the answer text out of the first choice.
fn first_choice_text(response: ChatResponse) -> Result<String> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::InvalidResponse("No choices in Together response".to_owned()))?;

    choice
        .message
        .and_then(|message| message.content)
        .or(choice.text)
        .ok_or_else(|| Error::InvalidResponse("First choice carried no text".to_owned()))
}

#[async_trait]
impl CompletionProvider for TogetherProvider {
    fn name(&self) -> &'static str {
        "together"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let start = Instant::now();

        let body = ChatRequest {
            model: &request.model,
            messages: [ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_text));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|err| Error::InvalidResponse(format!("Failed to parse response: {err}")))?;

        let tokens_used = api_response
            .usage
            .as_ref()
            .map_or_else(TokenUsage::default, |usage| TokenUsage {
                input: usage.prompt_tokens,
                output: usage.completion_tokens,
            });
        let text = first_choice_text(api_response)?;
        let latency_ms = start.elapsed().as_millis() as u64;
        debug!(latency_ms, output_tokens = tokens_used.output, "Together completion received");

        Ok(Completion {
            text,
            provider: self.name().to_owned(),
            tokens_used,
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::from_str;
    use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
    use tokio::net::TcpListener;

    /// Serves exactly one canned HTTP response and returns the endpoint URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buffer = [0u8; 4096];
            while !request_complete(&received) {
                let read = socket.read(&mut buffer).await.unwrap();
                if read == 0 {
                    break;
                }
                received.extend_from_slice(&buffer[..read]);
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{addr}/v1/chat/completions")
    }

    fn request_complete(received: &[u8]) -> bool {
        let text = String::from_utf8_lossy(received);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        received.len() >= header_end + 4 + content_length
    }

    fn provider_for(endpoint: String) -> TogetherProvider {
        TogetherProvider::new("test_key".to_owned())
            .unwrap()
            .with_endpoint(endpoint)
    }

    #[test]
    fn test_new_with_empty_api_key() {
        let result = TogetherProvider::new(String::new());
        assert!(matches!(result, Err(Error::MissingApiKey(_))));
    }

    #[test]
    fn test_from_config_uses_config_key_and_endpoint() {
        let mut config = DocqueryConfig::default();
        config.api_keys.together_api_key = Some("config_key".to_owned());
        config.model.endpoint = "http://localhost:9/v1/chat/completions".to_owned();

        let provider = TogetherProvider::from_config(&config).unwrap();
        assert_eq!(provider.api_key, "config_key");
        assert_eq!(provider.endpoint, "http://localhost:9/v1/chat/completions");
        assert_eq!(provider.name(), "together");
    }

    #[test]
    fn test_classify_429_as_rate_limited() {
        let error = classify_failure(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(error.is_retryable());
        assert!(error.to_string().contains("slow down"));
    }

    #[test]
    fn test_classify_rate_limit_body_as_rate_limited() {
        let body = r#"{"error":{"message":"You are over quota","type":"rate_limit_exceeded"}}"#;
        let error = classify_failure(StatusCode::SERVICE_UNAVAILABLE, body);
        assert!(matches!(error, Error::RateLimited(message) if message.contains("over quota")));
    }

    #[test]
    fn test_classify_tolerates_numeric_error_code() {
        let body = r#"{"error":{"message":"Too many tokens","type":"rate_limit_exceeded","code":429}}"#;
        let error = classify_failure(StatusCode::SERVICE_UNAVAILABLE, body);
        assert!(matches!(error, Error::RateLimited(message) if message.contains("Too many tokens")));

        let body = r#"{"error":{"message":"bad model","type":"invalid_request_error","code":400}}"#;
        let error = classify_failure(StatusCode::BAD_REQUEST, body);
        assert!(matches!(error, Error::Provider(message) if message.contains("bad model")));
    }

    #[test]
    fn test_classify_other_status_as_terminal() {
        let body = r#"{"error":{"message":"invalid model","type":"invalid_request_error"}}"#;
        let error = classify_failure(StatusCode::BAD_REQUEST, body);
        assert!(matches!(error, Error::Provider(message) if message.contains("invalid model")));
    }

    #[test]
    fn test_first_choice_prefers_message_content() {
        let response: ChatResponse = from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"chat answer"}},{"text":"second"}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "chat answer");
    }

    #[test]
    fn test_first_choice_falls_back_to_text() {
        let response: ChatResponse = from_str(r#"{"choices":[{"text":"legacy answer"}]}"#).unwrap();
        assert_eq!(first_choice_text(response).unwrap(), "legacy answer");
    }

    #[test]
    fn test_empty_choices_is_invalid_response() {
        let response: ChatResponse = from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice_text(response),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let body = ChatRequest {
            model: "m",
            messages: [ChatMessage {
                role: "user",
                content: "prompt text",
            }],
            max_tokens: 500,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "prompt text");
        assert_eq!(json["max_tokens"], 500);
    }

    #[tokio::test]
    async fn test_complete_success_over_http() {
        let endpoint = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"The average age is 32."}}],"usage":{"prompt_tokens":12,"completion_tokens":7}}"#,
        )
        .await;
        let provider = provider_for(endpoint);

        let completion = provider
            .complete(&CompletionRequest::new("m", "What is the average age?"))
            .await
            .unwrap();
        assert_eq!(completion.text, "The average age is 32.");
        assert_eq!(completion.tokens_used.total(), 19);
        assert_eq!(completion.provider, "together");
    }

    #[tokio::test]
    async fn test_complete_rate_limited_over_http() {
        let endpoint = serve_once(
            "429 Too Many Requests",
            r#"{"error":{"message":"rate limit reached"}}"#,
        )
        .await;
        let provider = provider_for(endpoint);

        let result = provider.complete(&CompletionRequest::new("m", "q")).await;
        assert!(matches!(result, Err(Error::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_complete_server_error_is_terminal() {
        let endpoint = serve_once("500 Internal Server Error", "boom").await;
        let provider = provider_for(endpoint);

        let result = provider.complete(&CompletionRequest::new("m", "q")).await;
        assert!(matches!(result, Err(Error::Provider(message)) if message.contains("boom")));
    }
}
