use std::env;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use futures::future;
use futures::stream::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::sse::{StreamEvent, process_sse};
use crate::types::{ChatCompletion, ChatRequest};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default API root; `chat/completions` is resolved against it.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A stream of reply fragments in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// How the reply should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Wait for the whole reply.
    Blocking,
    /// Receive the reply incrementally.
    Streaming,
}

impl ResponseMode {
    /// Streaming when `stream` is true, blocking otherwise.
    pub fn from_flag(stream: bool) -> Self {
        if stream {
            ResponseMode::Streaming
        } else {
            ResponseMode::Blocking
        }
    }
}

/// A reply from a completion endpoint.
pub enum Reply {
    /// The full reply text.
    Complete(String),
    /// Fragments still to be read.
    Streaming(FragmentStream),
}

impl Reply {
    /// Reads the whole reply, concatenating fragments in order.
    ///
    /// ```
    /// # use termgpt::{FragmentStream, Reply};
    /// # tokio_test::block_on(async {
    /// let fragments: FragmentStream = Box::pin(futures::stream::iter(vec![
    ///     Ok("Hel".to_string()),
    ///     Ok("lo".to_string()),
    /// ]));
    /// assert_eq!(Reply::Streaming(fragments).into_text().await.unwrap(), "Hello");
    /// # });
    /// ```
    pub async fn into_text(self) -> Result<String> {
        match self {
            Reply::Complete(text) => Ok(text),
            Reply::Streaming(stream) => {
                stream
                    .try_fold(String::new(), |mut text, fragment| {
                        text.push_str(&fragment);
                        future::ready(Ok(text))
                    })
                    .await
            }
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Complete(text) => f.debug_tuple("Complete").field(text).finish(),
            Reply::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// A chat-completion endpoint.
///
/// Implementations send the full conversation in every request.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the whole reply at once.
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String>;

    /// Returns the reply as a stream of fragments.
    async fn stream(&self, request: &ChatRequest<'_>) -> Result<FragmentStream>;

    /// Dispatches on `mode`.
    async fn send(&self, request: &ChatRequest<'_>, mode: ResponseMode) -> Result<Reply> {
        match mode {
            ResponseMode::Blocking => self.complete(request).await.map(Reply::Complete),
            ResponseMode::Streaming => self.stream(request).await.map(Reply::Streaming),
        }
    }
}

/// Client for an OpenAI-compatible chat-completion API.
#[derive(Debug, Clone)]
pub struct OpenAi {
    api_key: String,
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl OpenAi {
    /// Create a new client.
    ///
    /// The API key can be provided directly or read from the OPENAI_API_KEY
    /// environment variable.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: Option<String>,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = resolve_api_key(api_key, API_KEY_ENV)?;
        if HeaderValue::from_str(&format!("Bearer {api_key}")).is_err() {
            return Err(Error::authentication(
                "API key contains characters that cannot be sent in a header",
            ));
        }

        let base_url = parse_base_url(base_url.as_deref().unwrap_or(DEFAULT_API_URL))?;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
        })
    }

    /// The API root requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join("chat/completions")
            .map_err(|e| Error::url(format!("Invalid endpoint URL: {e}"), Some(e)))
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        // Validated in the constructor.
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(header::AUTHORIZATION, value);
        }
        headers
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    async fn post(&self, request: &ChatRequest<'_>, headers: HeaderMap) -> Result<Response> {
        tracing::debug!(
            model = request.model,
            messages = request.messages.len(),
            stream = request.stream,
            "sending chat completion request"
        );
        let response = self
            .client
            .post(self.endpoint()?)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        if !response.status().is_success() {
            let error = process_error_response(response).await;
            tracing::debug!(error = %error, "chat completion request failed");
            return Err(error);
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAi {
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String> {
        let request = request.clone().with_stream(false);
        let response = self.post(&request, self.default_headers()).await?;

        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(completion.text().to_string())
    }

    async fn stream(&self, request: &ChatRequest<'_>) -> Result<FragmentStream> {
        let request = request.clone().with_stream(true);
        let mut headers = self.default_headers();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let response = self.post(&request, headers).await?;

        let fragments = process_sse(response.bytes_stream())
            .take_while(|event| future::ready(!matches!(event, Ok(StreamEvent::Done))))
            .filter_map(|event| {
                future::ready(match event {
                    Ok(StreamEvent::Chunk(chunk)) => chunk
                        .fragment()
                        .filter(|fragment| !fragment.is_empty())
                        .map(|fragment| Ok(fragment.to_string())),
                    Ok(StreamEvent::Done) => None,
                    Err(e) => Some(Err(e)),
                })
            });
        Ok(Box::pin(fragments))
    }
}

fn resolve_api_key(api_key: Option<String>, variable: &str) -> Result<String> {
    match api_key {
        Some(key) if !key.trim().is_empty() => Ok(key),
        Some(_) => Err(Error::credential_missing(variable)),
        None => match env::var(variable) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::credential_missing(variable)),
        },
    }
}

fn parse_base_url(base_url: &str) -> Result<Url> {
    // Url::join replaces the last path segment unless the base ends in '/'.
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };
    Url::parse(&normalized)
        .map_err(|e| Error::url(format!("Invalid base URL {base_url:?}: {e}"), Some(e)))
}

/// Process API response errors and convert to our Error type
async fn process_error_response(response: Response) -> Error {
    let status_code = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.trim().parse::<u64>().ok());

    match response.text().await {
        Ok(body) => error_from_status(status_code, retry_after, &body),
        Err(e) => Error::http_client(
            format!("Failed to read error response: {e}"),
            Some(Box::new(e)),
        ),
    }
}

fn error_from_status(status_code: u16, retry_after: Option<u64>, body: &str) -> Error {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let detail = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.error);
    let (error_type, message, param) = match detail {
        Some(detail) => (
            detail.error_type,
            detail.message.unwrap_or_else(|| body.to_string()),
            detail.param,
        ),
        None => (None, body.to_string(), None),
    };

    // Map HTTP status code to appropriate error type
    match status_code {
        400 => Error::bad_request(message, param),
        401 => Error::authentication(message),
        403 => Error::permission(message),
        404 => Error::not_found(message),
        408 => Error::timeout(message, None),
        429 => Error::rate_limit(message, retry_after),
        500 => Error::internal_server(message),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, error_type, message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn client_creation() {
        let client = OpenAi::new(Some("sk-test".to_string())).unwrap();
        assert_eq!(client.base_url().as_str(), DEFAULT_API_URL);
        assert_eq!(
            client.endpoint().unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn base_url_without_trailing_slash() {
        let client = OpenAi::with_options(
            Some("sk-test".to_string()),
            Some("http://localhost:8080/v1".to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(
            client.endpoint().unwrap().as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn invalid_base_url() {
        let err = OpenAi::with_options(Some("sk".to_string()), Some("not a url".to_string()), None)
            .unwrap_err();
        assert!(err.to_string().contains("Invalid base URL"));
    }

    #[test]
    fn missing_credential() {
        let err = resolve_api_key(None, "TERMGPT_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(err.is_credential_missing());
        assert!(err.to_string().contains("TERMGPT_TEST_KEY_THAT_IS_NEVER_SET"));

        let err = resolve_api_key(Some("  ".to_string()), API_KEY_ENV).unwrap_err();
        assert!(err.is_credential_missing());
    }

    #[test]
    fn bad_header_key_is_rejected() {
        let err = OpenAi::new(Some("sk\nbad".to_string())).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn status_mapping() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests","param":null}}"#;
        let err = error_from_status(429, Some(20), body);
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("Rate limit reached"));

        assert!(error_from_status(401, None, "{}").is_authentication());
        assert!(error_from_status(500, None, "oops").is_server_error());
        assert!(error_from_status(503, None, "").is_server_error());
        assert!(error_from_status(408, None, "").is_timeout());
        assert_eq!(error_from_status(418, None, "teapot").status_code(), Some(418));
    }

    #[test]
    fn non_json_body_becomes_message() {
        let err = error_from_status(400, None, "plain text failure");
        assert!(err.to_string().contains("plain text failure"));
    }

    #[test]
    fn response_mode_from_flag() {
        assert_eq!(ResponseMode::from_flag(true), ResponseMode::Streaming);
        assert_eq!(ResponseMode::from_flag(false), ResponseMode::Blocking);
    }

    #[tokio::test]
    async fn reply_into_text_concatenates() {
        let fragments: FragmentStream = Box::pin(stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ]));
        let text = Reply::Streaming(fragments).into_text().await.unwrap();
        assert_eq!(text, "Hello");
        assert_eq!(
            Reply::Complete("done".to_string()).into_text().await.unwrap(),
            "done"
        );
    }

    #[tokio::test]
    async fn reply_into_text_propagates_errors() {
        let fragments: FragmentStream = Box::pin(stream::iter(vec![
            Ok("partial".to_string()),
            Err(Error::streaming("connection reset", None)),
        ]));
        assert!(Reply::Streaming(fragments).into_text().await.is_err());
    }
}
