//! OpenAI-compatible `chat/completions` client (Groq by default).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt, future};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ChatError, ChatResult};

use super::{ClientFactory, CompletionClient, CompletionRequest, FragmentStream};

#[derive(Serialize)]
struct RequestBody<'a> {
    #[serde(flatten)]
    request: &'a CompletionRequest,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// HTTP client for one API key.
pub struct GroqClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
    request_timeout: Duration,
}

impl GroqClient {
    /// Build a client for `api_key` against `config.base_url`.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(api_key: impl Into<String>, config: &ApiConfig) -> ChatResult<Self> {
        Ok(Self {
            http: build_client(config)?,
            endpoint: completions_endpoint(&config.base_url)?,
            api_key: api_key.into(),
            request_timeout: config.request_timeout,
        })
    }

    /// Full URL of the completions endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn post(&self, request: &CompletionRequest, stream: bool) -> ChatResult<reqwest::Response> {
        let body = RequestBody { request, stream };
        let mut builder = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&body);
        // Streamed replies have no overall deadline.
        if !stream {
            builder = builder.timeout(self.request_timeout);
        }

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            stream,
            "Posting completion request"
        );
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let err = api_error(status.as_u16(), &raw);
            tracing::warn!("Completion request failed: {err}");
            return Err(err);
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<String> {
        let raw = self.post(request, false).await?.text().await?;
        parse_completion(&raw)
    }

    async fn stream(&self, request: &CompletionRequest) -> ChatResult<FragmentStream> {
        let response = self.post(request, true).await?;
        Ok(decode_fragments(response.bytes_stream()))
    }
}

/// [`ClientFactory`] producing [`GroqClient`]s.
#[derive(Clone, Debug)]
pub struct GroqConnector {
    config: ApiConfig,
}

impl GroqConnector {
    /// Connector using `config` for every client.
    #[must_use]
    pub const fn new(config: ApiConfig) -> Self {
        Self { config }
    }
}

impl ClientFactory for GroqConnector {
    fn connect(&self, api_key: &str) -> ChatResult<Arc<dyn CompletionClient>> {
        let client = GroqClient::new(api_key, &self.config)?;
        tracing::info!(endpoint = %client.endpoint(), "Completion client initialized");
        Ok(Arc::new(client))
    }
}

fn build_client(config: &ApiConfig) -> ChatResult<reqwest::Client> {
    use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
    if let Ok(agent) = HeaderValue::from_str(concat!("groq-chat/", env!("CARGO_PKG_VERSION"))) {
        headers.insert(USER_AGENT, agent);
    }

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(config.connect_timeout)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()?)
}

fn completions_endpoint(base_url: &str) -> ChatResult<Url> {
    let base = base_url.trim().trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/chat/completions"))?)
}

fn api_error(status: u16, raw: &str) -> ChatError {
    let message = match serde_json::from_str::<ErrorBody>(raw) {
        Ok(body) => body.error.message,
        Err(_) if raw.trim().is_empty() => reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => raw.trim().to_string(),
    };
    ChatError::Api { status, message }
}

fn parse_completion(raw: &str) -> ChatResult<String> {
    let response: CompletionResponse = serde_json::from_str(raw)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .map(|message| message.content.unwrap_or_default())
        .ok_or_else(|| ChatError::MalformedResponse("response has no choices".to_string()))
}

fn parse_delta(payload: &str) -> ChatResult<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)?;
    if let Some(error) = chunk.error {
        return Err(ChatError::MalformedResponse(error.message));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}

/// Data line that ends a streamed reply.
const STREAM_TERMINATOR: &str = "[DONE]";

fn stream_error<E: Into<ChatError>>(err: EventStreamError<E>) -> ChatError {
    match err {
        EventStreamError::Transport(err) => err.into(),
        EventStreamError::Utf8(err) => ChatError::MalformedResponse(err.to_string()),
        EventStreamError::Parser(err) => ChatError::MalformedResponse(err.to_string()),
    }
}

/// Turn an SSE byte stream into assistant text fragments.
///
/// The stream ends at the `[DONE]` event, at the end of the body, or right
/// after the first error.
pub(crate) fn decode_fragments<S, B, E>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ChatError> + Send + 'static,
{
    let fragments = body
        .eventsource()
        .take_while(|item| {
            future::ready(!matches!(item, Ok(event) if event.data.trim() == STREAM_TERMINATOR))
        })
        .filter_map(|item| {
            future::ready(match item {
                Ok(event) if event.data.trim().is_empty() => None,
                Ok(event) => parse_delta(&event.data).transpose(),
                Err(err) => Some(Err(stream_error(err))),
            })
        })
        .scan(false, |failed, item| {
            if *failed {
                return future::ready(None);
            }
            *failed = item.is_err();
            future::ready(Some(item))
        });
    Box::pin(fragments)
}
