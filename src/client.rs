use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::auth::{HeaderProvider, StaticHeaders};
use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::{ChunkStream, StreamOptions, process_sse};
use crate::types::{Chat, ChatCompletionRequest, ChatRequest, Message};
use crate::utils::ids::{new_id, new_session_id};

/// Root of the hosted chat service.
pub const DEFAULT_BASE_URL: &str = "https://chat.inceptionlabs.ai";
/// Environment variable holding the API key read by [`Inception::new`].
pub const API_KEY_ENV: &str = "INCEPTION_API_KEY";
/// Environment variable overriding the base URL in [`Inception::new`].
pub const BASE_URL_ENV: &str = "INCEPTION_BASE_URL";

const CHATS_NEW_PATH: &str = "/api/v1/chats/new";
const CHATS_PATH: &str = "/api/v1/chats/";
const COMPLETIONS_PATH: &str = "/api/chat/completions";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Inception chat service.
///
/// Each client owns its header set and its own connection pool.  Cloning is cheap and
/// clones share the pool.
#[derive(Clone)]
pub struct Inception {
    headers: HeaderMap,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    chunk_timeout: Option<Duration>,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl fmt::Debug for Inception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header_names: Vec<&str> = self.headers.keys().map(|k| k.as_str()).collect();
        f.debug_struct("Inception")
            .field("headers", &header_names)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("chunk_timeout", &self.chunk_timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl Inception {
    /// Create a new client authenticated by an API key.
    ///
    /// The API key can be provided directly or read from the INCEPTION_API_KEY environment
    /// variable.  INCEPTION_BASE_URL, when set, replaces the default service root.
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::authentication(
                    "API key not provided and INCEPTION_API_KEY environment variable not set",
                )
            })?,
        };
        let headers = StaticHeaders::bearer(&api_key)?;
        Self::with_options(
            headers.header_map().clone(),
            env::var(BASE_URL_ENV).ok(),
            None,
        )
    }

    /// Create a client that sends `headers` with every request.
    pub fn with_headers(headers: HeaderMap) -> Result<Self> {
        Self::with_options(headers, None, None)
    }

    /// Create a client with custom settings.
    ///
    /// `headers` must carry an `authorization` header.  `timeout` bounds each
    /// request/response call; streaming completions are bounded only by the chunk timeout.
    pub fn with_options(
        headers: HeaderMap,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        if !headers.contains_key(header::AUTHORIZATION) {
            return Err(Error::authentication(
                "request headers carry no authorization",
            ));
        }
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let parsed = Url::parse(&base_url)?;
        if parsed.cannot_be_a_base() || !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::url(
                format!("base URL must be an http(s) URL: {base_url}"),
                None,
            ));
        }

        let client = ReqwestClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            headers,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            chunk_timeout: None,
            logger: None,
        })
    }

    /// Create a client whose headers come from `provider`.
    pub async fn from_provider(
        provider: &dyn HeaderProvider,
        base_url: Option<String>,
    ) -> Result<Self> {
        let headers = provider.headers().await?;
        Self::with_options(headers, base_url, None)
    }

    /// Bound the wait for each streamed event.  `None`, the default, waits indefinitely.
    pub fn with_chunk_timeout(mut self, chunk_timeout: Option<Duration>) -> Self {
        self.chunk_timeout = chunk_timeout;
        self
    }

    /// Install a logger that observes created chats, listings, and streamed chunks.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The service root, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The bound on request/response calls.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The bound on each streamed event, if any.
    pub fn chunk_timeout(&self) -> Option<Duration> {
        self.chunk_timeout
    }

    /// The headers attached to every request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn chat_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint(CHATS_PATH))?;
        url.path_segments_mut()
            .map_err(|_| Error::url(format!("cannot address chats under {}", self.base_url), None))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {}", e),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
        }
    }

    /// Process API response errors and convert to our Error type.
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();
        // A body we cannot read is still a failed call with a known status.
        let body = response.text().await.unwrap_or_default();
        if status_code == 401 {
            let body = body.trim();
            let message = if body.is_empty() {
                "the service rejected the credentials".to_string()
            } else {
                format!("the service rejected the credentials: {body}")
            };
            return Error::authentication(message);
        }
        Error::transport(status_code, body)
    }

    /// Send a request, returning the response only if its status is a success.
    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        CLIENT_REQUESTS.click();
        let started = Instant::now();
        let sent = request.send().await;
        CLIENT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());
        let response = sent.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            self.request_error(e)
        })?;
        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }
        Ok(response)
    }

    async fn read_json(&self, response: Response) -> Result<Value> {
        let body = response.text().await.map_err(|e| self.request_error(e))?;
        serde_json::from_str(&body).map_err(|e| {
            Error::protocol(
                format!("response is not valid JSON: {e}"),
                Some(body.clone()),
                Some(Box::new(e)),
            )
        })
    }

    /// Create a chat whose history is a single user message holding `initial_text`.
    ///
    /// Returns the chat as echoed by the service, including its assigned id.
    pub async fn create_chat(&self, initial_text: &str, model: &str) -> Result<Chat> {
        let chat = Chat::new(model, Message::user(initial_text));
        chat.validate()?;

        let request = self
            .client
            .post(self.endpoint(CHATS_NEW_PATH))
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .json(&ChatRequest::new(chat));
        let response = self.execute(request).await?;
        let mut body = self.read_json(response).await?;

        let Some(echoed) = body.get_mut("chat").map(Value::take) else {
            return Err(Error::protocol(
                "response has no `chat` field",
                Some(body.to_string()),
                None,
            ));
        };
        let raw = echoed.to_string();
        let chat: Chat = serde_json::from_value(echoed).map_err(|e| {
            Error::protocol(
                format!("`chat` does not have the expected shape: {e}"),
                Some(raw),
                Some(Box::new(e)),
            )
        })?;
        if let Some(logger) = &self.logger {
            logger.log_chat(&chat);
        }
        Ok(chat)
    }

    /// List one page of chats.
    ///
    /// The payload is returned as parsed; see [`chat_summaries`](crate::chat_summaries) for
    /// extracting ids and titles.
    pub async fn list_chats(&self, page: u32) -> Result<Value> {
        let request = self
            .client
            .get(self.endpoint(CHATS_PATH))
            .query(&[("page", page)])
            .headers(self.headers.clone())
            .timeout(self.timeout);
        let response = self.execute(request).await?;
        let listing = self.read_json(response).await?;
        if let Some(logger) = &self.logger {
            logger.log_listing(&listing);
        }
        Ok(listing)
    }

    /// Delete the chat with id `id`.
    pub async fn delete_chat(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::validation(
                "chat id must not be empty",
                Some("id".to_string()),
            ));
        }
        let request = self
            .client
            .delete(self.chat_url(id)?)
            .headers(self.headers.clone())
            .timeout(self.timeout);
        self.execute(request).await?;
        Ok(())
    }

    /// Start a streaming completion over `messages`.
    ///
    /// A fresh session id and chat id are generated when not supplied.  Errors from the
    /// request itself are returned before any streaming begins; the stream then yields one
    /// chunk per event, pulling from the connection only as it is polled.  Dropping the
    /// stream releases the connection.
    pub async fn chat_completion(
        &self,
        messages: Vec<Message>,
        model: &str,
        session_id: Option<String>,
        chat_id: Option<String>,
    ) -> Result<ChunkStream> {
        if messages.is_empty() {
            return Err(Error::validation(
                "a completion needs at least one message",
                Some("messages".to_string()),
            ));
        }
        let session_id = session_id.unwrap_or_else(new_session_id);
        let chat_id = chat_id.unwrap_or_else(new_id);
        let params = ChatCompletionRequest::new(model, messages, session_id, chat_id);

        let mut headers = self.headers.clone();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );

        let request = self
            .client
            .post(self.endpoint(COMPLETIONS_PATH))
            .headers(headers)
            .json(&params);
        let response = self.execute(request).await?;

        let options = StreamOptions::default()
            .with_chunk_timeout(self.chunk_timeout)
            .with_logger(self.logger.clone());
        Ok(Box::pin(process_sse(response.bytes_stream(), options)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> HeaderMap {
        StaticHeaders::bearer("test-key").unwrap().header_map().clone()
    }

    #[test]
    fn explicit_key_becomes_a_bearer_header() {
        let client = Inception::new(Some("abc".to_string())).unwrap();
        assert_eq!(client.headers()[header::AUTHORIZATION], "Bearer abc");
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(client.chunk_timeout(), None);
    }

    #[test]
    fn base_url_is_normalized() {
        let client =
            Inception::with_options(headers(), Some("http://localhost:8080/".into()), None)
                .unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.endpoint(CHATS_NEW_PATH),
            "http://localhost:8080/api/v1/chats/new"
        );
    }

    #[test]
    fn bad_base_urls_are_rejected() {
        let err = Inception::with_options(headers(), Some("not a url".into()), None).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
        let err =
            Inception::with_options(headers(), Some("mailto:someone@example.com".into()), None)
                .unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn headers_without_authorization_are_rejected() {
        let err = Inception::with_headers(HeaderMap::new()).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn chat_ids_are_escaped_into_the_path() {
        let client = Inception::with_headers(headers()).unwrap();
        assert_eq!(
            client.chat_url("abc-123").unwrap().as_str(),
            "https://chat.inceptionlabs.ai/api/v1/chats/abc-123"
        );
        assert_eq!(
            client.chat_url("a/b").unwrap().as_str(),
            "https://chat.inceptionlabs.ai/api/v1/chats/a%2Fb"
        );
    }

    #[test]
    fn debug_hides_header_values() {
        let client = Inception::with_headers(headers()).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("authorization"));
        assert!(!debug.contains("test-key"));
    }

    #[tokio::test]
    async fn empty_completion_is_rejected_before_sending() {
        let client = Inception::with_headers(headers()).unwrap();
        let err = client
            .chat_completion(vec![], "m", None, None)
            .await
            .err()
            .unwrap();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn empty_chat_id_is_rejected_before_sending() {
        let client = Inception::with_headers(headers()).unwrap();
        let err = client.delete_chat(" ").await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn from_provider_uses_provided_headers() {
        let provider = StaticHeaders::bearer("provided").unwrap();
        let client = Inception::from_provider(&provider, None).await.unwrap();
        assert_eq!(client.headers()[header::AUTHORIZATION], "Bearer provided");
    }
}
