use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use tracing::{debug, info, instrument};

use crate::config::ChatConfig;
use crate::errors::{ChatError, ChatResult};
use crate::types::{ChatPayload, ChatResponse, DeleteSessionResponse, HistoryResponse};

/// Body of a streamed answer, chunk by chunk
pub type ByteStream = BoxStream<'static, ChatResult<Bytes>>;

/// Everything the chat client needs from the backend
#[async_trait]
pub trait ChatTransport: Send + Sync + Debug {
    /// POSTs a question and waits for the single JSON answer.
    async fn send(&self, payload: &ChatPayload) -> ChatResult<ChatResponse>;

    /// POSTs a question and hands back the response body once the status
    /// line has been checked.
    async fn open_stream(&self, payload: &ChatPayload) -> ChatResult<ByteStream>;

    /// Fetches the messages the backend stored for a session.
    async fn fetch_history(&self, session_id: &str) -> ChatResult<HistoryResponse>;

    /// Ends a session on the backend.
    async fn delete_session(&self, session_id: &str) -> ChatResult<DeleteSessionResponse>;
}

/// Type alias for Arc-wrapped ChatTransport trait objects
pub type ChatTransportRef = Arc<dyn ChatTransport>;

/// [`ChatTransport`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: ChatConfig,
}

impl HttpTransport {
    pub fn new(config: ChatConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ChatError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;
        info!("Using chat endpoint: {}", config.chat_endpoint());
        Ok(Self { client, config })
    }

    /// Turns a non-2xx response into an [`ChatError::HttpError`].
    async fn check_status(response: Response) -> ChatResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.map_err(|e| {
            ChatError::ResponseError(format!("Failed to read error response: {}", e))
        })?;

        Err(ChatError::HttpError {
            status_code: status.as_u16(),
            message: format!("API request failed: {}", error_body),
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    #[instrument(skip(self, payload))]
    async fn send(&self, payload: &ChatPayload) -> ChatResult<ChatResponse> {
        let url = self.config.chat_endpoint();
        debug!("Sending chat request to {}", url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("Failed to send request: {}", e)))?;

        let response = Self::check_status(response).await?;

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ChatError::ParsingError(format!("Failed to parse response: {}", e)))
    }

    #[instrument(skip(self, payload))]
    async fn open_stream(&self, payload: &ChatPayload) -> ChatResult<ByteStream> {
        let url = self.config.chat_endpoint();
        debug!("Opening chat stream at {}", url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream")
            .json(payload)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("Failed to send request: {}", e)))?;

        let response = Self::check_status(response).await?;
        debug!("Stream opened with status {}", response.status());

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChatError::from))
            .boxed())
    }

    #[instrument(skip(self))]
    async fn fetch_history(&self, session_id: &str) -> ChatResult<HistoryResponse> {
        let url = self.config.history_endpoint(session_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("Failed to fetch history: {}", e)))?;

        Self::check_status(response)
            .await?
            .json::<HistoryResponse>()
            .await
            .map_err(|e| ChatError::ParsingError(format!("Failed to parse history: {}", e)))
    }

    #[instrument(skip(self))]
    async fn delete_session(&self, session_id: &str) -> ChatResult<DeleteSessionResponse> {
        let url = self.config.session_endpoint(session_id);

        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| ChatError::RequestError(format!("Failed to delete session: {}", e)))?;

        Self::check_status(response)
            .await?
            .json::<DeleteSessionResponse>()
            .await
            .map_err(|e| ChatError::ParsingError(format!("Failed to parse response: {}", e)))
    }
}
