//! Streaming client and error types.

use futures::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::alert::{self, AlertHandler, AlertSubscription};
use crate::http::{add_credential, add_extra_headers, build_http_client, ensure_success};
use crate::model::{ChatChunk, ChatRequest};
use crate::options::{CredentialProvider, NoCredentials, TransportOptions};
use crate::session::{drive, ChatHandler, SessionHandle, StreamSession};
use crate::sse::{FrameParseError, SSEResponseExt, StreamFrame};

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Frame parse error: {0}")]
    Frame(#[from] FrameParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the error ends the stream it occurred on.
    ///
    /// Only a single malformed frame is recoverable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ClientError::Frame(_))
    }
}

/// Client for the chat and alert streaming endpoints.
///
/// Cheap to clone; clones share the connection pool and credential provider.
///
/// # Example
/// ```no_run
/// use visionai_stream::client::StreamClient;
/// use visionai_stream::model::ChatRequest;
/// use visionai_stream::options::{StaticCredential, TransportOptions};
/// use visionai_stream::session::Callbacks;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = StreamClient::new(TransportOptions::new("http://vision.local:8000"))?
///         .with_credentials(StaticCredential::new("token"));
///
///     let handle = client.start_chat(
///         ChatRequest::new("Summarise today's alerts"),
///         Callbacks::new(
///             |fragment, _, _| print!("{}", fragment),
///             |_, id| println!("\nconversation: {:?}", id),
///             |error| eprintln!("failed: {}", error),
///         ),
///     )?;
///
///     let outcome = handle.join().await?;
///     println!("{:?}", outcome.state);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct StreamClient {
    http: reqwest::Client,
    options: Arc<TransportOptions>,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Create a client without credentials.
    pub fn new(options: TransportOptions) -> Result<Self, ClientError> {
        let http = build_http_client(&options)?;
        Ok(Self {
            http,
            options: Arc::new(options),
            credentials: Arc::new(NoCredentials),
        })
    }

    /// Attach a credential provider consulted on every request.
    pub fn with_credentials(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credentials = Arc::new(provider);
        self
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Issue a streaming chat request and return its frames.
    ///
    /// Fails before any I/O if the message is blank, and with
    /// `ClientError::Status` if the server answers with a non-2xx status.
    pub async fn open_chat(
        &self,
        request: &ChatRequest,
    ) -> Result<impl Stream<Item = Result<StreamFrame<ChatChunk>, ClientError>> + Send, ClientError>
    {
        request.validate()?;

        let url = self.options.chat_url();
        info!(url = %url, conversation_id = ?request.conversation_id, "opening chat stream");

        let credential = self.credentials.credential().await;
        let mut req = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/plain");
        req = add_credential(req, self.options.auth_header, credential.as_ref());
        req = add_extra_headers(req, &self.options.extra_headers);

        let response = ensure_success(req.json(request).send().await?).await?;
        debug!(status = %response.status(), "chat stream opened");

        Ok(response.sse_frames::<ChatChunk>())
    }

    /// Start a chat session on the tokio runtime.
    ///
    /// A blank message is rejected here, synchronously. Every later failure
    /// reaches the handler's `on_error`. Must be called within a tokio runtime.
    pub fn start_chat<H: ChatHandler>(
        &self,
        request: ChatRequest,
        handler: H,
    ) -> Result<SessionHandle, ClientError> {
        request.validate()?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let client = self.clone();

        let task = tokio::spawn(async move {
            let mut session = StreamSession::new(request.conversation_id.clone(), handler);

            let opened = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                opened = client.open_chat(&request) => Some(opened),
            };

            match opened {
                None => {
                    session.cancel();
                    session.into_outcome()
                }
                Some(Err(e)) => {
                    session.fail(e);
                    session.into_outcome()
                }
                Some(Ok(frames)) => drive(session, frames, token).await,
            }
        });

        Ok(SessionHandle::new(cancel, task))
    }

    /// Subscribe to the alert stream, reconnecting per the configured policy.
    ///
    /// Must be called within a tokio runtime.
    pub fn subscribe_alerts<H: AlertHandler>(&self, handler: H) -> AlertSubscription {
        alert::subscribe(self.clone(), handler)
    }

    /// Open one connection to the alert stream.
    pub(crate) async fn open_alerts(
        &self,
    ) -> Result<impl Stream<Item = Result<StreamFrame<serde_json::Value>, ClientError>> + Send, ClientError>
    {
        let url = self.options.alerts_url();
        debug!(url = %url, "opening alert stream");

        let credential = self.credentials.credential().await;
        let mut req = self.http.get(&url).header(ACCEPT, "text/event-stream");
        req = add_credential(req, self.options.auth_header, credential.as_ref());
        req = add_extra_headers(req, &self.options.extra_headers);

        let response = ensure_success(req.send().await?).await?;
        Ok(response.sse_frames::<serde_json::Value>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Callbacks;

    #[test]
    fn test_is_fatal() {
        let parse_error = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let frame = ClientError::Frame(FrameParseError {
            payload: "nope".to_string(),
            source: parse_error,
        });
        assert!(!frame.is_fatal());
        assert!(ClientError::Config("x".to_string()).is_fatal());
        assert!(ClientError::InvalidArgument("x".to_string()).is_fatal());
    }

    #[tokio::test]
    async fn test_start_chat_rejects_blank_message() {
        let client = StreamClient::new(TransportOptions::new("http://127.0.0.1:9")).unwrap();
        let result = client.start_chat(
            ChatRequest::new(" "),
            Callbacks::new(|_, _, _| {}, |_, _| {}, |_| {}),
        );
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_open_chat_rejects_blank_message() {
        let client = StreamClient::new(TransportOptions::new("http://127.0.0.1:9")).unwrap();
        let result = client.open_chat(&ChatRequest::new("")).await;
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }
}
