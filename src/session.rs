//! Lifecycle of a single streaming chat exchange.
//!
//! A [`StreamSession`] accumulates content increments, captures the
//! conversation id the server assigns, and terminates exactly once. The
//! consumer observes it through a [`ChatHandler`].

use futures::{Stream, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::client::ClientError;
use crate::model::ChatChunk;
use crate::sse::{FrameParseError, StreamFrame};

/// State of a session. Everything except `Active` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Active)
    }
}

/// Callbacks invoked by a session, in arrival order.
///
/// Exactly one of `on_complete` (completion or cancellation) or `on_error`
/// (transport failure) is called per session.
pub trait ChatHandler: Send + 'static {
    /// A content fragment arrived.
    fn on_increment(&mut self, fragment: &str, accumulated: &str, session_id: Option<&str>);

    /// The stream ended normally or was cancelled.
    fn on_complete(&mut self, accumulated: &str, session_id: Option<&str>);

    /// The transport failed.
    fn on_error(&mut self, error: &ClientError);

    /// A single frame could not be parsed. The session continues.
    fn on_frame_error(&mut self, _error: &FrameParseError) {}
}

/// [`ChatHandler`] built from three closures.
///
/// # Example
/// ```rust
/// use visionai_stream::session::Callbacks;
///
/// let handler = Callbacks::new(
///     |fragment, _text, _id| print!("{}", fragment),
///     |text, id| println!("\n[{} chars, conversation {:?}]", text.len(), id),
///     |error| eprintln!("stream failed: {}", error),
/// );
/// # let _ = handler;
/// ```
pub struct Callbacks<I, C, E> {
    on_increment: I,
    on_complete: C,
    on_error: E,
}

impl<I, C, E> Callbacks<I, C, E>
where
    I: FnMut(&str, &str, Option<&str>) + Send + 'static,
    C: FnMut(&str, Option<&str>) + Send + 'static,
    E: FnMut(&ClientError) + Send + 'static,
{
    pub fn new(on_increment: I, on_complete: C, on_error: E) -> Self {
        Self {
            on_increment,
            on_complete,
            on_error,
        }
    }
}

impl<I, C, E> ChatHandler for Callbacks<I, C, E>
where
    I: FnMut(&str, &str, Option<&str>) + Send + 'static,
    C: FnMut(&str, Option<&str>) + Send + 'static,
    E: FnMut(&ClientError) + Send + 'static,
{
    fn on_increment(&mut self, fragment: &str, accumulated: &str, session_id: Option<&str>) {
        (self.on_increment)(fragment, accumulated, session_id)
    }

    fn on_complete(&mut self, accumulated: &str, session_id: Option<&str>) {
        (self.on_complete)(accumulated, session_id)
    }

    fn on_error(&mut self, error: &ClientError) {
        (self.on_error)(error)
    }
}

/// Final snapshot of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub text: String,
    pub session_id: Option<String>,
}

/// One streaming exchange: accumulated text, correlation id and state.
///
/// Once the state leaves `Active` it never changes again, and every further
/// frame or termination request is ignored.
pub struct StreamSession<H> {
    session_id: Option<String>,
    accumulated: String,
    state: SessionState,
    handler: H,
}

impl<H: ChatHandler> StreamSession<H> {
    /// Start a session, optionally continuing a known conversation.
    pub fn new(session_id: Option<String>, handler: H) -> Self {
        Self {
            session_id: session_id.filter(|id| !id.is_empty()),
            accumulated: String::new(),
            state: SessionState::Active,
            handler,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Apply one decoded frame. Returns false if the session had already ended.
    pub fn apply(&mut self, frame: StreamFrame<ChatChunk>) -> bool {
        if !self.is_active() {
            return false;
        }

        let chunk = match frame {
            StreamFrame::Done => return self.complete(),
            StreamFrame::Data { message, .. } => message,
        };

        if self.session_id.is_none() {
            if let Some(id) = chunk.conversation_id() {
                info!(conversation_id = %id, "received conversation id");
                self.session_id = Some(id.to_string());
            }
        }

        if let Some(fragment) = chunk.content() {
            self.accumulated.push_str(fragment);
            self.handler
                .on_increment(fragment, &self.accumulated, self.session_id.as_deref());
        }

        true
    }

    /// Report a frame that failed to parse. Not fatal.
    pub fn report_frame_error(&mut self, error: &FrameParseError) {
        if self.is_active() {
            self.handler.on_frame_error(error);
        }
    }

    /// End normally. Returns true if this call ended the session.
    pub fn complete(&mut self) -> bool {
        if !self.finish(SessionState::Completed) {
            return false;
        }
        debug!(len = self.accumulated.len(), "chat stream completed");
        self.handler
            .on_complete(&self.accumulated, self.session_id.as_deref());
        true
    }

    /// End by request of the consumer. Returns true if this call ended the session.
    pub fn cancel(&mut self) -> bool {
        if !self.finish(SessionState::Cancelled) {
            return false;
        }
        info!(len = self.accumulated.len(), "chat stream cancelled");
        self.handler
            .on_complete(&self.accumulated, self.session_id.as_deref());
        true
    }

    /// End with a transport failure. Returns true if this call ended the session.
    pub fn fail(&mut self, error: ClientError) -> bool {
        if !self.finish(SessionState::Failed) {
            return false;
        }
        warn!(error = %error, "chat stream failed");
        self.handler.on_error(&error);
        true
    }

    pub fn into_outcome(self) -> SessionOutcome {
        SessionOutcome {
            state: self.state,
            text: self.accumulated,
            session_id: self.session_id,
        }
    }

    fn finish(&mut self, state: SessionState) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = state;
        true
    }
}

/// Run `session` over `frames` until it ends or `cancel` fires.
///
/// End of the frame stream without a `[DONE]` frame counts as completion.
pub async fn drive<S, H>(
    mut session: StreamSession<H>,
    frames: S,
    cancel: CancellationToken,
) -> SessionOutcome
where
    S: Stream<Item = Result<StreamFrame<ChatChunk>, ClientError>>,
    H: ChatHandler,
{
    futures::pin_mut!(frames);

    while session.is_active() {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                session.cancel();
                break;
            }
            next = frames.next() => next,
        };

        match next {
            Some(Ok(frame)) => {
                session.apply(frame);
            }
            Some(Err(ClientError::Frame(e))) => session.report_frame_error(&e),
            Some(Err(e)) => {
                session.fail(e);
            }
            None => {
                session.complete();
            }
        }
    }

    session.into_outcome()
}

/// Control handle for a session running on the tokio runtime.
///
/// Dropping the handle cancels the session. To keep it running without the
/// handle, hold on to [`SessionHandle::cancellation_token`] instead.
#[derive(Debug)]
pub struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<SessionOutcome>,
    _guard: DropGuard,
}

impl SessionHandle {
    pub(crate) fn new(cancel: CancellationToken, task: JoinHandle<SessionOutcome>) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            cancel,
            task,
            _guard: guard,
        }
    }

    /// Stop consuming the stream and release the connection.
    ///
    /// Safe to call repeatedly and after the session has ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this session, for use from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> Result<SessionOutcome, JoinError> {
        self.task.await
    }
}
