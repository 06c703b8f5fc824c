//! Real-time alert push stream.
//!
//! The alert endpoint uses the same `data:` framing as the chat stream. A
//! subscription behaves like a browser `EventSource`: dropped connections are
//! reopened after a delay until the reconnect policy gives up or the
//! subscription is closed.

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ClientError, StreamClient};
use crate::model::AlertMessage;
use crate::options::ReconnectPolicy;
use crate::sse::StreamFrame;

/// Callbacks for an alert subscription.
pub trait AlertHandler: Send + 'static {
    /// A connection was established.
    fn on_open(&mut self) {}

    /// An alert arrived.
    fn on_message(&mut self, message: AlertMessage);

    /// A connection failed or dropped. Reconnection may follow.
    fn on_error(&mut self, _error: &ClientError) {}

    /// The subscription ended. Called exactly once.
    fn on_close(&mut self) {}
}

/// Handle to a running alert subscription.
#[derive(Debug)]
pub struct AlertSubscription {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AlertSubscription {
    /// Stop listening. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait until the subscription has ended and `on_close` has run.
    pub async fn closed(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "alert subscription task failed");
        }
    }
}

/// How a single connection ended.
enum ConnectionEnd {
    Cancelled,
    Done,
    Dropped,
}

pub(crate) fn subscribe<H: AlertHandler>(client: StreamClient, mut handler: H) -> AlertSubscription {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::spawn(async move {
        let policy = client.options().reconnect;
        let mut failures: u32 = 0;

        loop {
            match run_connection(&client, &mut handler, &token).await {
                Ok(ConnectionEnd::Cancelled) | Ok(ConnectionEnd::Done) => break,
                Ok(ConnectionEnd::Dropped) => {
                    // The connection was open, so the failure count starts over.
                    failures = 0;
                }
                Err(e) => {
                    handler.on_error(&e);
                    failures += 1;
                }
            }

            if gives_up(&policy, failures) {
                info!(failures, "alert stream giving up");
                break;
            }

            debug!(delay_ms = policy.delay.as_millis() as u64, "reconnecting alert stream");
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(policy.delay) => {}
            }
        }

        info!("alert stream closed");
        handler.on_close();
    });

    AlertSubscription { cancel, task }
}

/// Whether `failures` consecutive failed attempts exhaust the policy.
fn gives_up(policy: &ReconnectPolicy, failures: u32) -> bool {
    policy
        .max_attempts
        .is_some_and(|max| max == 0 || failures > max)
}

/// Run one connection until it ends. Errors are returned only for failures
/// before the connection opened; mid-stream failures are reported directly.
async fn run_connection<H: AlertHandler>(
    client: &StreamClient,
    handler: &mut H,
    cancel: &CancellationToken,
) -> Result<ConnectionEnd, ClientError> {
    let frames = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(ConnectionEnd::Cancelled),
        opened = client.open_alerts() => opened?,
    };

    info!("alert stream connected");
    handler.on_open();
    futures::pin_mut!(frames);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(ConnectionEnd::Cancelled),
            next = frames.next() => next,
        };

        match next {
            Some(Ok(StreamFrame::Data { message, .. })) => handler.on_message(AlertMessage::Json(message)),
            Some(Ok(StreamFrame::Done)) => return Ok(ConnectionEnd::Done),
            Some(Err(ClientError::Frame(e))) => {
                if e.payload.trim().is_empty() {
                    continue;
                }
                handler.on_message(AlertMessage::from_unparsed(&e.payload));
            }
            Some(Err(e)) => {
                handler.on_error(&e);
                return Ok(ConnectionEnd::Dropped);
            }
            None => {
                debug!("alert stream ended by server");
                return Ok(ConnectionEnd::Dropped);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_gives_up() {
        let unlimited = ReconnectPolicy::default();
        assert!(!gives_up(&unlimited, 0));
        assert!(!gives_up(&unlimited, 1_000));

        assert!(gives_up(&ReconnectPolicy::disabled(), 0));

        let three = ReconnectPolicy {
            delay: Duration::from_millis(10),
            max_attempts: Some(3),
        };
        assert!(!gives_up(&three, 0));
        assert!(!gives_up(&three, 3));
        assert!(gives_up(&three, 4));
    }
}
