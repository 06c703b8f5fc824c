//! # visionai-stream - streaming consumer for the VisionAI console backend
//!
//! Decodes the `data:`-framed chat and alert streams pushed by the VisionAI
//! backend and drives them through a small session state machine.
//!
//! ## Features
//! - Async-first, tokio compatible
//! - Incremental frame decoding that survives arbitrary chunk boundaries,
//!   including split UTF-8 sequences
//! - Chat sessions with cooperative cancellation and a single, guaranteed
//!   terminal callback
//! - Alert subscriptions with `EventSource`-style reconnection
//! - Pluggable credential providers instead of ambient token storage
//!
//! ## Architecture
//!
//! - **`sse`**: `FrameDecoder` turns chunks into `StreamFrame`s
//! - **`session`**: `StreamSession` accumulates text and terminates once
//! - **`client`**: `StreamClient` issues requests and spawns sessions
//! - **`alert`**: reconnecting alert subscriptions
//!
//! ## Example
//! ```no_run
//! use visionai_stream::{ChatRequest, StreamClient};
//! use visionai_stream::options::{EnvCredential, TransportOptions};
//! use visionai_stream::session::Callbacks;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = StreamClient::new(TransportOptions::from_env()?)?
//!         .with_credentials(EnvCredential::new("VISIONAI_TOKEN"));
//!
//!     let handle = client.start_chat(
//!         ChatRequest::new("Which cameras raised alerts today?"),
//!         Callbacks::new(
//!             |fragment, _, _| print!("{}", fragment),
//!             |_, _| println!(),
//!             |error| eprintln!("stream failed: {}", error),
//!         ),
//!     )?;
//!
//!     let outcome = handle.join().await?;
//!     println!("conversation: {:?}", outcome.session_id);
//!     Ok(())
//! }
//! ```

pub mod alert;
pub mod client;
pub mod http;
pub mod model;
pub mod options;
pub mod session;
pub mod sse;

// Re-exports for convenience
pub use alert::{AlertHandler, AlertSubscription};
pub use client::{ClientError, StreamClient};
pub use model::{AlertMessage, ChatChunk, ChatRequest};
pub use session::{ChatHandler, SessionHandle, SessionOutcome, SessionState, StreamSession};
pub use sse::{FrameDecoder, StreamFrame};
