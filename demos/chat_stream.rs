//! Streaming chat against a VisionAI backend.
//!
//! Run with:
//! ```bash
//! export VISIONAI_BASE_URL="http://localhost:8000"
//! export VISIONAI_TOKEN="your-access-token"
//! cargo run --example chat_stream -- "Which cameras are offline?"
//! ```

use std::io::Write;

use tracing_subscriber::EnvFilter;
use visionai_stream::options::{EnvCredential, TransportOptions};
use visionai_stream::session::Callbacks;
use visionai_stream::{ChatRequest, SessionState, StreamClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let message = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Summarise today's alerts.".to_string());

    let client = StreamClient::new(TransportOptions::from_env()?)?
        .with_credentials(EnvCredential::new("VISIONAI_TOKEN"));

    let handle = client.start_chat(
        ChatRequest::new(message),
        Callbacks::new(
            |fragment, _, _| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            },
            |_, _| println!(),
            |error| eprintln!("\nstream failed: {}", error),
        ),
    )?;

    // Ctrl-C cancels the stream; the partial answer is still reported.
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = handle.join().await?;
    match outcome.state {
        SessionState::Completed => println!("conversation id: {:?}", outcome.session_id),
        SessionState::Cancelled => eprintln!("cancelled after {} chars", outcome.text.len()),
        _ => {}
    }
    Ok(())
}
