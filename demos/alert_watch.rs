//! Print alerts pushed by a VisionAI backend until Ctrl-C.
//!
//! Run with:
//! ```bash
//! export VISIONAI_BASE_URL="http://localhost:8000"
//! cargo run --example alert_watch
//! ```

use tracing_subscriber::EnvFilter;
use visionai_stream::options::{EnvCredential, TransportOptions};
use visionai_stream::{AlertHandler, AlertMessage, ClientError, StreamClient};

struct Printer;

impl AlertHandler for Printer {
    fn on_open(&mut self) {
        println!("connected");
    }

    fn on_message(&mut self, message: AlertMessage) {
        match message {
            AlertMessage::Json(value) => println!("alert: {}", value),
            AlertMessage::Raw(text) => println!("raw: {}", text),
        }
    }

    fn on_error(&mut self, error: &ClientError) {
        eprintln!("connection error: {}", error);
    }

    fn on_close(&mut self) {
        println!("closed");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = StreamClient::new(TransportOptions::from_env()?)?
        .with_credentials(EnvCredential::new("VISIONAI_TOKEN"));

    let subscription = client.subscribe_alerts(Printer);
    tokio::signal::ctrl_c().await?;
    subscription.close();
    subscription.closed().await;
    Ok(())
}
