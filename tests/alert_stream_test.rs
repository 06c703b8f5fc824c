//! Alert stream tests against a wiremock backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use visionai_stream::options::{ReconnectPolicy, StaticCredential, TransportOptions};
use visionai_stream::{AlertHandler, AlertMessage, ClientError, StreamClient};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ALERTS_PATH: &str = "/api/v1/alerts/stream";

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Open,
    Message(AlertMessage),
    Error,
    Close,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

impl AlertHandler for Recorder {
    fn on_open(&mut self) {
        self.0.lock().unwrap().push(Event::Open);
    }

    fn on_message(&mut self, message: AlertMessage) {
        self.0.lock().unwrap().push(Event::Message(message));
    }

    fn on_error(&mut self, _error: &ClientError) {
        self.0.lock().unwrap().push(Event::Error);
    }

    fn on_close(&mut self) {
        self.0.lock().unwrap().push(Event::Close);
    }
}

fn client_for(server: &MockServer, reconnect: ReconnectPolicy) -> StreamClient {
    StreamClient::new(TransportOptions::new(server.uri()).with_reconnect(reconnect)).unwrap()
}

#[tokio::test]
async fn test_alert_messages_are_decoded() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ALERTS_PATH))
        .and(header("accept", "text/event-stream"))
        .and(header("access-token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(
                "data: {\"alert_id\":1,\"camera\":\"gate-2\"}\n\n",
                "data: data: {\"alert_id\":2}\n\n",
                "data: heartbeat\n\n",
            ),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let subscription = client_for(&server, ReconnectPolicy::disabled())
        .with_credentials(StaticCredential::new("tok"))
        .subscribe_alerts(recorder.clone());
    subscription.closed().await;

    assert_eq!(
        recorder.events(),
        vec![
            Event::Open,
            Event::Message(AlertMessage::Json(json!({"alert_id": 1, "camera": "gate-2"}))),
            Event::Message(AlertMessage::Json(json!({"alert_id": 2}))),
            Event::Message(AlertMessage::Raw("heartbeat".to_string())),
            Event::Close,
        ]
    );
}

#[tokio::test]
async fn test_blank_alert_payloads_are_skipped() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ALERTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: \ndata:    \ndata: {\"id\":1}\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    client_for(&server, ReconnectPolicy::disabled())
        .subscribe_alerts(recorder.clone())
        .closed()
        .await;

    assert_eq!(
        recorder.events(),
        vec![
            Event::Open,
            Event::Message(AlertMessage::Json(json!({"id": 1}))),
            Event::Close,
        ]
    );
}

#[tokio::test]
async fn test_done_ends_subscription_without_reconnect() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ALERTS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"alert_id\":1}\ndata: [DONE]\n", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let policy = ReconnectPolicy {
        delay: Duration::from_millis(10),
        max_attempts: None,
    };
    client_for(&server, policy)
        .subscribe_alerts(recorder.clone())
        .closed()
        .await;

    assert_eq!(
        recorder.events(),
        vec![
            Event::Open,
            Event::Message(AlertMessage::Json(json!({"alert_id": 1}))),
            Event::Close,
        ]
    );
}

#[tokio::test]
async fn test_gives_up_after_failed_reconnects() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ALERTS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let policy = ReconnectPolicy {
        delay: Duration::from_millis(10),
        max_attempts: Some(2),
    };
    client_for(&server, policy)
        .subscribe_alerts(recorder.clone())
        .closed()
        .await;

    assert_eq!(
        recorder.events(),
        vec![Event::Error, Event::Error, Event::Error, Event::Close]
    );
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ALERTS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"alert_id\":1}\n", "text/event-stream")
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&server)
        .await;

    let recorder = Recorder::default();
    let subscription = client_for(&server, ReconnectPolicy::default()).subscribe_alerts(recorder.clone());

    subscription.close();
    subscription.close();
    subscription.closed().await;

    assert_eq!(recorder.events(), vec![Event::Close]);
}
