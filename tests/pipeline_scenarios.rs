//! End-to-end message handling against a mock ingestion API.

mod common;

use common::{doc_message, fast_settings, subscription, FakeBroker};
use insight_relay::broker::InboundMessage;
use insight_relay::config::{DecodeErrorPolicy, SinkConfig};
use insight_relay::filter::PostTypeFilter;
use insight_relay::supervisor::ConnectionSupervisor;
use insight_relay::{Pipeline, Reporter};
use serde_json::json;
use serde_json::Value;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "sync-secret";

fn sink_config(server: &MockServer, timeout_secs: u64) -> SinkConfig {
    SinkConfig {
        api_url: format!("{}/api/insight/sync", server.uri()),
        sync_token: TOKEN.to_string(),
        timeout_secs,
    }
}

fn relay(
    broker: &FakeBroker,
    sink: SinkConfig,
) -> ConnectionSupervisor<common::FakeConnector> {
    let reporter = Reporter::new(sink).expect("reporter");
    let pipeline = Pipeline::new(
        PostTypeFilter::default(),
        Arc::new(reporter),
        DecodeErrorPolicy::Retry,
    );
    let supervisor =
        ConnectionSupervisor::new(broker.connector(), subscription(), pipeline, fast_settings());
    broker.attach(supervisor.stop_handle());
    supervisor
}

/// JSON log lines written by a test-local subscriber.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn record(&self, message: &str) -> Value {
        self.records()
            .into_iter()
            .find(|r| r["fields"]["message"] == message)
            .unwrap_or_else(|| panic!("no {:?} record in {:?}", message, self.records()))
    }
}

#[tokio::test]
async fn test_eligible_document_is_posted_and_committed() {
    let server = MockServer::start().await;
    let doc = json!({"post_type": 1, "post_id": "X", "origin_id": "o-1", "text": "hello"});

    Mock::given(method("POST"))
        .and(path("/api/insight/sync"))
        .and(header("X-Sync-Token", TOKEN))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "item_doc": doc.clone() })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let broker = FakeBroker::new(vec![doc_message(0, 0, doc)]).stop_after_polls(1);
    relay(&broker, sink_config(&server, 5)).run().await;

    assert_eq!(broker.commits(), vec![(0, 0)]);
}

#[tokio::test]
async fn test_ineligible_documents_make_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let broker = FakeBroker::new(vec![
        doc_message(0, 0, json!({"post_type": 5})),
        doc_message(0, 1, json!({"post_type": "1"})),
        doc_message(0, 2, json!({"post_id": "no-type"})),
    ])
    .stop_after_polls(1);
    relay(&broker, sink_config(&server, 5)).run().await;

    assert_eq!(broker.commits(), vec![(0, 0), (0, 1), (0, 2)]);
}

#[tokio::test]
async fn test_error_statuses_withhold_commit() {
    for status in [401u16, 403, 422, 500, 503, 204] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let broker = FakeBroker::new(vec![doc_message(0, 0, json!({"post_type": 10}))])
            .stop_after_polls(1);
        relay(&broker, sink_config(&server, 5)).run().await;

        assert!(broker.commits().is_empty(), "status {} committed", status);
        assert_eq!(broker.rewinds(), vec![(0, 0)], "status {}", status);
    }
}

#[tokio::test]
async fn test_redelivered_document_is_posted_unchanged() {
    let server = MockServer::start().await;
    let doc = json!({"post_type": 2, "post_id": "R", "nested": {"a": [1, 2, 3]}});

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let broker = FakeBroker::new(vec![doc_message(0, 0, doc.clone())]).stop_after_polls(2);
    relay(&broker, sink_config(&server, 5)).run().await;

    assert_eq!(broker.commits(), vec![(0, 0)]);

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body, json!({ "item_doc": doc }));
}

#[tokio::test]
async fn test_slow_api_withholds_commit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let broker =
        FakeBroker::new(vec![doc_message(0, 0, json!({"post_type": 1}))]).stop_after_polls(1);
    relay(&broker, sink_config(&server, 1)).run().await;

    assert!(broker.commits().is_empty());
    assert_eq!(broker.rewinds(), vec![(0, 0)]);
}

#[tokio::test]
async fn test_missing_token_withholds_commit_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut sink = sink_config(&server, 5);
    sink.sync_token = String::new();

    let broker =
        FakeBroker::new(vec![doc_message(0, 0, json!({"post_type": 1}))]).stop_after_polls(1);
    relay(&broker, sink).run().await;

    assert!(broker.commits().is_empty());
}

#[tokio::test]
async fn test_null_item_doc_is_withheld_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let value = br#"{"msg_id": "m-0-0", "item_doc": null}"#.to_vec();
    let broker = FakeBroker::new(vec![InboundMessage::new("test-topic", 0, 0, value)])
        .stop_after_polls(1);
    relay(&broker, sink_config(&server, 5)).run().await;

    assert!(broker.commits().is_empty());
    assert_eq!(broker.rewinds(), vec![(0, 0)]);
}

#[tokio::test]
async fn test_log_records_carry_dashboard_fields() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_current_span(true)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let broker = FakeBroker::new(vec![
        doc_message(0, 0, json!({"post_type": 1, "post_id": "X", "origin_id": "O"})),
        doc_message(0, 1, json!({"post_type": 5, "post_id": "Y"})),
    ])
    .stop_after_polls(1);
    relay(&broker, sink_config(&server, 5)).run().await;

    assert_eq!(broker.commits(), vec![(0, 0), (0, 1)]);

    let passed = logs.record("filter passed");
    assert_eq!(passed["fields"]["topic"], "test-topic");
    assert_eq!(passed["fields"]["offset"], json!(0));
    assert_eq!(passed["fields"]["post_type"], "1");
    assert_eq!(passed["fields"]["post_id"], "X");

    let delivered = logs.record("Report delivered");
    assert_eq!(delivered["fields"]["post_id"], "X");
    assert_eq!(delivered["fields"]["origin_id"], "O");
    assert_eq!(delivered["span"]["topic"], "test-topic");
    assert_eq!(delivered["span"]["offset"], json!(0));

    let filtered = logs.record("filtered out");
    assert_eq!(filtered["fields"]["topic"], "test-topic");
    assert_eq!(filtered["fields"]["offset"], json!(1));
    assert_eq!(filtered["fields"]["post_type"], "5");
    assert_eq!(filtered["fields"]["post_id"], "Y");
}
