use async_trait::async_trait;
use insight_relay::broker::{
    BrokerConnection, BrokerConnector, BrokerError, InboundMessage, PollResult, SubscriptionParams,
};
use insight_relay::config::DecodeErrorPolicy;
use insight_relay::document::Document;
use insight_relay::filter::PostTypeFilter;
use insight_relay::reporter::{DocumentSink, ReportOutcome};
use insight_relay::supervisor::{ConnectionSupervisor, StopHandle, SupervisorSettings};
use insight_relay::{Config, Pipeline};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Builds a message whose value is `{"msg_id": ..., "item_doc": doc}`.
#[allow(dead_code)]
pub fn doc_message(partition: i32, offset: i64, doc: serde_json::Value) -> InboundMessage {
    let value = serde_json::json!({ "msg_id": format!("m-{}-{}", partition, offset), "item_doc": doc });
    InboundMessage::new("test-topic", partition, offset, value.to_string().into_bytes())
}

/// What the next poll does before consulting the log.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum PollAction {
    Deliver,
    Fail(BrokerError),
}

#[derive(Debug, Clone)]
pub struct ConnectRecord {
    pub params: SubscriptionParams,
    pub at: Instant,
}

#[derive(Default)]
struct BrokerState {
    log: Vec<InboundMessage>,
    committed: HashMap<(String, i32), i64>,
    connect_failures: usize,
    commit_failures: usize,
    poll_script: VecDeque<PollAction>,
    max_polls: usize,
    poll_count: usize,
    stop: Option<StopHandle>,

    connects: Vec<ConnectRecord>,
    closes: Vec<Instant>,
    commits: Vec<(i32, i64)>,
    rewinds: Vec<(i32, i64)>,
    polls: Vec<(Instant, Vec<(i32, i64)>)>,
}

/// In-memory broker with real offset semantics: each connection starts at
/// the committed position, polls advance a private fetch position and
/// rewinds move it back.
#[derive(Clone, Default)]
pub struct FakeBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[allow(dead_code)]
impl FakeBroker {
    pub fn new(log: Vec<InboundMessage>) -> Self {
        let broker = Self::default();
        {
            let mut state = broker.state.lock().unwrap();
            state.log = log;
            state.max_polls = usize::MAX;
        }
        broker
    }

    /// Requests a stop once `polls` polls have been answered.
    pub fn stop_after_polls(self, polls: usize) -> Self {
        self.state.lock().unwrap().max_polls = polls;
        self
    }

    pub fn fail_connects(self, count: usize) -> Self {
        self.state.lock().unwrap().connect_failures = count;
        self
    }

    pub fn fail_commits(self, count: usize) -> Self {
        self.state.lock().unwrap().commit_failures = count;
        self
    }

    pub fn script(self, actions: Vec<PollAction>) -> Self {
        self.state.lock().unwrap().poll_script = actions.into();
        self
    }

    pub fn attach(&self, stop: StopHandle) {
        self.state.lock().unwrap().stop = Some(stop);
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            broker: self.clone(),
        }
    }

    pub fn connects(&self) -> Vec<ConnectRecord> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn closes(&self) -> Vec<Instant> {
        self.state.lock().unwrap().closes.clone()
    }

    pub fn commits(&self) -> Vec<(i32, i64)> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn rewinds(&self) -> Vec<(i32, i64)> {
        self.state.lock().unwrap().rewinds.clone()
    }

    /// Offsets presented by each poll that returned messages.
    pub fn delivered_batches(&self) -> Vec<Vec<(i32, i64)>> {
        self.state
            .lock()
            .unwrap()
            .polls
            .iter()
            .map(|(_, batch)| batch.clone())
            .collect()
    }

    pub fn poll_times(&self) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .polls
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }
}

pub struct FakeConnector {
    broker: FakeBroker,
}

#[async_trait]
impl BrokerConnector for FakeConnector {
    type Connection = FakeConnection;

    async fn connect(&self, params: &SubscriptionParams) -> Result<FakeConnection, BrokerError> {
        let mut state = self.broker.state.lock().unwrap();
        state.connects.push(ConnectRecord {
            params: params.clone(),
            at: Instant::now(),
        });

        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(BrokerError::Unavailable("connection refused".to_string()));
        }

        Ok(FakeConnection {
            broker: self.broker.clone(),
            fetch: state.committed.clone(),
            closed: false,
        })
    }
}

pub struct FakeConnection {
    broker: FakeBroker,
    fetch: HashMap<(String, i32), i64>,
    closed: bool,
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn poll(
        &mut self,
        max_records: usize,
        _timeout: Duration,
    ) -> Result<PollResult, BrokerError> {
        let mut state = self.broker.state.lock().unwrap();

        if state.poll_count >= state.max_polls {
            if let Some(stop) = &state.stop {
                stop.stop();
            }
            return Ok(PollResult::TimedOut);
        }
        state.poll_count += 1;

        if let Some(PollAction::Fail(e)) = state.poll_script.pop_front() {
            return Err(e);
        }

        // The log is ordered per partition, so taking each partition's next
        // expected offset in turn yields a contiguous batch.
        let mut taken: Vec<InboundMessage> = Vec::new();
        for message in &state.log {
            if taken.len() >= max_records {
                break;
            }
            let key = (message.topic.clone(), message.partition);
            let position = self.fetch.get(&key).copied().unwrap_or(0);
            if message.offset == position {
                self.fetch.insert(key, position + 1);
                taken.push(message.clone());
            }
        }

        if taken.is_empty() {
            return Ok(PollResult::TimedOut);
        }

        let offsets = taken.iter().map(|m| (m.partition, m.offset)).collect();
        state.polls.push((Instant::now(), offsets));
        Ok(PollResult::Messages(taken))
    }

    async fn commit(&mut self, message: &InboundMessage) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock().unwrap();
        if state.commit_failures > 0 {
            state.commit_failures -= 1;
            return Err(BrokerError::Commit("coordinator not available".to_string()));
        }
        state.committed.insert(
            (message.topic.clone(), message.partition),
            message.offset + 1,
        );
        state.commits.push((message.partition, message.offset));
        Ok(())
    }

    async fn rewind(&mut self, message: &InboundMessage) -> Result<(), BrokerError> {
        self.fetch
            .insert((message.topic.clone(), message.partition), message.offset);
        self.broker
            .state
            .lock()
            .unwrap()
            .rewinds
            .push((message.partition, message.offset));
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.broker.state.lock().unwrap().closes.push(Instant::now());
        }
    }
}

/// Sink that records every document and answers from a script
/// (`Delivered` once the script runs out).
#[derive(Default)]
pub struct RecordingSink {
    responses: Mutex<VecDeque<ReportOutcome>>,
    received: Mutex<Vec<Document>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new(responses: Vec<ReportOutcome>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Document> {
        self.received.lock().unwrap().clone()
    }

    pub fn received_post_ids(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|doc| doc.post_id().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl DocumentSink for RecordingSink {
    async fn report(&self, document: &Document) -> ReportOutcome {
        self.received.lock().unwrap().push(document.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ReportOutcome::Delivered)
    }
}

/// Settings with the production backoff and redelivery delays.
#[allow(dead_code)]
pub fn default_settings() -> SupervisorSettings {
    SupervisorSettings::from_config(&Config::default())
}

/// Settings with no waits, for tests running on the real clock.
#[allow(dead_code)]
pub fn fast_settings() -> SupervisorSettings {
    SupervisorSettings {
        poll_timeout: Duration::from_millis(50),
        max_poll_records: 100,
        reconnect_backoff: Duration::ZERO,
        redelivery_delay: Duration::ZERO,
    }
}

#[allow(dead_code)]
pub fn subscription() -> SubscriptionParams {
    SubscriptionParams {
        brokers: "localhost:9092".to_string(),
        topics: vec!["test-topic".to_string()],
        group_id: "test-group".to_string(),
        auto_offset_reset: "earliest".to_string(),
        enable_auto_commit: false,
    }
}

/// Supervisor over `broker` and `sink`, with the broker wired to stop it.
#[allow(dead_code)]
pub fn supervisor(
    broker: &FakeBroker,
    sink: Arc<dyn DocumentSink>,
    settings: SupervisorSettings,
) -> ConnectionSupervisor<FakeConnector> {
    let pipeline = Pipeline::new(PostTypeFilter::default(), sink, DecodeErrorPolicy::Retry);
    let supervisor =
        ConnectionSupervisor::new(broker.connector(), subscription(), pipeline, settings);
    broker.attach(supervisor.stop_handle());
    supervisor
}
