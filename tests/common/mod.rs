#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use nats_to_syslog::bus::{BusError, MessageBus, MessageStream};
use nats_to_syslog::sink::{LogSink, SinkError};
use nats_to_syslog::{BusMessage, RelayError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Shared view into a `MockSink`, kept by the test after the sink moves
/// into the relay.
#[derive(Clone, Default)]
pub struct SinkRecorder {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    attempts: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl SinkRecorder {
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Sent entries decoded from the structured JSON form.
    pub fn sent_data(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|entry| {
                let value: serde_json::Value = serde_json::from_slice(entry).unwrap();
                value["Data"].as_str().unwrap().to_string()
            })
            .collect()
    }
}

pub struct MockSink {
    recorder: SinkRecorder,
    fail_on_attempt: Option<usize>,
    gate: Option<Arc<Semaphore>>,
    endpoint: String,
}

impl MockSink {
    pub fn new() -> (Self, SinkRecorder) {
        let recorder = SinkRecorder::default();
        let sink = Self {
            recorder: recorder.clone(),
            fail_on_attempt: None,
            gate: None,
            endpoint: "mock:514".to_string(),
        };
        (sink, recorder)
    }

    /// Fail the n-th send (1-based).
    pub fn failing_on(mut self, attempt: usize) -> Self {
        self.fail_on_attempt = Some(attempt);
        self
    }

    /// Every send waits for one permit from `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl LogSink for MockSink {
    async fn send(&mut self, entry: &[u8]) -> Result<(), SinkError> {
        let attempt = self.recorder.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.fail_on_attempt == Some(attempt) {
            return Err(SinkError::WriteFailed {
                endpoint: self.endpoint.clone(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "collector went away"),
            });
        }

        self.recorder.sent.lock().push(entry.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[derive(Clone, Default)]
pub struct BusRecorder {
    subscribes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    patterns: Arc<Mutex<Vec<String>>>,
}

impl BusRecorder {
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn patterns(&self) -> Vec<String> {
        self.patterns.lock().clone()
    }
}

/// In-memory bus. Messages pushed through the returned publisher are
/// delivered on the (single) subscription; dropping the publisher ends it.
pub struct MockBus {
    stream: Mutex<Option<UnboundedReceiver<BusMessage>>>,
    fail_subscribe: bool,
    recorder: BusRecorder,
}

impl MockBus {
    pub fn new() -> (Self, UnboundedSender<BusMessage>, BusRecorder) {
        let (publisher, stream) = unbounded();
        let recorder = BusRecorder::default();
        let bus = Self {
            stream: Mutex::new(Some(stream)),
            fail_subscribe: false,
            recorder: recorder.clone(),
        };
        (bus, publisher, recorder)
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }
}

#[async_trait]
impl MessageBus for MockBus {
    async fn subscribe(&self, pattern: &str) -> Result<MessageStream, BusError> {
        self.recorder.subscribes.fetch_add(1, Ordering::SeqCst);
        self.recorder.patterns.lock().push(pattern.to_string());

        if self.fail_subscribe {
            return Err(BusError::SubscribeFailed("permissions violation".to_string()));
        }

        let stream = self.stream.lock().take().ok_or(BusError::Closed)?;
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), BusError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn publish(publisher: &UnboundedSender<BusMessage>, subject: &str, payload: &str) {
    publisher
        .unbounded_send(BusMessage::new(subject, payload.to_string()))
        .unwrap();
}

pub async fn ready<T>(value: T) -> Result<T, RelayError> {
    Ok(value)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
