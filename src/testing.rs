use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::event::Event;
use crate::transport::{BatchRequest, Transport, TransportError};

/// Accepts every batch and hands a copy to the test.
pub struct RecordingTransport {
    tx: mpsc::UnboundedSender<BatchRequest>,
}

impl RecordingTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BatchRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for RecordingTransport {
    async fn send(&self, request: &BatchRequest) -> Result<StatusCode, TransportError> {
        let _ = self.tx.send(request.clone());
        Ok(StatusCode::OK)
    }
}

/// Replies from a fixed script of outcomes, then `fallback` forever.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<StatusCode, String>>>,
    fallback: StatusCode,
    pub calls: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<StatusCode, String>>, fallback: StatusCode) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
        }
    }

    /// Every send answers `status`.
    pub fn always(status: StatusCode) -> Self {
        Self::new(vec![], status)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    async fn send(&self, _request: &BatchRequest) -> Result<StatusCode, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(msg)) => Err(TransportError::Connection(msg)),
            None => Ok(self.fallback),
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::new("UnitTestKey", "UnitTestDataset");
    config.collect_runtime_stats = false;
    config
}

pub fn event_in(config: &Config, dataset: &str) -> Event {
    let mut event = Event::new(config);
    event.dataset = Some(dataset.to_owned());
    event
}

/// Parse a batch body into its JSON array elements.
pub fn batch_items(request: &BatchRequest) -> Vec<Value> {
    let parsed: Value = serde_json::from_slice(&request.body).unwrap();
    parsed.as_array().unwrap().clone()
}
