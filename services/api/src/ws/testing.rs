//! In-memory sockets and job queues shared by the websocket tests.

use super::{
    delivery::{SendError, Transport},
    peers::Peers,
    provider::openai::OpenAiAdapter,
    transport::{Incoming, IncomingStream},
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use explainer_core::diagram::{DiagramResult, DiagramTask, JobQueue};
use futures_util::StreamExt;
use serde_json::Value;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A transport that records what it was asked to send.
pub(crate) struct FakeTransport {
    open: AtomicBool,
    fail_forever: AtomicBool,
    failures: Mutex<VecDeque<SendError>>,
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    closes: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            fail_forever: AtomicBool::new(false),
            failures: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Every attempt fails with a transient error.
    pub(crate) fn fail_forever(&self) {
        self.fail_forever.store(true, Ordering::SeqCst);
    }

    /// Stops failing every attempt.
    pub(crate) fn recover(&self) {
        self.fail_forever.store(false, Ordering::SeqCst);
    }

    /// The next attempts fail with these errors, in order.
    pub(crate) fn fail_next(&self, errors: Vec<SendError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap())
            .collect()
    }

    /// The `type` field of every JSON message sent, in order.
    pub(crate) fn sent_types(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .filter_map(|v| v.get("type").and_then(Value::as_str).map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn try_send(&self, text: String) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_forever.load(Ordering::SeqCst) {
            return Err(SendError::Transient("scripted failure".into()));
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Peers over two fake sockets, speaking the OpenAI dialect.
pub(crate) fn fake_peers() -> (Peers, Arc<FakeTransport>, Arc<FakeTransport>) {
    let client = Arc::new(FakeTransport::new());
    let provider = Arc::new(FakeTransport::new());
    let peers = Peers {
        client: client.clone(),
        provider: provider.clone(),
        adapter: Arc::new(OpenAiAdapter),
    };
    (peers, client, provider)
}

/// An incoming frame stream fed by the test through the returned sender.
pub(crate) fn incoming() -> (mpsc::UnboundedSender<Incoming>, IncomingStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = UnboundedReceiverStream::new(rx)
        .map(Ok::<_, anyhow::Error>)
        .boxed();
    (tx, stream)
}

/// A job queue that stays not-ready for a fixed number of polls.
pub(crate) struct ScriptedQueue {
    pub(crate) not_ready_polls: usize,
    pub(crate) result: Result<DiagramResult, String>,
    polls: AtomicUsize,
    enqueued: Mutex<Vec<String>>,
}

impl ScriptedQueue {
    pub(crate) fn new(not_ready_polls: usize, result: Result<DiagramResult, String>) -> Self {
        Self {
            not_ready_polls,
            result,
            polls: AtomicUsize::new(0),
            enqueued: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn succeeding(url: &str) -> Self {
        Self::new(0, Ok(DiagramResult::Success(url.to_string())))
    }

    pub(crate) fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub(crate) fn enqueued(&self) -> Vec<String> {
        self.enqueued.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for ScriptedQueue {
    async fn enqueue(&self, prompt: &str) -> Result<DiagramTask> {
        let mut enqueued = self.enqueued.lock().unwrap();
        enqueued.push(prompt.to_string());
        Ok(DiagramTask::new(format!("task-{}", enqueued.len())))
    }

    async fn is_ready(&self, _task: &DiagramTask) -> Result<bool> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(polls > self.not_ready_polls)
    }

    async fn result(&self, _task: &DiagramTask, _timeout: Duration) -> Result<DiagramResult> {
        self.result.clone().map_err(|e| anyhow!(e))
    }
}
