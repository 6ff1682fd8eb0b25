//! Test doubles shared by the engine tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use condense_ai::{ChatCompletion, ChatRequest, ChatResponse, Error, Result};
use parking_lot::Mutex;

/// What the mock returns
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Status(u16),
}

/// A chat-completion client with a canned reply, an optional delay, and a
/// record of every request it received
pub struct MockClient {
    reply: Reply,
    delay: Duration,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockClient {
    pub fn replying(text: &str) -> Arc<Self> {
        Self::build(Reply::Text(text.to_string()), Duration::ZERO)
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Self::build(Reply::Status(status), Duration::ZERO)
    }

    pub fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Self::build(Reply::Text(text.to_string()), delay)
    }

    fn build(reply: Reply, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl ChatCompletion for MockClient {
    async fn chat_completion(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.reply {
            Reply::Text(text) => Ok(ChatResponse::text(text.clone())),
            Reply::Status(status) => Err(Error::api(*status, "mock failure")),
        }
    }
}
