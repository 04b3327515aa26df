//! Shared test helpers: scripted model services.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use toolwright_core::error::ModelError;
use toolwright_core::model::{ModelRequest, ModelService};

/// A model that returns a fixed sequence of replies, then errors.
///
/// Every request is recorded for later inspection.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ModelRequest>>,
    delay: Option<Duration>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelService for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, request: ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::MalformedResponse("script exhausted".into()))
    }
}

/// A model that gives the same reply forever.
pub struct RepeatingModel {
    reply: String,
    calls: Mutex<usize>,
}

impl RepeatingModel {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl ModelService for RepeatingModel {
    fn name(&self) -> &str {
        "repeating"
    }

    async fn send(&self, _request: ModelRequest) -> Result<String, ModelError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.reply.clone())
    }
}

/// A model whose every call fails.
pub struct FailingModel;

#[async_trait::async_trait]
impl ModelService for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _request: ModelRequest) -> Result<String, ModelError> {
        Err(ModelError::Network("connection refused".into()))
    }
}
