//! ModelService trait — the abstraction over the language-model backend.
//!
//! The orchestrator only needs text out of the model: it sends an ordered
//! list of turns (plus an optional system preamble) and receives the raw
//! reply, which the decision parser turns into structure. The same contract
//! serves decision requests and compaction's summary/acknowledgment requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Turn;
use crate::error::ModelError;

/// One request to the model service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// System preamble (response format, capability catalogue)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// The conversation, oldest first
    pub turns: Vec<Turn>,
}

impl ModelRequest {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            system: None,
            turns,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A text-in, text-out model backend.
///
/// Retries and backoff are the implementation's concern; the orchestrator
/// wraps each call in a timeout and treats any error as final for that call.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// A human-readable name (e.g., "openai", "mock").
    fn name(&self) -> &str;

    /// Send the request and return the model's reply text.
    async fn send(&self, request: ModelRequest) -> Result<String, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::EstimationStrategy;

    struct EchoModel;

    #[async_trait]
    impl ModelService for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn send(&self, request: ModelRequest) -> Result<String, ModelError> {
            request
                .turns
                .last()
                .map(|t| t.content.clone())
                .ok_or_else(|| ModelError::MalformedResponse("no turns".into()))
        }
    }

    #[tokio::test]
    async fn model_service_is_object_safe() {
        let model: Box<dyn ModelService> = Box::new(EchoModel);
        let request = ModelRequest::new(vec![Turn::user("ping", EstimationStrategy::Standard)])
            .with_system("be brief");
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(model.send(request).await.unwrap(), "ping");
    }
}
