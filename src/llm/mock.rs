//! Scripted [`TextGenerator`] for unit tests.

use super::{Sampling, TextGenerator};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::sync::Mutex;

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system: Option<String>,
    pub user: String,
    pub sampling: Sampling,
}

pub struct MockGenerator {
    respond: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockGenerator {
    /// Answer every prompt with `reply`.
    pub fn replying(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::with(move |_| Ok(reply.clone()))
    }

    /// Fail every call with an API error.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with(move |_| Err(RagError::LlmApi(message.clone())))
    }

    /// Compute the reply from the user message.
    pub fn with(f: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(f),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn complete(
        &self,
        system: Option<&str>,
        user: &str,
        sampling: Sampling,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            system: system.map(str::to_string),
            user: user.to_string(),
            sampling,
        });
        (self.respond)(user)
    }

    fn model(&self) -> &str {
        "mock"
    }
}
