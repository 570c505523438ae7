use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{LlmClient, LlmReply};
use crate::error::LlmError;

/// A mock LLM client that plays back scripted replies in order.
///
/// When the script is exhausted the last reply repeats, so a single-entry
/// script behaves like a fixed response.
#[derive(Debug)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockLlmClient {
    /// Create a mock that always returns the given content.
    pub fn returning(content: impl Into<String>) -> Self {
        Self::scripted(vec![content.into()])
    }

    /// Create a mock that plays back the given replies in order.
    pub fn scripted(replies: Vec<String>) -> Self {
        Self {
            script: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The (system, user) prompt pairs received so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("mock lock poisoned").clone()
    }

    /// Number of completions served.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<LlmReply, LlmError> {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .push((system_prompt.to_owned(), user_prompt.to_owned()));

        let mut script = self.script.lock().expect("mock lock poisoned");
        let mut last = self.last.lock().expect("mock lock poisoned");

        let content = match script.pop_front() {
            Some(next) => {
                *last = Some(next.clone());
                next
            }
            None => last.clone().ok_or_else(|| {
                LlmError::UnexpectedResponse("mock script is empty".to_owned())
            })?,
        };

        Ok(LlmReply {
            content,
            model: "mock".to_owned(),
            tokens_used: Some(0),
        })
    }
}

/// A mock LLM client that always fails with the given error message.
#[derive(Debug, Clone)]
pub struct FailingLlmClient {
    message: String,
}

impl FailingLlmClient {
    /// Create a failing client with the given error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<LlmReply, LlmError> {
        Err(LlmError::RetriesExhausted {
            attempts: 3,
            last_error: self.message.clone(),
        })
    }
}
