//! Scripted chat model for unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::generate::GenerationClient;
use crate::llm::{ChatModel, ChatRequest};

type Script = dyn Fn(usize, &ChatRequest) -> Result<String, GenerationError> + Send + Sync;

/// A model whose replies come from a closure. The closure receives the
/// zero-based call number and the request.
pub struct FnModel {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl FnModel {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(usize, &ChatRequest) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FnModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(n, request)
    }
}

pub fn client_for(model: Arc<FnModel>) -> GenerationClient {
    GenerationClient::with_params(model, 4, GenerationConfig::default())
}

pub fn question_json(i: usize) -> Value {
    json!({
        "question": format!("Question {}?", i),
        "options": ["alpha", "beta", "gamma", "delta"],
        "correctAnswer": "beta",
        "explanation": format!("Because of fact {}.", i),
    })
}

pub fn quiz_reply(count: usize) -> String {
    let questions: Vec<Value> = (0..count).map(question_json).collect();
    json!({ "questions": questions }).to_string()
}

/// The question count a quiz prompt asks for.
pub fn requested_count(user_prompt: &str) -> usize {
    user_prompt
        .split("Write exactly ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}
