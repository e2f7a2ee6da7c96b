//! Shared helpers for integration tests: a scripted chat model and
//! sample documents.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use study_forge::config::Config;
use study_forge::llm::{ChatModel, ChatRequest};
use study_forge::GenerationError;
use study_forge_core::models::ContentKind;

type Reply = dyn Fn(usize, &ChatRequest) -> Result<String, GenerationError> + Send + Sync;
type Delay = dyn Fn(&ChatRequest) -> Duration + Send + Sync;

/// A chat model driven by a closure, recording every request it sees.
pub struct ScriptedModel {
    reply: Box<Reply>,
    delay: Option<Box<Delay>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(usize, &ChatRequest) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            delay: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay<D>(mut self, delay: D) -> Self
    where
        D: Fn(&ChatRequest) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn kinds(&self) -> Vec<ContentKind> {
        self.seen.lock().unwrap().iter().map(|r| r.kind).collect()
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(request)).await;
        }
        (self.reply)(n, request)
    }
}

/// Replies the way a well-behaved model would, for every content kind.
pub fn well_behaved(_n: usize, request: &ChatRequest) -> Result<String, GenerationError> {
    Ok(match request.kind {
        ContentKind::Summary => json!({"summary": "A faithful summary."}).to_string(),
        ContentKind::StudyGuideSection => {
            let part = guide_part(&request.user);
            json!({"content": format!("Notes for part {}.", part)}).to_string()
        }
        ContentKind::KeyConcepts => json!({"review": "Key concepts across all parts."}).to_string(),
        ContentKind::QuizSection => quiz_reply(requested_count(&request.user)),
        ContentKind::Explanation => json!({
            "explanation": "A clear explanation.",
            "examples": ["An example"],
            "keyPoints": ["A key point"]
        })
        .to_string(),
        ContentKind::DifficultyAdjustment => json!({"summary": "Rewritten."}).to_string(),
    })
}

pub fn question(i: usize) -> Value {
    json!({
        "question": format!("What does fact {} state?", i),
        "options": ["It is true", "It is false", "It is unknown", "It is irrelevant"],
        "correctAnswer": "It is true",
        "explanation": format!("Fact {} is stated in the text.", i),
    })
}

pub fn quiz_reply(count: usize) -> String {
    let questions: Vec<Value> = (0..count).map(question).collect();
    json!({ "questions": questions }).to_string()
}

/// Quota in a quiz-section prompt.
pub fn requested_count(user_prompt: &str) -> usize {
    number_after(user_prompt, "Write exactly ")
}

/// 1-based part number in a study-guide prompt.
pub fn guide_part(user_prompt: &str) -> usize {
    number_after(user_prompt, "This is part ")
}

fn number_after(text: &str, marker: &str) -> usize {
    text.split(marker)
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

/// Roughly `chars` characters of distinct sentences.
pub fn document(chars: usize) -> String {
    let mut text = String::new();
    let mut i = 0;
    while text.len() < chars {
        text.push_str(&format!(
            "Sentence {} explains how cells use energy from food. ",
            i
        ));
        i += 1;
    }
    text.trim_end().to_string()
}

/// Defaults with retry backoff disabled.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry.initial_backoff_ms = 0;
    config.retry.max_backoff_ms = 0;
    config
}
