//! Typed generation calls on top of a [`ChatModel`].
//!
//! [`GenerationClient`] owns the shared model handle, a semaphore capping
//! simultaneous outbound calls, and the per-kind sampling/timeout table.
//! Each public method builds the prompt for one content kind, runs a single
//! model call under that kind's timeout, and parses the reply into its
//! schema. Retrying is left to [`crate::retry`].
//!
//! The client is cheap to clone; clones share the model and the semaphore.
//! [`GenerationClient::close`] closes the semaphore, after which every call
//! fails with a `Rejected` error.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use study_forge_core::models::{ContentKind, ContentType, QuizQuestion, SkillLevel};
use study_forge_core::prompt::{self, Prompt, Style};
use study_forge_core::validate::{parse_json, validate_question};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::{Config, GenerationConfig};
use crate::error::GenerationError;
use crate::llm::{ChatModel, ChatRequest};

/// Reply of the explanation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub explanation: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default, alias = "key_points")]
    pub key_points: Vec<String>,
}

#[derive(Deserialize)]
struct SummaryReply {
    summary: String,
}

#[derive(Deserialize)]
struct GuideReply {
    content: String,
}

#[derive(Deserialize)]
struct ReviewReply {
    review: String,
}

#[derive(Deserialize)]
struct QuizReply {
    questions: Vec<QuizQuestion>,
}

#[derive(Clone)]
pub struct GenerationClient {
    model: Arc<dyn ChatModel>,
    limiter: Arc<Semaphore>,
    params: GenerationConfig,
}

impl GenerationClient {
    pub fn new(model: Arc<dyn ChatModel>, config: &Config) -> Self {
        Self::with_params(
            model,
            config.model.max_concurrency,
            config.generation.clone(),
        )
    }

    pub fn with_params(
        model: Arc<dyn ChatModel>,
        max_concurrency: usize,
        params: GenerationConfig,
    ) -> Self {
        Self {
            model,
            limiter: Arc::new(Semaphore::new(max_concurrency.max(1))),
            params,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Stop accepting calls. Calls already holding a permit finish normally.
    pub fn close(&self) {
        self.limiter.close();
    }

    pub fn is_closed(&self) -> bool {
        self.limiter.is_closed()
    }

    async fn call(&self, kind: ContentKind, prompt: Prompt) -> Result<String, GenerationError> {
        let params = self.params.params(kind);
        let request = ChatRequest::from_prompt(kind, prompt, params.temperature, params.max_tokens);

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| GenerationError::rejected("generation client is closed"))?;

        let started = Instant::now();
        let reply = tokio::time::timeout(params.timeout(), self.model.complete(&request))
            .await
            .map_err(|_| {
                GenerationError::timeout(format!(
                    "{} call exceeded {}s",
                    kind, params.timeout_secs
                ))
            })?;

        debug!(
            kind = %kind,
            model = self.model.model_name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = reply.is_ok(),
            "model call finished"
        );
        reply
    }

    pub async fn summarize(&self, text: &str, style: &Style) -> Result<String, GenerationError> {
        let raw = self
            .call(ContentKind::Summary, prompt::summary(text, style))
            .await?;
        let reply: SummaryReply = parse_json(&raw)?;
        non_empty(reply.summary, "summary")
    }

    pub async fn study_guide_section(
        &self,
        text: &str,
        index: usize,
        total: usize,
        style: &Style,
    ) -> Result<String, GenerationError> {
        let raw = self
            .call(
                ContentKind::StudyGuideSection,
                prompt::study_guide_section(text, index, total, style),
            )
            .await?;
        let reply: GuideReply = parse_json(&raw)?;
        non_empty(reply.content, "content")
    }

    pub async fn key_concepts_review(
        &self,
        sections: &[String],
        style: &Style,
    ) -> Result<String, GenerationError> {
        let raw = self
            .call(ContentKind::KeyConcepts, prompt::key_concepts(sections, style))
            .await?;
        let reply: ReviewReply = parse_json(&raw)?;
        non_empty(reply.review, "review")
    }

    /// Ask for `quota` questions about `text`. Every returned question is
    /// structurally valid; the count is not checked here.
    pub async fn quiz_section(
        &self,
        text: &str,
        quota: usize,
        style: &Style,
    ) -> Result<Vec<QuizQuestion>, GenerationError> {
        let raw = self
            .call(ContentKind::QuizSection, prompt::quiz_section(text, quota, style))
            .await?;
        let reply: QuizReply = parse_json(&raw)?;
        for (i, question) in reply.questions.iter().enumerate() {
            validate_question(question)
                .map_err(|e| GenerationError::parse(format!("question {}: {}", i + 1, e)))?;
        }
        Ok(reply.questions)
    }

    pub async fn explain(
        &self,
        concept: &str,
        context: Option<&str>,
        style: &Style,
    ) -> Result<Explanation, GenerationError> {
        let raw = self
            .call(
                ContentKind::Explanation,
                prompt::explanation(concept, context, style),
            )
            .await?;
        let reply: Explanation = parse_json(&raw)?;
        if reply.explanation.trim().is_empty() {
            return Err(GenerationError::parse("reply has an empty `explanation`"));
        }
        Ok(reply)
    }

    /// Rewrite `content` for `target.level`. The reply is returned as raw
    /// JSON; structural checks belong to the adjuster.
    pub async fn rewrite(
        &self,
        content: &Value,
        content_type: ContentType,
        from: SkillLevel,
        target: &Style,
        preserve_core: bool,
    ) -> Result<Value, GenerationError> {
        let content_json = content.to_string();
        let raw = self
            .call(
                ContentKind::DifficultyAdjustment,
                prompt::difficulty_adjustment(&content_json, content_type, from, target, preserve_core),
            )
            .await?;
        Ok(parse_json(&raw)?)
    }
}

fn non_empty(text: String, field: &str) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::parse(format!("reply has an empty `{}`", field)))
    } else {
        Ok(text)
    }
}
