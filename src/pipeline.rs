//! Request orchestration.
//!
//! A [`Pipeline`] turns one [`MaterialRequest`] into one [`MaterialResult`]
//! by driving the chunker, section planner, generation client, retry logic,
//! and difficulty adjuster. Every run walks the state machine
//!
//! ```text
//! Idle → Chunking → Generating → Aggregating → [AdjustingDifficulty] → Done
//!                                                                    ↘ Failed
//! ```
//!
//! and either returns the whole result or a single [`PipelineError`]; there
//! are no partial results. Each run gets a request id that tags all of its
//! log lines.
//!
//! # Cancellation
//!
//! [`cancel_pair`] creates a [`CancelHandle`] and a [`CancelSignal`]. When
//! the handle fires, the run's work future is dropped, which aborts any
//! in-flight model calls and retry loops, and the run ends in
//! [`PipelineError::Cancelled`].

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::json;
use std::fmt;
use study_forge_core::chunk::{chunk_normalized, normalize_whitespace};
use study_forge_core::models::{
    ContentType, GeneratedItem, MaterialRequest, MaterialResult, MaterialType, QuizQuestion,
    SkillLevel,
};
use study_forge_core::prompt::Style;
use study_forge_core::section::{assign_quotas, plan};
use tokio::sync::watch;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::adjust::DifficultyAdjuster;
use crate::config::{Config, PipelineConfig};
use crate::error::{GenerationError, PipelineError};
use crate::generate::GenerationClient;
use crate::retry::{generate_section_with_retry, retry, RetryPolicy};

const GUIDE_FOOTER: &str = "---\n\nWork through each part, then use the key concepts above to test yourself.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Chunking,
    Generating,
    Aggregating,
    AdjustingDifficulty,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Idle => "idle",
            PipelineState::Chunking => "chunking",
            PipelineState::Generating => "generating",
            PipelineState::Aggregating => "aggregating",
            PipelineState::AdjustingDifficulty => "adjusting_difficulty",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        })
    }
}

/// States visited by one run, in order.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    request_id: Uuid,
    states: Vec<PipelineState>,
}

impl PipelineRun {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            states: vec![PipelineState::Idle],
        }
    }

    fn enter(&mut self, state: PipelineState) {
        info!(%state, "pipeline state");
        self.states.push(state);
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }

    pub fn final_state(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }
}

/// Fires cancellation for the paired [`CancelSignal`]s.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation fires. Pends forever if the handle is
    /// dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

#[derive(Clone)]
pub struct Pipeline {
    client: GenerationClient,
    adjuster: DifficultyAdjuster,
    policy: RetryPolicy,
    config: PipelineConfig,
}

/// Output of one content flow before it is wrapped into a result.
struct Assembled {
    content: String,
    items: Vec<GeneratedItem>,
}

impl Pipeline {
    pub fn new(client: GenerationClient, config: &Config) -> Self {
        let policy = RetryPolicy::from_config(&config.retry);
        Self {
            adjuster: DifficultyAdjuster::new(client.clone(), policy),
            client,
            policy,
            config: config.pipeline.clone(),
        }
    }

    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    pub fn adjuster(&self) -> &DifficultyAdjuster {
        &self.adjuster
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run(
        &self,
        request: &MaterialRequest,
        cancel: &CancelSignal,
    ) -> Result<MaterialResult, PipelineError> {
        self.run_with_report(request, cancel).await.0
    }

    /// Run and also return the visited states.
    pub async fn run_with_report(
        &self,
        request: &MaterialRequest,
        cancel: &CancelSignal,
    ) -> (Result<MaterialResult, PipelineError>, PipelineRun) {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline",
            %request_id,
            material = %request.material_type,
            level = %request.level(),
        );

        async move {
            let mut run = PipelineRun::new(request_id);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                result = self.execute(request, &mut run) => result,
            };

            match &outcome {
                Ok(result) => {
                    run.enter(PipelineState::Done);
                    info!(
                        content_chars = result.content.chars().count(),
                        items = result.items.len(),
                        truncated = result.truncated,
                        "pipeline finished"
                    );
                }
                Err(e) => {
                    run.enter(PipelineState::Failed);
                    warn!(error = %e, "pipeline failed");
                }
            }
            (outcome, run)
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        request: &MaterialRequest,
        run: &mut PipelineRun,
    ) -> Result<MaterialResult, PipelineError> {
        let (text, truncated) = self.prepare(&request.document_text)?;
        let question_count = match request.material_type {
            MaterialType::PracticeQuiz => Some(self.question_count(request)?),
            _ => None,
        };

        let target = request.level();
        let adjust = request
            .adjust_difficulty
            .unwrap_or(self.config.adjust_difficulty);
        let generation_level = if adjust { self.config.base_level } else { target };

        let style = Style::new(generation_level)
            .with_subject(request.subject.clone())
            .with_complexity(request.complexity.clone());
        let adjust_to = (generation_level != target).then(|| style.at_level(target));

        let assembled = match (request.material_type, question_count) {
            (MaterialType::Summary, _) => self.summary(&text, &style, adjust_to.as_ref(), run).await?,
            (MaterialType::StudyGuide, _) => {
                self.study_guide(&text, &style, adjust_to.as_ref(), run)
                    .await?
            }
            (MaterialType::PracticeQuiz, Some(count)) => {
                self.quiz(&text, count, &style, adjust_to.as_ref(), run)
                    .await?
            }
            (MaterialType::PracticeQuiz, None) => {
                return Err(PipelineError::Input("Missing question count.".to_string()))
            }
        };

        Ok(MaterialResult {
            success: true,
            content: assembled.content,
            items: assembled.items,
            truncated,
        })
    }

    fn prepare(&self, raw: &str) -> Result<(String, bool), PipelineError> {
        let text = normalize_whitespace(raw);
        if text.is_empty() {
            return Err(PipelineError::Input("Document text is empty.".to_string()));
        }

        let limit = self.config.max_document_chars;
        match text.char_indices().nth(limit) {
            None => Ok((text, false)),
            Some((cut, _)) => {
                warn!(
                    chars = text.chars().count(),
                    limit, "document exceeds size threshold, truncating"
                );
                Ok((text[..cut].trim_end().to_string(), true))
            }
        }
    }

    fn question_count(&self, request: &MaterialRequest) -> Result<usize, PipelineError> {
        let count = request
            .number_of_questions
            .unwrap_or(self.config.default_question_count);
        let max = self.config.max_question_count;
        if count == 0 || count > max {
            return Err(PipelineError::Input(format!(
                "Number of questions must be between 1 and {}.",
                max
            )));
        }
        Ok(count)
    }

    async fn summary(
        &self,
        text: &str,
        style: &Style,
        adjust_to: Option<&Style>,
        run: &mut PipelineRun,
    ) -> Result<Assembled, PipelineError> {
        run.enter(PipelineState::Chunking);
        let chunks = chunk_normalized(
            text,
            self.config.summary_chunk_size,
            self.config.summary_overlap,
        );
        info!(chunks = chunks.len(), "document chunked");

        run.enter(PipelineState::Generating);
        let total = chunks.len();
        let mut summaries = Vec::with_capacity(total);
        for chunk in &chunks {
            let summary = retry(
                &self.policy,
                "summary",
                GenerationError::is_retryable,
                |_| self.client.summarize(&chunk.text, style),
            )
            .await
            .map_err(|e| {
                PipelineError::generation(
                    format!("summary of chunk {} of {}", chunk.index + 1, total),
                    e,
                )
            })?;
            summaries.push(summary);
        }

        run.enter(PipelineState::Aggregating);
        let mut content = summaries.join("\n\n");
        let mut items: Vec<GeneratedItem> = summaries
            .into_iter()
            .map(|text| GeneratedItem::Summary { text })
            .collect();

        if let Some(target) = adjust_to {
            run.enter(PipelineState::AdjustingDifficulty);
            let (adjusted, changed) = self
                .adjuster
                .adjust_text(&content, ContentType::Summary, style.level, target)
                .await
                .map_err(|e| PipelineError::generation("summary difficulty adjustment", e))?;
            if changed {
                items = vec![GeneratedItem::Summary {
                    text: adjusted.clone(),
                }];
                content = adjusted;
            }
        }

        Ok(Assembled { content, items })
    }

    async fn study_guide(
        &self,
        text: &str,
        style: &Style,
        adjust_to: Option<&Style>,
        run: &mut PipelineRun,
    ) -> Result<Assembled, PipelineError> {
        run.enter(PipelineState::Chunking);
        let chunks = chunk_normalized(
            text,
            self.config.guide_chunk_size,
            self.config.guide_overlap,
        );
        let total = chunks.len();
        info!(chunks = total, "document chunked");

        run.enter(PipelineState::Generating);
        let calls: Vec<_> = chunks
            .iter()
            .map(|chunk| async move {
                retry(
                    &self.policy,
                    "study guide section",
                    GenerationError::is_retryable,
                    |_| {
                        self.client
                            .study_guide_section(&chunk.text, chunk.index, total, style)
                    },
                )
                .await
                .map_err(|e| {
                    PipelineError::generation(
                        format!("study guide part {} of {}", chunk.index + 1, total),
                        e,
                    )
                })
            })
            .collect();
        let sections: Vec<String> = stream::iter(calls)
            .buffered(self.config.guide_concurrency.max(1))
            .try_collect()
            .await?;

        let review = retry(
            &self.policy,
            "key concepts review",
            GenerationError::is_retryable,
            |_| self.client.key_concepts_review(&sections, style),
        )
        .await
        .map_err(|e| PipelineError::generation("key concepts review", e))?;

        run.enter(PipelineState::Aggregating);
        let mut content = assemble_guide(&sections, &review, style);
        let mut items: Vec<GeneratedItem> = sections
            .into_iter()
            .enumerate()
            .map(|(index, text)| GeneratedItem::StudyGuideSection { index, text })
            .collect();

        if let Some(target) = adjust_to {
            run.enter(PipelineState::AdjustingDifficulty);
            let (adjusted, changed) = self
                .adjuster
                .adjust_text(&content, ContentType::StudyGuide, style.level, target)
                .await
                .map_err(|e| PipelineError::generation("study guide difficulty adjustment", e))?;
            if changed {
                items = vec![GeneratedItem::StudyGuideSection {
                    index: 0,
                    text: adjusted.clone(),
                }];
                content = adjusted;
            }
        }

        Ok(Assembled { content, items })
    }

    async fn quiz(
        &self,
        text: &str,
        count: usize,
        style: &Style,
        adjust_to: Option<&Style>,
        run: &mut PipelineRun,
    ) -> Result<Assembled, PipelineError> {
        run.enter(PipelineState::Chunking);
        let mut sections = plan(text, self.config.quiz_section_count);
        assign_quotas(&mut sections, count);
        let quotas: Vec<usize> = sections.iter().map(|s| s.quota).collect();
        info!(sections = sections.len(), ?quotas, "quiz sections planned");

        run.enter(PipelineState::Generating);
        let mut questions: Vec<QuizQuestion> = Vec::with_capacity(count);
        for section in &sections {
            let batch = generate_section_with_retry(
                &self.client,
                section,
                section.quota,
                self.config.max_attempts,
                style,
            )
            .await?;
            questions.extend(batch);
        }

        run.enter(PipelineState::Aggregating);
        if let Some(target) = adjust_to {
            run.enter(PipelineState::AdjustingDifficulty);
            questions = self
                .adjust_questions(questions, style.level, target)
                .await?;
        }

        let content = format!("{:#}", json!({ "questions": questions }));
        let items = questions.into_iter().map(GeneratedItem::QuizQuestion).collect();
        Ok(Assembled { content, items })
    }

    async fn adjust_questions(
        &self,
        questions: Vec<QuizQuestion>,
        from: SkillLevel,
        target: &Style,
    ) -> Result<Vec<QuizQuestion>, PipelineError> {
        let mut out = Vec::with_capacity(questions.len());
        let mut kept = 0;
        for (i, question) in questions.iter().enumerate() {
            let (q, changed) = self
                .adjuster
                .adjust_question(question, from, target)
                .await
                .map_err(|e| {
                    PipelineError::generation(format!("difficulty adjustment of question {}", i + 1), e)
                })?;
            if !changed {
                kept += 1;
            }
            out.push(q);
        }
        if kept > 0 {
            warn!(kept, total = out.len(), "some questions kept at generation level");
        }
        Ok(out)
    }
}

fn assemble_guide(sections: &[String], review: &str, style: &Style) -> String {
    let title = match &style.subject {
        Some(subject) => format!("# Study Guide: {}", subject),
        None => "# Study Guide".to_string(),
    };
    let total = sections.len();

    let mut out = String::new();
    out.push_str(&title);
    out.push_str(&format!(
        "\n\nLevel: {}. This guide has {} part{}.\n\n",
        style.level,
        total,
        if total == 1 { "" } else { "s" }
    ));
    for (i, section) in sections.iter().enumerate() {
        out.push_str(&format!("## Part {} of {}\n\n", i + 1, total));
        out.push_str(section.trim());
        out.push_str("\n\n");
    }
    out.push_str("## Key Concepts Review\n\n");
    out.push_str(review.trim());
    out.push_str("\n\n");
    out.push_str(GUIDE_FOOTER);
    out
}
