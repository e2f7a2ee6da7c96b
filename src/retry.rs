//! Bounded retry for model calls.
//!
//! [`retry`] runs an async operation until it succeeds, fails with an error
//! the caller marks as permanent, or the attempt budget runs out. Between
//! attempts it sleeps with exponential backoff: `initial`, `2 * initial`,
//! `4 * initial`, ... capped at `max_backoff`.
//!
//! [`generate_section_with_retry`] applies this to one quiz section and
//! additionally treats a wrong question count as a retryable outcome.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use study_forge_core::models::{QuizQuestion, Section};
use study_forge_core::prompt::Style;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{GenerationError, PipelineError};
use crate::generate::GenerationClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Retry without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Sleep before attempt `attempt + 1`, where `attempt` is the 1-based
    /// number of the attempt that just failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exp)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op` under `policy`. `op` receives the 1-based attempt number.
///
/// Returns the first success, the first error for which `is_retryable`
/// is false, or the error of the final attempt.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = label, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && is_retryable(&e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "attempt failed, retrying"
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Why one quiz-section attempt was not accepted.
#[derive(Debug)]
enum SectionAttempt {
    WrongCount(usize),
    Failed(GenerationError),
}

impl SectionAttempt {
    fn is_retryable(&self) -> bool {
        match self {
            SectionAttempt::WrongCount(_) => true,
            SectionAttempt::Failed(e) => e.is_retryable(),
        }
    }
}

impl fmt::Display for SectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionAttempt::WrongCount(n) => write!(f, "wrong question count {}", n),
            SectionAttempt::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Generate exactly `quota` questions for `section`.
///
/// Attempts are immediate. A `Rejected` model error fails at once. When the
/// budget runs out the error names the section and what the final attempt
/// produced.
pub async fn generate_section_with_retry(
    client: &GenerationClient,
    section: &Section,
    quota: usize,
    max_attempts: u32,
    style: &Style,
) -> Result<Vec<QuizQuestion>, PipelineError> {
    if quota == 0 {
        return Ok(Vec::new());
    }

    let policy = RetryPolicy::immediate(max_attempts);
    let label = format!("quiz section {}", section.index);

    let outcome = retry(&policy, &label, SectionAttempt::is_retryable, |attempt| async move {
        debug!(section = section.index, attempt, quota, "generating quiz section");
        match client.quiz_section(&section.text, quota, style).await {
            Ok(questions) if questions.len() == quota => Ok(questions),
            Ok(questions) => Err(SectionAttempt::WrongCount(questions.len())),
            Err(e) => Err(SectionAttempt::Failed(e)),
        }
    })
    .await;

    let attempts = policy.max_attempts.max(1);
    match outcome {
        Ok(questions) => Ok(questions),
        Err(SectionAttempt::WrongCount(n)) => Err(PipelineError::CountMismatch {
            section: section.index,
            expected: quota,
            last_count: Some(n),
            attempts,
            last_error: None,
        }),
        Err(SectionAttempt::Failed(e)) if !e.is_retryable() => {
            Err(PipelineError::generation(label, e))
        }
        Err(SectionAttempt::Failed(e)) => Err(PipelineError::CountMismatch {
            section: section.index,
            expected: quota,
            last_count: None,
            attempts,
            last_error: Some(e.to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationErrorKind;
    use crate::testing::{client_for, quiz_reply, requested_count, FnModel};
    use study_forge_core::models::SkillLevel;

    fn section(index: usize) -> Section {
        Section {
            index,
            start: 0,
            text: "Mitochondria produce ATP through respiration.".to_string(),
            quota: 3,
        }
    }

    fn style() -> Style {
        Style::new(SkillLevel::Intermediate)
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(RetryPolicy::immediate(3).delay_after(2), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_error() {
        let mut calls = 0;
        let result: Result<(), GenerationError> = retry(
            &RetryPolicy::immediate(5),
            "test",
            GenerationError::is_retryable,
            |_| {
                calls += 1;
                async { Err(GenerationError::rejected("bad key")) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let result = retry(
            &RetryPolicy::immediate(3),
            "test",
            GenerationError::is_retryable,
            |attempt| async move {
                if attempt < 3 {
                    Err(GenerationError::model("503"))
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        };
        let started = tokio::time::Instant::now();
        let result: Result<(), GenerationError> = retry(
            &policy,
            "test",
            GenerationError::is_retryable,
            |_| async { Err(GenerationError::timeout("slow")) },
        )
        .await;
        assert_eq!(result.unwrap_err().kind, GenerationErrorKind::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_exact_count_needs_one_call() {
        let model = FnModel::new(|_, req| Ok(quiz_reply(requested_count(&req.user))));
        let client = client_for(model.clone());
        let questions = generate_section_with_retry(&client, &section(0), 3, 3, &style())
            .await
            .unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_count_is_retried() {
        let model = FnModel::new(|n, _| Ok(quiz_reply(if n < 2 { 2 } else { 4 })));
        let client = client_for(model.clone());
        let questions = generate_section_with_retry(&client, &section(1), 4, 3, &style())
            .await
            .unwrap();
        assert_eq!(questions.len(), 4);
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_name_section_and_count() {
        let model = FnModel::new(|_, _| Ok(quiz_reply(3)));
        let client = client_for(model.clone());
        let err = generate_section_with_retry(&client, &section(2), 4, 3, &style())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::CountMismatch {
                section: 2,
                expected: 4,
                last_count: Some(3),
                attempts: 3,
                last_error: None,
            }
        );
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_parse_failures_exhaust_into_count_mismatch() {
        let model = FnModel::new(|_, _| Ok("no json here".to_string()));
        let client = client_for(model.clone());
        let err = generate_section_with_retry(&client, &section(0), 2, 2, &style())
            .await
            .unwrap_err();
        match err {
            PipelineError::CountMismatch {
                last_count: None,
                last_error: Some(msg),
                attempts: 2,
                ..
            } => assert!(msg.contains("parse failure")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_rejected_fails_immediately() {
        let model = FnModel::new(|_, _| Err(GenerationError::rejected("401 Unauthorized")));
        let client = client_for(model.clone());
        let err = generate_section_with_retry(&client, &section(0), 3, 3, &style())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Generation { .. }));
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_quota_skips_model() {
        let model = FnModel::new(|_, _| Ok(quiz_reply(1)));
        let client = client_for(model.clone());
        let questions = generate_section_with_retry(&client, &section(0), 0, 3, &style())
            .await
            .unwrap();
        assert!(questions.is_empty());
        assert_eq!(model.calls(), 0);
    }
}
