//! Error taxonomy for generation and pipeline runs.
//!
//! | Error | Recoverable | Handling |
//! |-------|-------------|----------|
//! | [`PipelineError::Input`] | no | reported immediately, no model call |
//! | [`GenerationError`] `ParseFailure` / `ModelError` / `Timeout` | yes | bounded retry |
//! | [`GenerationError`] `Rejected` | no | fails the run at once |
//! | [`PipelineError::CountMismatch`] | until attempts run out | bounded retry |
//! | [`AdjustError::Validation`] | n/a | caller keeps the unadjusted content |
//!
//! Binary- and config-level code uses `anyhow`, as elsewhere in the crate.

use std::fmt;
use study_forge_core::models::MaterialType;
use study_forge_core::validate::{ParseError, ValidationError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The reply was not JSON, or not the expected shape.
    ParseFailure,
    /// Transport failure, rate limit, or server error from the model API.
    ModelError,
    /// The call exceeded its configured timeout.
    Timeout,
    /// The API refused the request (bad key, bad request). Retrying won't help.
    Rejected,
}

impl fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GenerationErrorKind::ParseFailure => "parse failure",
            GenerationErrorKind::ModelError => "model error",
            GenerationErrorKind::Timeout => "timeout",
            GenerationErrorKind::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ParseFailure, message)
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ModelError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Timeout, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::Rejected, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind != GenerationErrorKind::Rejected
    }
}

impl From<ParseError> for GenerationError {
    fn from(e: ParseError) -> Self {
        GenerationError::parse(e.to_string())
    }
}

impl From<ValidationError> for GenerationError {
    fn from(e: ValidationError) -> Self {
        GenerationError::parse(e.to_string())
    }
}

/// Failure of a difficulty adjustment call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdjustError {
    #[error("adjusted content failed validation: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Fatal outcome of a pipeline run. No partial results accompany it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("{stage} failed: {source}")]
    Generation {
        stage: String,
        #[source]
        source: GenerationError,
    },

    #[error(
        "section {section} returned {} after {attempts} attempts (expected {expected}){}",
        describe_count(.last_count),
        describe_last_error(.last_error)
    )]
    CountMismatch {
        section: usize,
        expected: usize,
        last_count: Option<usize>,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("request was cancelled")]
    Cancelled,
}

fn describe_count(count: &Option<usize>) -> String {
    match count {
        Some(n) => format!("{} questions", n),
        None => "no usable questions".to_string(),
    }
}

fn describe_last_error(err: &Option<String>) -> String {
    err.as_ref()
        .map(|e| format!("; last error: {}", e))
        .unwrap_or_default()
}

impl PipelineError {
    pub fn generation(stage: impl Into<String>, source: GenerationError) -> Self {
        PipelineError::Generation {
            stage: stage.into(),
            source,
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, PipelineError::Input(_))
    }

    /// The single message shown to the user for a failed run.
    pub fn user_message(&self, material: MaterialType) -> String {
        match self {
            PipelineError::Input(msg) => msg.clone(),
            PipelineError::Cancelled => {
                format!("Generating the {} was cancelled.", material.label())
            }
            other => format!("Failed to generate {}: {}", material.label(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_is_not_retryable() {
        assert!(GenerationError::parse("x").is_retryable());
        assert!(GenerationError::model("x").is_retryable());
        assert!(GenerationError::timeout("x").is_retryable());
        assert!(!GenerationError::rejected("x").is_retryable());
    }

    #[test]
    fn test_count_mismatch_names_section_and_count() {
        let err = PipelineError::CountMismatch {
            section: 2,
            expected: 4,
            last_count: Some(3),
            attempts: 3,
            last_error: None,
        };
        assert_eq!(
            err.to_string(),
            "section 2 returned 3 questions after 3 attempts (expected 4)"
        );

        let parse = PipelineError::CountMismatch {
            section: 0,
            expected: 3,
            last_count: None,
            attempts: 3,
            last_error: Some("parse failure: response contains no JSON object".to_string()),
        };
        assert!(parse.to_string().contains("no usable questions"));
        assert!(parse.to_string().contains("last error: parse failure"));
    }

    #[test]
    fn test_user_message_names_material() {
        let err = PipelineError::generation("summary of chunk 2", GenerationError::timeout("60s"));
        assert_eq!(
            err.user_message(MaterialType::Summary),
            "Failed to generate summary: summary of chunk 2 failed: timeout: 60s"
        );
        let input = PipelineError::Input("Document text is empty.".to_string());
        assert_eq!(
            input.user_message(MaterialType::PracticeQuiz),
            "Document text is empty."
        );
    }
}
