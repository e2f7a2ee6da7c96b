//! Rewriting generated content for a different skill level.
//!
//! [`DifficultyAdjuster::adjust`] asks the model to rewrite a JSON content
//! object and checks the reply against the structural contract of its
//! [`ContentType`]. Callers that prefer degraded output over failure use
//! [`DifficultyAdjuster::adjust_or_keep`], which returns the original
//! content when the rewrite does not validate. Model errors are not
//! swallowed.

use serde_json::{json, Value};
use study_forge_core::models::{ContentType, QuizQuestion, SkillLevel};
use study_forge_core::prompt::Style;
use study_forge_core::validate::validate_content;
use tracing::{debug, warn};

use crate::error::{AdjustError, GenerationError};
use crate::generate::GenerationClient;
use crate::retry::{retry, RetryPolicy};

#[derive(Clone)]
pub struct DifficultyAdjuster {
    client: GenerationClient,
    policy: RetryPolicy,
}

impl DifficultyAdjuster {
    pub fn new(client: GenerationClient, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn adjust(
        &self,
        content: &Value,
        content_type: ContentType,
        from: SkillLevel,
        to: SkillLevel,
        preserve_core: bool,
    ) -> Result<Value, AdjustError> {
        self.adjust_styled(content, content_type, from, &Style::new(to), preserve_core)
            .await
    }

    /// Like [`adjust`](Self::adjust), with subject and complexity hints
    /// carried in `target`.
    pub async fn adjust_styled(
        &self,
        content: &Value,
        content_type: ContentType,
        from: SkillLevel,
        target: &Style,
        preserve_core: bool,
    ) -> Result<Value, AdjustError> {
        validate_content(content_type, content)?;
        if from == target.level {
            return Ok(content.clone());
        }

        let adjusted = retry(
            &self.policy,
            "difficulty adjustment",
            GenerationError::is_retryable,
            |_| {
                self.client
                    .rewrite(content, content_type, from, target, preserve_core)
            },
        )
        .await?;

        validate_content(content_type, &adjusted)?;
        debug!(content_type = %content_type, %from, to = %target.level, "content adjusted");
        Ok(adjusted)
    }

    /// Adjust, keeping `content` when the rewrite fails validation.
    ///
    /// The flag is `true` when the returned value is the rewrite.
    pub async fn adjust_or_keep(
        &self,
        content: &Value,
        content_type: ContentType,
        from: SkillLevel,
        target: &Style,
        preserve_core: bool,
    ) -> Result<(Value, bool), GenerationError> {
        if from == target.level {
            return Ok((content.clone(), false));
        }
        match self
            .adjust_styled(content, content_type, from, target, preserve_core)
            .await
        {
            Ok(adjusted) => Ok((adjusted, true)),
            Err(AdjustError::Validation(e)) => {
                warn!(content_type = %content_type, error = %e, "adjusted content invalid, keeping original");
                Ok((content.clone(), false))
            }
            Err(AdjustError::Generation(e)) => Err(e),
        }
    }

    /// Adjust a single text field of a text content type.
    pub async fn adjust_text(
        &self,
        text: &str,
        content_type: ContentType,
        from: SkillLevel,
        target: &Style,
    ) -> Result<(String, bool), GenerationError> {
        let Some(field) = content_type.text_field() else {
            return Ok((text.to_string(), false));
        };
        let wrapped = json!({ field: text });
        let (value, adjusted) = self
            .adjust_or_keep(&wrapped, content_type, from, target, true)
            .await?;
        match value.get(field).and_then(Value::as_str) {
            Some(s) if adjusted => Ok((s.to_string(), true)),
            _ => Ok((text.to_string(), false)),
        }
    }

    /// Adjust one quiz question, keeping its correct answer.
    pub async fn adjust_question(
        &self,
        question: &QuizQuestion,
        from: SkillLevel,
        target: &Style,
    ) -> Result<(QuizQuestion, bool), GenerationError> {
        let value = serde_json::to_value(question)
            .map_err(|e| GenerationError::parse(format!("question not serializable: {}", e)))?;
        let (value, adjusted) = self
            .adjust_or_keep(&value, ContentType::Question, from, target, true)
            .await?;
        if !adjusted {
            return Ok((question.clone(), false));
        }
        match serde_json::from_value::<QuizQuestion>(value) {
            Ok(q) => Ok((q, true)),
            Err(e) => {
                warn!(error = %e, "adjusted question unreadable, keeping original");
                Ok((question.clone(), false))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationErrorKind;
    use crate::testing::{client_for, question_json, FnModel};
    use study_forge_core::models::ContentKind;

    fn adjuster(model: std::sync::Arc<FnModel>) -> DifficultyAdjuster {
        DifficultyAdjuster::new(client_for(model), RetryPolicy::immediate(2))
    }

    #[tokio::test]
    async fn test_valid_rewrite_is_returned() {
        let model = FnModel::new(|_, req| {
            assert_eq!(req.kind, ContentKind::DifficultyAdjustment);
            assert!(req.user.contains("from intermediate level to beginner level"));
            Ok(json!({"summary": "Cells are tiny living units."}).to_string())
        });
        let out = adjuster(model)
            .adjust(
                &json!({"summary": "Cells are the fundamental unit of life."}),
                ContentType::Summary,
                SkillLevel::Intermediate,
                SkillLevel::Beginner,
                true,
            )
            .await
            .unwrap();
        assert_eq!(out["summary"], "Cells are tiny living units.");
    }

    #[tokio::test]
    async fn test_question_rewrite_keeps_required_fields() {
        let model = FnModel::new(|_, req| {
            assert!(req.user.contains("from beginner level to advanced level"));
            Ok(json!({
                "question": "Which mechanism best explains fact 3?",
                "options": ["alpha", "beta", "gamma", "delta"],
                "correctAnswer": "beta",
                "explanation": "Beta follows from the electrochemical gradient.",
            })
            .to_string())
        });
        let out = adjuster(model)
            .adjust(
                &question_json(3),
                ContentType::Question,
                SkillLevel::Beginner,
                SkillLevel::Advanced,
                true,
            )
            .await
            .unwrap();

        assert_eq!(out["question"], "Which mechanism best explains fact 3?");
        assert_eq!(out["options"].as_array().unwrap().len(), 4);
        assert_eq!(out["correctAnswer"], "beta");
        assert!(!out["explanation"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_field_is_validation_error() {
        let model = FnModel::new(|_, _| Ok(json!({"text": "wrong field"}).to_string()));
        let original = json!({"summary": "Original."});
        let adj = adjuster(model);

        let err = adj
            .adjust(
                &original,
                ContentType::Summary,
                SkillLevel::Intermediate,
                SkillLevel::Advanced,
                true,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdjustError::Validation(_)));

        let (kept, adjusted) = adj
            .adjust_or_keep(
                &original,
                ContentType::Summary,
                SkillLevel::Intermediate,
                &Style::new(SkillLevel::Advanced),
                true,
            )
            .await
            .unwrap();
        assert_eq!(kept, original);
        assert!(!adjusted);
    }

    #[tokio::test]
    async fn test_same_level_is_a_no_op() {
        let model = FnModel::new(|_, _| Ok("{}".to_string()));
        let original = json!({"content": "Part one."});
        let out = adjuster(model.clone())
            .adjust(
                &original,
                ContentType::StudyGuide,
                SkillLevel::Beginner,
                SkillLevel::Beginner,
                true,
            )
            .await
            .unwrap();
        assert_eq!(out, original);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = FnModel::new(|_, _| Err(GenerationError::rejected("403")));
        let err = adjuster(model)
            .adjust_or_keep(
                &json!({"summary": "x"}),
                ContentType::Summary,
                SkillLevel::Beginner,
                &Style::new(SkillLevel::Advanced),
                true,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::Rejected);
    }

    #[tokio::test]
    async fn test_adjust_question_keeps_original_on_bad_shape() {
        let model = FnModel::new(|_, _| {
            Ok(json!({
                "question": "Simpler?",
                "options": ["alpha", "beta"],
                "correctAnswer": "beta",
                "explanation": "Short."
            })
            .to_string())
        });
        let original: QuizQuestion = serde_json::from_value(question_json(1)).unwrap();
        let (q, adjusted) = adjuster(model)
            .adjust_question(&original, SkillLevel::Intermediate, &Style::new(SkillLevel::Beginner))
            .await
            .unwrap();
        assert!(!adjusted);
        assert_eq!(q, original);
    }

    #[tokio::test]
    async fn test_adjust_text_unwraps_field() {
        let model = FnModel::new(|_, _| Ok(json!({"content": "Easier guide."}).to_string()));
        let (text, adjusted) = adjuster(model)
            .adjust_text(
                "Dense guide.",
                ContentType::StudyGuide,
                SkillLevel::Advanced,
                &Style::new(SkillLevel::Beginner),
            )
            .await
            .unwrap();
        assert!(adjusted);
        assert_eq!(text, "Easier guide.");
    }
}
