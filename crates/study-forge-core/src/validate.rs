//! Defensive parsing and structural validation of model output.
//!
//! Models asked for JSON sometimes answer with prose around it, or wrap
//! it in a fenced code block. [`extract_json`] recovers the outermost JSON
//! object from such replies; [`parse_json`] deserializes it into a typed
//! schema. [`validate_question`] and [`validate_content`] enforce the
//! minimal structural contract downstream consumers rely on.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::models::{ContentType, QuizQuestion, OPTIONS_PER_QUESTION};

/// Model output could not be turned into the expected schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response contains no JSON object")]
    NoJson,
    #[error("response JSON does not match the expected shape: {0}")]
    Schema(String),
}

/// Content violates the structural contract of its type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing or empty field `{0}`")]
    MissingField(&'static str),
    #[error("expected {expected} options, found {found}")]
    OptionCount { expected: usize, found: usize },
    #[error("options are not distinct")]
    DuplicateOptions,
    #[error("correct answer '{0}' does not match exactly one option")]
    UnresolvedAnswer(String),
    #[error("content is not a JSON object")]
    NotAnObject,
}

/// Find the outermost JSON object in a model reply.
///
/// Handles bare JSON, fenced ```` ```json ```` blocks, and objects with
/// leading or trailing prose. Returns `None` when there is no `{ ... }`.
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let body = strip_fence(trimmed).unwrap_or(trimmed);
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

fn strip_fence(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("```")?;
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    let end = rest.rfind("```")?;
    Some(rest[..end].trim())
}

/// Extract and deserialize a typed object from a model reply.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let json = extract_json(raw).ok_or(ParseError::NoJson)?;
    serde_json::from_str(json).map_err(|e| ParseError::Schema(e.to_string()))
}

/// Check the multiple-choice invariant: a question, an explanation,
/// exactly four distinct options, and an answer naming exactly one of them.
pub fn validate_question(q: &QuizQuestion) -> Result<(), ValidationError> {
    if q.question.trim().is_empty() {
        return Err(ValidationError::MissingField("question"));
    }
    if q.options.len() != OPTIONS_PER_QUESTION {
        return Err(ValidationError::OptionCount {
            expected: OPTIONS_PER_QUESTION,
            found: q.options.len(),
        });
    }
    if q.options.iter().any(|o| o.trim().is_empty()) {
        return Err(ValidationError::MissingField("options"));
    }
    for (i, a) in q.options.iter().enumerate() {
        if q.options[i + 1..]
            .iter()
            .any(|b| a.trim().eq_ignore_ascii_case(b.trim()))
        {
            return Err(ValidationError::DuplicateOptions);
        }
    }
    if q.correct_index().is_none() {
        return Err(ValidationError::UnresolvedAnswer(q.correct_answer.clone()));
    }
    if q.explanation.trim().is_empty() {
        return Err(ValidationError::MissingField("explanation"));
    }
    Ok(())
}

/// Minimal structural contract for content of the given type.
pub fn validate_content(content_type: ContentType, value: &Value) -> Result<(), ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let non_empty_str = |field: &'static str| -> Result<(), ValidationError> {
        match obj.get(field).and_then(Value::as_str) {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err(ValidationError::MissingField(field)),
        }
    };

    match content_type {
        ContentType::Question => {
            non_empty_str("question")?;
            let has_options = obj
                .get("options")
                .and_then(Value::as_array)
                .is_some_and(|a| !a.is_empty());
            let has_answer = obj
                .get("correctAnswer")
                .or_else(|| obj.get("answer"))
                .is_some_and(|a| !a.is_null());
            if !has_options {
                return Err(ValidationError::MissingField("options"));
            }
            if !has_answer {
                return Err(ValidationError::MissingField("correctAnswer"));
            }
            non_empty_str("explanation")?;
            let q: QuizQuestion = serde_json::from_value(value.clone())
                .map_err(|_| ValidationError::MissingField("question"))?;
            validate_question(&q)
        }
        other => {
            let field = other
                .text_field()
                .ok_or(ValidationError::MissingField("content"))?;
            non_empty_str(field)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Summary {
        summary: String,
    }

    fn good_question() -> QuizQuestion {
        QuizQuestion {
            question: "Which organelle makes ATP?".to_string(),
            options: vec![
                "Nucleus".to_string(),
                "Mitochondrion".to_string(),
                "Ribosome".to_string(),
                "Golgi body".to_string(),
            ],
            correct_answer: "Mitochondrion".to_string(),
            explanation: "Cellular respiration happens in mitochondria.".to_string(),
        }
    }

    #[test]
    fn test_extract_bare_and_fenced_json() {
        assert_eq!(extract_json("{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(
            extract_json("```json\n{\"a\": {\"b\": 2}}\n```"),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(
            extract_json("Sure! Here you go: {\"a\":1} Hope that helps."),
            Some("{\"a\":1}")
        );
        assert_eq!(extract_json("I cannot help with that."), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn test_parse_json_reports_schema_errors() {
        let ok: Summary = parse_json("```\n{\"summary\":\"cells\"}\n```").unwrap();
        assert_eq!(ok.summary, "cells");

        let err = parse_json::<Summary>("{\"text\":\"cells\"}").unwrap_err();
        assert!(matches!(err, ParseError::Schema(_)));
        assert_eq!(parse_json::<Summary>("prose"), Err(ParseError::NoJson));
    }

    #[test]
    fn test_validate_question_accepts_well_formed() {
        assert_eq!(validate_question(&good_question()), Ok(()));
    }

    #[test]
    fn test_validate_question_rejects_bad_shapes() {
        let mut three = good_question();
        three.options.pop();
        assert_eq!(
            validate_question(&three),
            Err(ValidationError::OptionCount {
                expected: 4,
                found: 3
            })
        );

        let mut dup = good_question();
        dup.options[3] = "nucleus".to_string();
        assert_eq!(validate_question(&dup), Err(ValidationError::DuplicateOptions));

        let mut wrong = good_question();
        wrong.correct_answer = "Chloroplast".to_string();
        assert!(matches!(
            validate_question(&wrong),
            Err(ValidationError::UnresolvedAnswer(_))
        ));

        let mut bare = good_question();
        bare.explanation = " ".to_string();
        assert_eq!(
            validate_question(&bare),
            Err(ValidationError::MissingField("explanation"))
        );
    }

    #[test]
    fn test_validate_content_question_requires_fields() {
        let full = serde_json::to_value(good_question()).unwrap();
        assert_eq!(validate_content(ContentType::Question, &full), Ok(()));

        let mut missing = full.clone();
        missing.as_object_mut().unwrap().remove("explanation");
        assert_eq!(
            validate_content(ContentType::Question, &missing),
            Err(ValidationError::MissingField("explanation"))
        );

        let mut no_options = full;
        no_options.as_object_mut().unwrap().remove("options");
        assert_eq!(
            validate_content(ContentType::Question, &no_options),
            Err(ValidationError::MissingField("options"))
        );
    }

    #[test]
    fn test_validate_content_text_kinds() {
        assert_eq!(
            validate_content(ContentType::Summary, &json!({"summary": "ok"})),
            Ok(())
        );
        assert_eq!(
            validate_content(ContentType::StudyGuide, &json!({"summary": "wrong field"})),
            Err(ValidationError::MissingField("content"))
        );
        assert_eq!(
            validate_content(ContentType::Explanation, &json!("just a string")),
            Err(ValidationError::NotAnObject)
        );
    }
}
