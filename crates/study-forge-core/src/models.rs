//! Core data models used throughout Study Forge.
//!
//! These types describe a single request-scoped pipeline run: the request
//! parameters, the slices of the document the pipeline works on, the items
//! the model generates, and the assembled result. Nothing here is persisted.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target audience tier. Controls vocabulary and example complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SkillLevel {
    #[serde(rename = "BEGINNER", alias = "beginner", alias = "Beginner")]
    Beginner,
    #[default]
    #[serde(rename = "INTERMEDIATE", alias = "intermediate", alias = "Intermediate")]
    Intermediate,
    #[serde(rename = "ADVANCED", alias = "advanced", alias = "Advanced")]
    Advanced,
}

impl SkillLevel {
    pub const ALL: [SkillLevel; 3] = [
        SkillLevel::Beginner,
        SkillLevel::Intermediate,
        SkillLevel::Advanced,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "advanced" => Ok(SkillLevel::Advanced),
            _ => Err(UnknownVariant {
                what: "skill level",
                value: s.to_string(),
            }),
        }
    }
}

/// Which sub-pipeline a request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialType {
    Summary,
    StudyGuide,
    PracticeQuiz,
}

impl MaterialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialType::Summary => "summary",
            MaterialType::StudyGuide => "study_guide",
            MaterialType::PracticeQuiz => "practice_quiz",
        }
    }

    /// Human-readable label used in user-facing error messages.
    pub fn label(&self) -> &'static str {
        match self {
            MaterialType::Summary => "summary",
            MaterialType::StudyGuide => "study guide",
            MaterialType::PracticeQuiz => "practice quiz",
        }
    }
}

impl fmt::Display for MaterialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "summary" => Ok(MaterialType::Summary),
            "study_guide" | "studyguide" => Ok(MaterialType::StudyGuide),
            "practice_quiz" | "practicequiz" | "quiz" => Ok(MaterialType::PracticeQuiz),
            _ => Err(UnknownVariant {
                what: "material type",
                value: s.to_string(),
            }),
        }
    }
}

/// The shape of a piece of content handed to the difficulty adjuster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Summary,
    StudyGuide,
    Question,
    Explanation,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Summary => "summary",
            ContentType::StudyGuide => "study_guide",
            ContentType::Question => "question",
            ContentType::Explanation => "explanation",
        }
    }

    /// JSON field holding the text body for text-like content types.
    /// Questions are structured and have no single text field.
    pub fn text_field(&self) -> Option<&'static str> {
        match self {
            ContentType::Summary => Some("summary"),
            ContentType::StudyGuide => Some("content"),
            ContentType::Explanation => Some("explanation"),
            ContentType::Question => None,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "summary" => Ok(ContentType::Summary),
            "study_guide" | "guide" => Ok(ContentType::StudyGuide),
            "question" | "quiz" => Ok(ContentType::Question),
            "explanation" => Ok(ContentType::Explanation),
            _ => Err(UnknownVariant {
                what: "content type",
                value: s.to_string(),
            }),
        }
    }
}

/// Prompt template family. Each kind has its own instructions and
/// sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Summary,
    StudyGuideSection,
    KeyConcepts,
    QuizSection,
    Explanation,
    DifficultyAdjustment,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Summary => "summary",
            ContentKind::StudyGuideSection => "study_guide_section",
            ContentKind::KeyConcepts => "key_concepts",
            ContentKind::QuizSection => "quiz_section",
            ContentKind::Explanation => "explanation",
            ContentKind::DifficultyAdjustment => "difficulty_adjustment",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: '{value}'")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

/// An overlapping slice of the normalized document, sized for one model call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    /// Byte offset of `text` within the normalized document.
    pub start: usize,
    pub text: String,
}

impl Chunk {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }
}

/// A non-overlapping slice of the document with the number of items it must yield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub index: usize,
    pub start: usize,
    pub text: String,
    pub quota: usize,
}

/// A multiple-choice question as produced by the model.
///
/// `correct_answer` may be the option text, a letter (`"B"`), or a
/// zero-based index (`"1"` or `1`); see [`QuizQuestion::correct_index`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(alias = "answer", alias = "correct_answer", deserialize_with = "answer_as_string")]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

/// Number of options every multiple-choice question carries.
pub const OPTIONS_PER_QUESTION: usize = 4;

impl QuizQuestion {
    /// Resolve `correct_answer` to an index into `options`.
    ///
    /// Returns `None` when the answer matches no option or matches more
    /// than one.
    pub fn correct_index(&self) -> Option<usize> {
        let answer = self.correct_answer.trim();
        if answer.is_empty() {
            return None;
        }

        let text_matches: Vec<usize> = self
            .options
            .iter()
            .enumerate()
            .filter(|(_, opt)| opt.trim().eq_ignore_ascii_case(answer))
            .map(|(i, _)| i)
            .collect();
        match text_matches.len() {
            1 => return Some(text_matches[0]),
            0 => {}
            _ => return None,
        }

        if let Ok(i) = answer.parse::<usize>() {
            return (i < self.options.len()).then_some(i);
        }

        // "B", "B)", "B. Paris", "B) Paris"
        let mut chars = answer.chars();
        let first = chars.next().and_then(letter_index)?;
        match chars.next() {
            None | Some(')') | Some('.') | Some(':') => {
                (first < self.options.len()).then_some(first)
            }
            Some(_) => None,
        }
    }

    /// The text of the correct option, if it resolves.
    pub fn correct_option(&self) -> Option<&str> {
        self.correct_index()
            .and_then(|i| self.options.get(i))
            .map(|s| s.as_str())
    }
}

fn letter_index(c: char) -> Option<usize> {
    match c.to_ascii_uppercase() {
        'A' => Some(0),
        'B' => Some(1),
        'C' => Some(2),
        'D' => Some(3),
        _ => None,
    }
}

fn answer_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Answer {
        Text(String),
        Index(u64),
    }

    Ok(match Answer::deserialize(deserializer)? {
        Answer::Text(s) => s,
        Answer::Index(i) => i.to_string(),
    })
}

/// One unit of generated study material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GeneratedItem {
    Summary { text: String },
    StudyGuideSection { index: usize, text: String },
    QuizQuestion(QuizQuestion),
}

/// Parameters for one pipeline run. Immutable for the duration of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRequest {
    pub document_text: String,
    pub material_type: MaterialType,
    pub skill_level: Option<SkillLevel>,
    pub subject: Option<String>,
    pub complexity: Option<String>,
    pub number_of_questions: Option<usize>,
    /// Overrides the configured difficulty-adjustment mode when set.
    pub adjust_difficulty: Option<bool>,
}

impl MaterialRequest {
    pub fn new(document_text: impl Into<String>, material_type: MaterialType) -> Self {
        Self {
            document_text: document_text.into(),
            material_type,
            skill_level: None,
            subject: None,
            complexity: None,
            number_of_questions: None,
            adjust_difficulty: None,
        }
    }

    pub fn with_skill_level(mut self, level: SkillLevel) -> Self {
        self.skill_level = Some(level);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_questions(mut self, n: usize) -> Self {
        self.number_of_questions = Some(n);
        self
    }

    pub fn with_adjustment(mut self, adjust: bool) -> Self {
        self.adjust_difficulty = Some(adjust);
        self
    }

    pub fn level(&self) -> SkillLevel {
        self.skill_level.unwrap_or_default()
    }
}

/// Assembled output of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialResult {
    pub success: bool,
    pub content: String,
    pub items: Vec<GeneratedItem>,
    /// The source text exceeded the size threshold and was clipped.
    pub truncated: bool,
}

impl MaterialResult {
    pub fn quiz_questions(&self) -> impl Iterator<Item = &QuizQuestion> {
        self.items.iter().filter_map(|item| match item {
            GeneratedItem::QuizQuestion(q) => Some(q),
            _ => None,
        })
    }
}
