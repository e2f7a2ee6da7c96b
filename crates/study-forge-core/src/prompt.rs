//! Prompt templates, one per [`ContentKind`].
//!
//! Each builder returns a [`Prompt`] (system + user message) that embeds
//! the skill-level guidelines and spells out the exact JSON object the
//! model must answer with. The generation client pairs each prompt with
//! the sampling parameters configured for its kind.

use crate::models::{ContentType, SkillLevel};

/// A system/user message pair sent as a single chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Audience parameters shared by every template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Style {
    pub level: SkillLevel,
    pub subject: Option<String>,
    pub complexity: Option<String>,
}

impl Style {
    pub fn new(level: SkillLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_complexity(mut self, complexity: Option<String>) -> Self {
        self.complexity = complexity.filter(|s| !s.trim().is_empty());
        self
    }

    /// Same audience, different tier.
    pub fn at_level(&self, level: SkillLevel) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }
}

/// Rewriting guidelines for one skill tier.
#[derive(Debug, Clone, Copy)]
pub struct LevelGuidelines {
    pub vocabulary: &'static str,
    pub examples: &'static str,
    pub depth: &'static str,
}

pub fn guidelines(level: SkillLevel) -> LevelGuidelines {
    match level {
        SkillLevel::Beginner => LevelGuidelines {
            vocabulary: "Use everyday words and short sentences. Define every technical term the first time it appears.",
            examples: "Use concrete, familiar analogies from daily life.",
            depth: "Cover the core ideas only; skip edge cases and formal notation.",
        },
        SkillLevel::Intermediate => LevelGuidelines {
            vocabulary: "Use standard subject terminology, with a brief definition for less common terms.",
            examples: "Use realistic applied examples that connect ideas to practice.",
            depth: "Explain how and why things work, including common misconceptions.",
        },
        SkillLevel::Advanced => LevelGuidelines {
            vocabulary: "Use precise technical vocabulary without simplification.",
            examples: "Use multi-step problems, edge cases, and counterexamples.",
            depth: "Discuss nuance, trade-offs, and connections to related concepts.",
        },
    }
}

const JSON_ONLY: &str =
    "Respond with a single JSON object and nothing else. Do not wrap it in markdown.";

fn system_prompt(role: &str, style: &Style) -> String {
    let g = guidelines(style.level);
    let mut system = format!(
        "You are {role}. Your audience is {level} learners.\n\
         Vocabulary: {vocab}\n\
         Examples: {examples}\n\
         Depth: {depth}\n",
        role = role,
        level = style.level,
        vocab = g.vocabulary,
        examples = g.examples,
        depth = g.depth,
    );
    if let Some(subject) = &style.subject {
        system.push_str(&format!("Subject area: {}.\n", subject));
    }
    if let Some(complexity) = &style.complexity {
        system.push_str(&format!("Requested complexity: {}.\n", complexity));
    }
    system.push_str(JSON_ONLY);
    system
}

pub fn summary(text: &str, style: &Style) -> Prompt {
    Prompt {
        system: system_prompt("an expert tutor who writes faithful, concise summaries", style),
        user: format!(
            "Summarize the following excerpt. Keep every key fact, definition, and \
             relationship; leave out filler. Do not add information that is not in the text.\n\n\
             Answer with: {{\"summary\": \"<the summary as plain prose>\"}}\n\n\
             Excerpt:\n\"\"\"\n{}\n\"\"\"",
            text
        ),
    }
}

pub fn study_guide_section(text: &str, index: usize, total: usize, style: &Style) -> Prompt {
    Prompt {
        system: system_prompt("an expert tutor who builds structured study guides", style),
        user: format!(
            "This is part {part} of {total} of a document. Write the study-guide section for \
             this part in Markdown: a `##` heading naming the topic, the key ideas as bullet \
             points, important terms in bold with definitions, and two self-check questions \
             at the end.\n\n\
             Answer with: {{\"content\": \"<markdown>\"}}\n\n\
             Part {part} of {total}:\n\"\"\"\n{text}\n\"\"\"",
            part = index + 1,
            total = total,
            text = text,
        ),
    }
}

pub fn key_concepts(sections: &[String], style: &Style) -> Prompt {
    let joined = sections
        .iter()
        .enumerate()
        .map(|(i, s)| format!("### Part {}\n{}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n\n");
    Prompt {
        system: system_prompt("an expert tutor who connects ideas across a course", style),
        user: format!(
            "Below are the sections of a study guide. Write a key-concepts review that \
             names the most important concepts across all sections, shows how they relate, \
             and lists the three things a student must remember. Use Markdown bullets.\n\n\
             Answer with: {{\"review\": \"<markdown>\"}}\n\n{}",
            joined
        ),
    }
}

pub fn quiz_section(text: &str, quota: usize, style: &Style) -> Prompt {
    Prompt {
        system: system_prompt("an expert examiner who writes fair multiple-choice questions", style),
        user: format!(
            "Write exactly {quota} multiple-choice questions based only on the excerpt below.\n\
             Rules:\n\
             - each question has exactly 4 distinct options\n\
             - exactly one option is correct; `correctAnswer` repeats that option's text\n\
             - `explanation` says why the answer is correct\n\
             - do not ask about facts that are not in the excerpt\n\n\
             Answer with: {{\"questions\": [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
             \"correctAnswer\": \"...\", \"explanation\": \"...\"}}]}}\n\n\
             Excerpt:\n\"\"\"\n{text}\n\"\"\"",
            quota = quota,
            text = text,
        ),
    }
}

pub fn explanation(concept: &str, context: Option<&str>, style: &Style) -> Prompt {
    let context = context
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!("\n\nContext the student is reading:\n\"\"\"\n{}\n\"\"\"", c))
        .unwrap_or_default();
    Prompt {
        system: system_prompt("a patient tutor who explains one concept at a time", style),
        user: format!(
            "Explain the concept \"{concept}\" to the student.{context}\n\n\
             Answer with: {{\"explanation\": \"...\", \"examples\": [\"...\"], \"keyPoints\": [\"...\"]}}",
            concept = concept,
            context = context,
        ),
    }
}

pub fn difficulty_adjustment(
    content_json: &str,
    content_type: ContentType,
    from: SkillLevel,
    style: &Style,
    preserve_core: bool,
) -> Prompt {
    let target = guidelines(style.level);
    let shape = match content_type {
        ContentType::Question => {
            "{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \"correctAnswer\": \"...\", \"explanation\": \"...\"}"
        }
        ContentType::Summary => "{\"summary\": \"...\"}",
        ContentType::StudyGuide => "{\"content\": \"...\"}",
        ContentType::Explanation => "{\"explanation\": \"...\"}",
    };
    let core_rule = if preserve_core {
        "Keep the core meaning, facts, and (for questions) the correct answer unchanged; \
         only change wording, examples, and depth."
    } else {
        "You may restructure the content freely as long as it stays accurate."
    };
    Prompt {
        system: system_prompt("an editor who rewrites learning material for a new audience", style),
        user: format!(
            "Rewrite this {kind} from {from} level to {to} level.\n\
             Target vocabulary: {vocab}\n\
             Target examples: {examples}\n\
             Target depth: {depth}\n\
             {core_rule}\n\n\
             Answer with the same JSON shape: {shape}\n\n\
             Content:\n{content}",
            kind = content_type,
            from = from,
            to = style.level,
            vocab = target.vocabulary,
            examples = target.examples,
            depth = target.depth,
            core_rule = core_rule,
            shape = shape,
            content = content_json,
        ),
    }
}
