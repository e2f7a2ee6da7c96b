//! # Study Forge CLI (`sforge`)
//!
//! The `sforge` binary generates study material from local documents and
//! runs the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! sforge --config ./config/sforge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sforge generate <file>` | Summary, study guide, or quiz for one document |
//! | `sforge explain "<concept>"` | Explain one concept at a skill level |
//! | `sforge chunk <file>` | Show how a document is chunked (no model calls) |
//! | `sforge plan <file>` | Show quiz sections and quotas (no model calls) |
//! | `sforge serve` | Start the HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Ten-question quiz for beginners
//! sforge generate notes.pdf --type practice_quiz --level beginner
//!
//! # Study guide generated at the base level, then rewritten for advanced readers
//! sforge generate chapter3.docx --type study_guide --level advanced --adjust
//!
//! # Inspect chunk boundaries before spending tokens
//! sforge chunk lecture.txt --size 2000 --overlap 100
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use study_forge::config::{self, Config};
use study_forge::extract::extract_document;
use study_forge::generate::GenerationClient;
use study_forge::llm::create_model;
use study_forge::pipeline::{cancel_pair, Pipeline};
use study_forge::retry::{retry, RetryPolicy};
use study_forge::server;
use study_forge::telemetry::init_tracing;
use study_forge::GenerationError;
use study_forge_core::chunk::{chunk_text, normalize_whitespace};
use study_forge_core::models::{MaterialRequest, MaterialType, SkillLevel};
use study_forge_core::prompt::Style;
use study_forge_core::section::{assign_quotas, plan};

const DEFAULT_CONFIG: &str = "./config/sforge.toml";

/// Study Forge: turn documents into summaries, study guides, and practice quizzes.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/sforge.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "sforge",
    about = "Study Forge: turn documents into summaries, study guides, and practice quizzes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when the default
    /// path does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate study material for one document.
    Generate {
        /// PDF, DOCX, or plain-text file.
        file: PathBuf,

        /// `summary`, `study_guide`, or `practice_quiz`.
        #[arg(long = "type", default_value = "summary")]
        material_type: MaterialType,

        /// `beginner`, `intermediate`, or `advanced`.
        #[arg(long)]
        level: Option<SkillLevel>,

        /// Number of quiz questions (practice_quiz only).
        #[arg(long)]
        questions: Option<usize>,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        complexity: Option<String>,

        /// Generate at the configured base level, then rewrite for `--level`.
        #[arg(long, conflicts_with = "no_adjust")]
        adjust: bool,

        /// Disable difficulty adjustment even if the config enables it.
        #[arg(long)]
        no_adjust: bool,

        /// Print the full result as JSON instead of the content.
        #[arg(long)]
        json: bool,
    },

    /// Explain a single concept.
    Explain {
        concept: String,

        /// Source passage to ground the explanation.
        #[arg(long)]
        context: Option<String>,

        #[arg(long)]
        level: Option<SkillLevel>,

        #[arg(long)]
        subject: Option<String>,
    },

    /// Show chunk boundaries for a document.
    Chunk {
        file: PathBuf,

        /// Defaults to `[pipeline].summary_chunk_size`.
        #[arg(long)]
        size: Option<usize>,

        /// Defaults to `[pipeline].summary_overlap`.
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Show quiz sections and per-section question quotas.
    Plan {
        file: PathBuf,

        #[arg(long)]
        questions: Option<usize>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else if path == Path::new(DEFAULT_CONFIG) {
        Ok(Config::default())
    } else {
        bail!("Config file not found: {}", path.display())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load(&cli.config)?;
    init_tracing(&cfg.logging);

    match cli.command {
        Commands::Generate {
            file,
            material_type,
            level,
            questions,
            subject,
            complexity,
            adjust,
            no_adjust,
            json,
        } => {
            let text = extract_document(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let mut request = MaterialRequest::new(text, material_type);
            request.skill_level = level;
            request.subject = subject;
            request.complexity = complexity;
            request.number_of_questions = questions;
            request.adjust_difficulty = match (adjust, no_adjust) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };

            let model = create_model(&cfg.model)?;
            let client = GenerationClient::new(model, &cfg);
            let pipeline = Pipeline::new(client.clone(), &cfg);

            let (handle, signal) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    handle.cancel();
                }
            });

            let outcome = pipeline.run(&request, &signal).await;
            client.close();

            let result = outcome.map_err(|e| anyhow::anyhow!(e.user_message(material_type)))?;
            if result.truncated {
                eprintln!("note: document exceeded the size limit and was truncated");
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.content);
            }
        }
        Commands::Explain {
            concept,
            context,
            level,
            subject,
        } => {
            let model = create_model(&cfg.model)?;
            let client = GenerationClient::new(model, &cfg);
            let policy = RetryPolicy::from_config(&cfg.retry);
            let style = Style::new(level.unwrap_or_default()).with_subject(subject);

            let explanation = retry(&policy, "explanation", GenerationError::is_retryable, |_| {
                client.explain(&concept, context.as_deref(), &style)
            })
            .await?;
            client.close();

            println!("{}", explanation.explanation);
            if !explanation.examples.is_empty() {
                println!("\nExamples:");
                for example in &explanation.examples {
                    println!("  - {}", example);
                }
            }
            if !explanation.key_points.is_empty() {
                println!("\nKey points:");
                for point in &explanation.key_points {
                    println!("  - {}", point);
                }
            }
        }
        Commands::Chunk {
            file,
            size,
            overlap,
        } => {
            let text = extract_document(&file)?;
            let size = size.unwrap_or(cfg.pipeline.summary_chunk_size);
            let overlap = overlap.unwrap_or(cfg.pipeline.summary_overlap);
            if size == 0 {
                bail!("--size must be > 0");
            }
            let chunks = chunk_text(&text, size, overlap);
            println!("{} chunks (size {}, overlap {})", chunks.len(), size, overlap);
            for chunk in &chunks {
                let preview: String = chunk.text.chars().take(60).collect();
                println!(
                    "  #{:<3} bytes {:>7}..{:<7} {:?}",
                    chunk.index,
                    chunk.start,
                    chunk.end(),
                    preview
                );
            }
        }
        Commands::Plan { file, questions } => {
            let text = extract_document(&file)?;
            let total = questions.unwrap_or(cfg.pipeline.default_question_count);
            let mut sections = plan(&normalize_whitespace(&text), cfg.pipeline.quiz_section_count);
            assign_quotas(&mut sections, total);
            println!("{} questions across {} sections", total, sections.len());
            for section in &sections {
                println!(
                    "  section {}: {} questions, {} chars",
                    section.index,
                    section.quota,
                    section.text.chars().count()
                );
            }
        }
        Commands::Serve => {
            let model = create_model(&cfg.model)?;
            server::run_server(&cfg, model).await?;
        }
    }

    Ok(())
}
