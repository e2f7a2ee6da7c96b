//! # Study Forge
//!
//! Turns extracted document text into study material with an LLM: a
//! summary, a multi-part study guide, or a multiple-choice practice quiz,
//! each pitched at a beginner, intermediate, or advanced reader.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────┐   ┌──────────────┐
//! │ extract  │──▶│ pipeline                  │──▶│  generate    │──▶ ChatModel
//! │ PDF/DOCX │   │ chunk → generate → merge  │   │ (semaphore,  │    (OpenAI /
//! └──────────┘   │   → [adjust difficulty]   │   │  timeouts)   │     Ollama)
//!                └─────────────┬─────────────┘   └──────────────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!             ┌──────────┐           ┌──────────┐
//!             │   CLI    │           │   HTTP   │
//!             │ (sforge) │           │  (axum)  │
//!             └──────────┘           └──────────┘
//! ```
//!
//! Pure, synchronous pieces (chunking, section planning, prompts, and JSON
//! validation) live in the `study-forge-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Generation and pipeline error types |
//! | [`llm`] | Chat-model backends |
//! | [`generate`] | Typed, rate-limited generation calls |
//! | [`retry`] | Bounded retry and the per-section quiz retry |
//! | [`adjust`] | Skill-level rewriting with validation fallback |
//! | [`pipeline`] | Request orchestration and cancellation |
//! | [`server`] | HTTP API |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`telemetry`] | Logging setup |

pub mod adjust;
pub mod config;
pub mod error;
pub mod extract;
pub mod generate;
pub mod llm;
pub mod pipeline;
pub mod retry;
pub mod server;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use error::{AdjustError, GenerationError, GenerationErrorKind, PipelineError};
