//! # Study Forge Core
//!
//! Shared, synchronous logic for Study Forge: data models, whitespace
//! normalization, chunking, section planning, prompt templates, and
//! structural validation of model output.
//!
//! This crate contains no tokio, reqwest, or other I/O dependencies. Every
//! function here is deterministic and can be tested without a model.

pub mod chunk;
pub mod models;
pub mod prompt;
pub mod section;
pub mod validate;
