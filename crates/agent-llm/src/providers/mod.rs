//! Concrete LLM provider implementations
//!
//! This module contains implementations of the LLMProvider trait and the
//! fine-tuning job service built on top of them.

pub mod fine_tuning;
pub mod openai;

pub use fine_tuning::{DEFAULT_BASE_MODEL, FineTuneJobService};
pub use openai::{FineTuningJob, ModelInfo, OpenAIConfig, OpenAIProvider};
