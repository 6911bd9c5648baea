//! skillgate-providers — text-generation provider integrations.
//!
//! Implements the `LlmProvider` trait for Anthropic and OpenAI, plus the
//! configuration layer that selects and builds a provider for the engine.

pub mod anthropic;
pub mod config;
pub mod mock;
pub mod openai;

pub use config::{create_provider, load_config, ProviderConfig, SkillgateConfig};
pub use skillgate_core::error::ProviderError;
