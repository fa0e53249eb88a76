//! bubblegrade-providers: Vision model integrations.
//!
//! Implements the `SheetRecognizer` trait for Gemini, Anthropic, and OpenAI,
//! plus a scripted mock for tests, and loads provider configuration.

pub mod anthropic;
pub mod config;
pub mod gemini;
mod http;
pub mod mock;
pub mod openai;

pub use bubblegrade_core::error::RecognitionError;
pub use config::{
    create_recognizer, load_config, load_config_from, BubblegradeConfig, ProviderConfig,
};
