/// Gemini HTTP client module.
///
/// This module provides a blocking HTTP client for the Generative Language API,
/// including error handling, retry logic, and timeout configuration.
mod client;

pub use client::{GeminiClient, GeminiClientBuilder, GeminiError, LlmClient, ModelInfo};
