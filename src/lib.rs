pub mod api;
pub mod config;
pub mod db;
pub mod doctor;
pub mod finetune;
pub mod gemini;
pub mod translator;

pub use config::{AppConfig, ConfigError, DatabaseLocation};
pub use db::{Database, DbError};
pub use gemini::{GeminiClient, GeminiClientBuilder, GeminiError, LlmClient};
pub use translator::{NlqAnswer, NlqTranslator, TranslateError};
