//! Connectivity smoke tests for the database and the Gemini API.
//!
//! Provides the `check-db`, `check-llm` and `list-models` commands.

use crate::config::AppConfig;
use crate::db::Database;
use crate::gemini::{GeminiClient, GeminiError, LlmClient, ModelInfo};

// ANSI color codes for terminal output
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

/// Question used to prove the API key works.
pub const SMOKE_TEST_PROMPT: &str = "In one word, what is the color of the sky?";

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Check passed, with a short description
    Ok(String),
    /// Check failed, with the error details
    Error(String),
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthStatus::Ok(_))
    }

    fn symbol(&self) -> &'static str {
        match self {
            HealthStatus::Ok(_) => "\u{2713}",
            HealthStatus::Error(_) => "\u{2717}",
        }
    }

    fn color(&self) -> &'static str {
        match self {
            HealthStatus::Ok(_) => GREEN,
            HealthStatus::Error(_) => RED,
        }
    }

    fn message(&self) -> &str {
        match self {
            HealthStatus::Ok(m) | HealthStatus::Error(m) => m,
        }
    }
}

/// Opens the configured database and runs `SELECT 1`.
pub fn check_database(config: &AppConfig) -> HealthStatus {
    let location = match config.database_location() {
        Ok(location) => location,
        Err(e) => return HealthStatus::Error(e.to_string()),
    };

    match Database::connect(&location).and_then(|db| db.ping()) {
        Ok(()) => HealthStatus::Ok("Database connection is working correctly".to_string()),
        Err(e) => HealthStatus::Error(format!("Could not connect to the database: {e:#}")),
    }
}

/// Sends a one-word question to the model.
pub fn check_llm(client: &dyn LlmClient) -> HealthStatus {
    match client.generate(SMOKE_TEST_PROMPT) {
        Ok(reply) => HealthStatus::Ok(format!("API key is working. LLM response: {}", reply.trim())),
        Err(e) => HealthStatus::Error(format!("Could not reach the Gemini API: {e}")),
    }
}

/// Returns the names of models that support `generateContent`.
pub fn list_generation_models(client: &GeminiClient) -> Result<Vec<String>, GeminiError> {
    Ok(generation_model_names(client.list_models()?))
}

fn generation_model_names(models: Vec<ModelInfo>) -> Vec<String> {
    models
        .into_iter()
        .filter(ModelInfo::supports_generate_content)
        .map(|m| m.name)
        .collect()
}

/// Prints a single check result.
pub fn print_status(title: &str, status: &HealthStatus) {
    println!("{}{}{}", BOLD, title, RESET);
    println!(
        "  {}{}{} {}",
        status.color(),
        status.symbol(),
        RESET,
        status.message()
    );
}

/// Prints the model list, or a hint when it is empty.
pub fn print_models(base_url: &str, models: &[String]) {
    println!("{}Models supporting generateContent{}", BOLD, RESET);
    println!("  {}URL: {}{}", DIM, base_url, RESET);
    if models.is_empty() {
        println!("  {}No models available for this key{}", RED, RESET);
    }
    for model in models {
        println!("  -> {}", model);
    }
}
