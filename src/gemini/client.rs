/// Gemini HTTP client implementation.
///
/// This module provides `GeminiClient` for making synchronous HTTP requests to the
/// Generative Language API, along with error types and builder patterns for configuration.
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::config::{DEFAULT_API_BASE_URL, DEFAULT_MODEL};

/// Errors that can occur when interacting with the Gemini API.
#[derive(Debug, Error)]
pub enum GeminiError {
    /// Network-related errors (connection failures, DNS resolution, etc.)
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Request or response timeout errors
    #[error("Request timed out")]
    Timeout(#[source] reqwest::Error),

    /// HTTP errors with status code and the API's error message, if any
    #[error("HTTP error: status {status}{}", format_detail(.message))]
    Http { status: u16, message: Option<String> },

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Well-formed response that carries no usable content
    #[error("Gemini API error: {message}")]
    Api { message: String },

    /// Invalid URL configuration error
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No API key configured
    #[error("GOOGLE_API_KEY not found in environment or .env file")]
    MissingApiKey,
}

fn format_detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default()
}

impl GeminiError {
    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GeminiError::Timeout(error)
        } else {
            GeminiError::Network(error)
        }
    }
}

/// A model advertised by the `models` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// Returns true if the model can be used with `generateContent`.
    pub fn supports_generate_content(&self) -> bool {
        self.supported_generation_methods
            .iter()
            .any(|m| m == "generateContent")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelsPage {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Builder for constructing `GeminiClient` instances.
///
/// # Examples
///
/// ```
/// use nlsql::gemini::GeminiClientBuilder;
///
/// let client = GeminiClientBuilder::new()
///     .api_key("test-key")
///     .model("gemini-1.5-flash")
///     .build()
///     .expect("Failed to create client");
/// assert_eq!(client.model(), "models/gemini-1.5-flash");
/// ```
#[derive(Debug, Default)]
pub struct GeminiClientBuilder {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
}

impl GeminiClientBuilder {
    /// Creates a new `GeminiClientBuilder` with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder from a loaded [`AppConfig`](crate::config::AppConfig).
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: Some(config.model.clone()),
            base_url: Some(config.api_base_url.clone()),
        }
    }

    /// Sets the API key sent with every request.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the model name (with or without the `models/` prefix).
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the base URL of the API (e.g., "https://generativelanguage.googleapis.com/v1beta").
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the `GeminiClient` with the configured settings.
    ///
    /// # Environment Variables
    ///
    /// Unset values fall back to `GOOGLE_API_KEY`, `GEMINI_MODEL` and
    /// `GEMINI_BASE_URL`, then to the built-in defaults. A missing API key is
    /// not an error here; requests fail with [`GeminiError::MissingApiKey`].
    pub fn build(self) -> Result<GeminiClient, GeminiError> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty());

        let model = non_blank(self.model)
            .or_else(|| non_blank(std::env::var("GEMINI_MODEL").ok()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let base_url = non_blank(self.base_url)
            .or_else(|| non_blank(std::env::var("GEMINI_BASE_URL").ok()))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        reqwest::Url::parse(&base_url)
            .map_err(|e| GeminiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(GeminiError::Network)?;

        Ok(GeminiClient {
            client,
            api_key,
            model: normalize_model_name(&model),
            base_url,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Prefixes bare model names with `models/`.
fn normalize_model_name(model: &str) -> String {
    let model = model.trim();
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

/// Synchronous HTTP client for the Gemini API.
///
/// It should be constructed using `GeminiClientBuilder`.
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

/// Text-generation seam used by the translator.
///
/// This trait enables mocking in unit tests.
pub trait LlmClient: Send + Sync {
    /// Sends `prompt` to the model and returns the generated text.
    fn generate(&self, prompt: &str) -> Result<String, GeminiError>;
}

impl GeminiClient {
    /// Returns the base URL configured for this client.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the fully-qualified model name (`models/...`).
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns true if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, GeminiError> {
        self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)
    }

    /// Lists every model visible to the API key, following pagination.
    pub fn list_models(&self) -> Result<Vec<ModelInfo>, GeminiError> {
        let key = self.key()?;
        let url = format!("{}/models", self.base_url);

        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: ModelsPage = retry_with_backoff(|| {
                let mut request = self
                    .client
                    .get(&url)
                    .header("x-goog-api-key", key)
                    .query(&[("pageSize", "100")]);
                if let Some(token) = &page_token {
                    request = request.query(&[("pageToken", token.as_str())]);
                }
                let response = request.send().map_err(GeminiError::from_reqwest)?;
                let body = read_success_body(response)?;
                serde_json::from_str(&body).map_err(GeminiError::Serialization)
            })?;

            models.extend(page.models);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(models)
    }

    fn generate_internal(&self, prompt: &str) -> Result<String, GeminiError> {
        let key = self.key()?;
        let url = format!("{}/{}:generateContent", self.base_url, self.model);
        let request_body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        retry_with_backoff(|| {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", key)
                .json(&request_body)
                .send()
                .map_err(GeminiError::from_reqwest)?;

            let body = read_success_body(response)?;
            let json: serde_json::Value =
                serde_json::from_str(&body).map_err(GeminiError::Serialization)?;
            extract_candidate_text(&json)
        })
    }
}

impl LlmClient for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, GeminiError> {
        self.generate_internal(prompt)
    }
}

/// Returns the response body, or an `Http` error carrying the API's message.
fn read_success_body(response: reqwest::blocking::Response) -> Result<String, GeminiError> {
    let status = response.status();
    let body = response.text().map_err(GeminiError::from_reqwest)?;

    if status.is_success() {
        return Ok(body);
    }

    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(String::from)
        });

    Err(GeminiError::Http {
        status: status.as_u16(),
        message,
    })
}

/// Concatenates the text parts of the first candidate.
fn extract_candidate_text(json: &serde_json::Value) -> Result<String, GeminiError> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first());

    let Some(candidate) = candidate else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str());
        return Err(GeminiError::Api {
            message: match reason {
                Some(reason) => format!("Prompt blocked: {reason}"),
                None => "Missing 'candidates' in API response".to_string(),
            },
        });
    };

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        let finish = candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .unwrap_or("unknown");
        return Err(GeminiError::Api {
            message: format!("Candidate contained no text (finish reason: {finish})"),
        });
    }

    Ok(text)
}

/// Retries an operation with exponential backoff.
///
/// This function will retry the operation up to 3 times with delays of 1s, 2s, and 4s.
/// It only retries on transient errors (HTTP 5xx, 429 and network errors).
pub fn retry_with_backoff<F, T>(mut f: F) -> Result<T, GeminiError>
where
    F: FnMut() -> Result<T, GeminiError>,
{
    const MAX_RETRIES: usize = 3;
    const DELAYS: [u64; MAX_RETRIES] = [1, 2, 4]; // seconds

    let mut last_error = match f() {
        Ok(result) => return Ok(result),
        Err(e) => {
            if !should_retry(&e) {
                return Err(e);
            }
            e
        }
    };

    for &delay_secs in &DELAYS {
        tracing::warn!(error = %last_error, delay_secs, "retrying Gemini request");
        thread::sleep(Duration::from_secs(delay_secs));

        match f() {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }
                last_error = e;
            }
        }
    }

    Err(last_error)
}

/// Returns `true` for transient errors (HTTP 5xx and 429, network errors, timeouts).
fn should_retry(error: &GeminiError) -> bool {
    match error {
        GeminiError::Network(_) => true,
        GeminiError::Timeout(_) => true,
        GeminiError::Http { status, .. } => *status == 429 || (500..600).contains(status),
        GeminiError::Serialization(_) => false,
        GeminiError::Api { .. } => false,
        GeminiError::InvalidUrl(_) => false,
        GeminiError::MissingApiKey => false,
    }
}
