//! Natural-language question to SQL translation.
//!
//! Builds the prompt from a fixed description of the store schema, asks the
//! LLM for a query, strips markdown fences from the reply and optionally runs
//! the result against the database.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::db::{Database, Row};
use crate::gemini::{GeminiError, LlmClient};

/// Instruction and schema text sent ahead of every question.
const SCHEMA_DESCRIPTION: &str = "You are a SQLite expert. Based on the schema below, convert the user's question to a SQL query.

Database Schema:
Table: customers (Columns: customer_id, first_name, last_name, email)
Table: products (Columns: product_id, product_name, category, price)
Table: orders (Columns: order_id, customer_id, order_date, total_amount)
Table: order_items (Columns: order_item_id, order_id, product_id, quantity)";

/// Errors produced while turning a question into rows.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Question cannot be empty")]
    EmptyQuestion,

    #[error(transparent)]
    Llm(#[from] GeminiError),

    #[error("Model returned no SQL")]
    EmptySql,

    #[error("Query failed: {source}")]
    Execution {
        sql: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Generated SQL together with the rows it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NlqAnswer {
    pub sql_query: String,
    pub result: Vec<Row>,
}

/// Returns the hardcoded schema description used as prompt context.
pub fn schema_description() -> &'static str {
    SCHEMA_DESCRIPTION
}

/// Concatenates the schema description and the question into a prompt.
pub fn build_prompt(question: &str) -> String {
    format!("{SCHEMA_DESCRIPTION}\n\nUser's Question: {question}\n\nSQL Query:")
}

/// Removes markdown code fences and surrounding whitespace from a model reply.
pub fn clean_sql(raw: &str) -> String {
    raw.trim()
        .replace("```sql", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Converts questions into SQL using an LLM.
pub struct NlqTranslator {
    client: Arc<dyn LlmClient>,
}

impl NlqTranslator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Asks the model for a SQL query answering `question`.
    pub fn generate_sql(&self, question: &str) -> Result<String, TranslateError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(TranslateError::EmptyQuestion);
        }

        let prompt = build_prompt(question);
        tracing::debug!(question, "calling Gemini API");
        let response = self.client.generate(&prompt)?;

        let sql = clean_sql(&response);
        if sql.is_empty() {
            return Err(TranslateError::EmptySql);
        }
        tracing::info!(sql = %sql, "generated SQL");
        Ok(sql)
    }

    /// Generates SQL for `question` and executes it as-is.
    pub fn answer(&self, question: &str, db: &Database) -> Result<NlqAnswer, TranslateError> {
        let sql_query = self.generate_sql(question)?;
        let result = Self::execute(&sql_query, db)?;
        Ok(NlqAnswer { sql_query, result })
    }

    /// Runs generated SQL, attaching the statement to any failure.
    pub fn execute(sql: &str, db: &Database) -> Result<Vec<Row>, TranslateError> {
        let result = db
            .query_rows(sql)
            .map_err(|source| TranslateError::Execution {
                sql: sql.to_string(),
                source,
            })?;
        tracing::info!(rows = result.len(), "query executed");
        Ok(result)
    }
}
