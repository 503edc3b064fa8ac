//! Request handlers and their wire schemas.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::db::{Row, SchemaInfo};
use crate::translator::NlqTranslator;

/// Body of the question endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NlqRequest {
    pub question: String,
}

/// Response of `POST /api/nlq-to-sql`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlqResponse {
    pub sql_query: String,
    pub result: Vec<Row>,
    pub error: Option<String>,
}

/// Response of `POST /nlq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlOnlyResponse {
    pub sql_query: String,
}

/// Response of `GET /api/schema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub tables: SchemaInfo,
}

/// Body of `POST /api/add-record`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddRecordRequest {
    pub table: String,
    pub data: Map<String, Value>,
}

/// Response of `POST /api/add-record`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRecordResponse {
    pub status: String,
    pub message: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Turns a question into SQL, runs it and returns the rows.
pub async fn nlq_to_sql(
    State(state): State<AppState>,
    Json(request): Json<NlqRequest>,
) -> Result<Json<NlqResponse>, ApiError> {
    let sql_query = generate(&state, request.question).await?;

    // The model call happens before the database lock is taken
    let sql = sql_query.clone();
    let result = state
        .with_db(move |db| NlqTranslator::execute(&sql, db).map_err(ApiError::internal))
        .await?;

    Ok(Json(NlqResponse {
        sql_query,
        result,
        error: None,
    }))
}

/// Returns the generated SQL without executing it.
pub async fn nlq(
    State(state): State<AppState>,
    Json(request): Json<NlqRequest>,
) -> Result<Json<SqlOnlyResponse>, ApiError> {
    let sql_query = generate(&state, request.question).await?;
    Ok(Json(SqlOnlyResponse { sql_query }))
}

/// Runs SQL generation on the blocking pool.
async fn generate(state: &AppState, question: String) -> Result<String, ApiError> {
    let translator = state.translator();
    tokio::task::spawn_blocking(move || translator.generate_sql(&question))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::internal)
}

/// Lists the managed tables and their columns.
pub async fn schema(State(state): State<AppState>) -> Result<Json<SchemaResponse>, ApiError> {
    let tables = state
        .with_db(|db| db.schema().map_err(ApiError::internal))
        .await?;
    Ok(Json(SchemaResponse { tables }))
}

/// Inserts one record into a managed table.
pub async fn add_record(
    State(state): State<AppState>,
    Json(request): Json<AddRecordRequest>,
) -> Result<Json<AddRecordResponse>, ApiError> {
    let table = request.table.clone();
    let id = state
        .with_db(move |db| {
            db.insert_record(&request.table, &request.data)
                .map_err(ApiError::bad_request)
        })
        .await?;
    tracing::info!(table = %table, rowid = id, "record added");

    Ok(Json(AddRecordResponse {
        status: "success".to_string(),
        message: "Record added.".to_string(),
    }))
}
