/// Integration tests for the HTTP API.
///
/// The router is driven in-process with `tower::ServiceExt::oneshot`, backed by
/// an in-memory database and a scripted LLM client.
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use nlsql::api::{self, AppState, NlqResponse, SchemaResponse};
use nlsql::{Database, GeminiError, LlmClient, NlqTranslator};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Replies with the same text to every prompt.
struct CannedLlm(Result<&'static str, &'static str>);

impl LlmClient for CannedLlm {
    fn generate(&self, _prompt: &str) -> Result<String, GeminiError> {
        self.0.map(String::from).map_err(|message| GeminiError::Api {
            message: message.to_string(),
        })
    }
}

fn app_with(reply: Result<&'static str, &'static str>) -> Router {
    let db = Database::in_memory().expect("failed to create in-memory database");
    db.connection()
        .execute_batch(
            "INSERT INTO customers (customer_id, first_name, last_name, email) VALUES
                (1, 'Ada', 'Lovelace', 'ada@example.com'),
                (2, 'Grace', 'Hopper', 'grace@example.com');",
        )
        .expect("failed to seed customers");

    let translator = NlqTranslator::new(Arc::new(CannedLlm(reply)));
    api::router(AppState::new(db, translator))
}

fn app() -> Router {
    app_with(Ok("```sql\nSELECT first_name, email FROM customers ORDER BY customer_id;\n```"))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn nlq_to_sql_returns_sql_and_rows() {
    let response = app()
        .oneshot(post_json(
            "/api/nlq-to-sql",
            json!({"question": "List customer emails"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({
            "sql_query": "SELECT first_name, email FROM customers ORDER BY customer_id;",
            "result": [
                {"first_name": "Ada", "email": "ada@example.com"},
                {"first_name": "Grace", "email": "grace@example.com"}
            ],
            "error": null
        })
    );

    let typed: NlqResponse = serde_json::from_value(body).unwrap();
    assert!(typed.error.is_none());
}

#[tokio::test]
async fn nlq_to_sql_reports_bad_sql_as_500() {
    let response = app_with(Ok("SELECT * FROM invoices"))
        .oneshot(post_json("/api/nlq-to-sql", json!({"question": "invoices?"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("no such table: invoices"));
}

#[tokio::test]
async fn nlq_to_sql_reports_llm_failure_as_500() {
    let response = app_with(Err("quota exceeded"))
        .oneshot(post_json("/api/nlq-to-sql", json!({"question": "anything"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Gemini API error: quota exceeded");
}

#[tokio::test]
async fn nlq_to_sql_rejects_blank_question() {
    let response = app()
        .oneshot(post_json("/api/nlq-to-sql", json!({"question": "   "})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["detail"], "Question cannot be empty");
}

#[tokio::test]
async fn nlq_to_sql_rejects_missing_question_field() {
    let response = app()
        .oneshot(post_json("/api/nlq-to-sql", json!({"q": "wrong field"})))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn nlq_returns_sql_without_running_it() {
    let response = app_with(Ok("DELETE FROM customers"))
        .oneshot(post_json("/nlq", json!({"question": "remove everyone"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"sql_query": "DELETE FROM customers"})
    );
}

#[tokio::test]
async fn schema_lists_managed_tables() {
    let response = app().oneshot(get("/api/schema")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let schema: SchemaResponse = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(schema.tables.len(), 4);
    assert_eq!(
        schema.tables["products"],
        vec!["product_id", "product_name", "category", "price"]
    );
}

#[tokio::test]
async fn add_record_inserts_and_is_queryable() {
    let app = app_with(Ok("SELECT product_name, price FROM products"));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/add-record",
            json!({"table": "products", "data": {"product_name": "Lamp", "category": "home", "price": 25}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "success", "message": "Record added."})
    );

    let response = app
        .oneshot(post_json("/api/nlq-to-sql", json!({"question": "products?"})))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["result"], json!([{"product_name": "Lamp", "price": 25.0}]));
}

#[tokio::test]
async fn add_record_rejects_unknown_table_with_400() {
    let response = app()
        .oneshot(post_json(
            "/api/add-record",
            json!({"table": "customers; DROP TABLE customers", "data": {"first_name": "x"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_json(response).await["detail"]
            .as_str()
            .unwrap()
            .starts_with("Unknown table")
    );
}

#[tokio::test]
async fn add_record_constraint_violation_is_400() {
    let response = app()
        .oneshot(post_json(
            "/api/add-record",
            json!({"table": "customers", "data": {"first_name": "Dup", "last_name": "Email", "email": "ada@example.com"}}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_json(response).await["detail"]
            .as_str()
            .unwrap()
            .contains("UNIQUE")
    );
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn cors_preflight_is_answered() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/nlq-to-sql")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS)
    );
}
