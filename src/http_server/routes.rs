//! Control API Routes
//!
//! JSON endpoints over the control surface. Every error body is
//! `{"error": <message>, "code": <status>}`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::backend::ColumnInfo;
use crate::control::{ControlError, ControlSurface, NodeStatus, RowField, StatementOutcome};
use crate::errors::ErrorKind;

// ==================
// Request/Response Types
// ==================

/// Query string shared by the browse endpoints
#[derive(Debug, Default, Deserialize)]
pub struct BrowseParams {
    #[serde(default)]
    pub db: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub id: String,
}

/// Body of `POST /query`
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default, alias = "userType")]
    pub user_type: String,
    #[serde(default, alias = "dbName")]
    pub db_name: String,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: StatementOutcome,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct DatabasesResponse {
    pub databases: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Serialize)]
pub struct RowIdsResponse {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RowResponse {
    pub columns: Vec<RowField>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

// ==================
// Control Routes
// ==================

/// Create control routes
pub fn control_routes(surface: Arc<ControlSurface>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/databases", get(list_databases_handler))
        .route("/tables", get(list_tables_handler))
        .route("/schema", get(schema_handler))
        .route("/rows", get(list_rows_handler))
        .route("/row", get(get_row_handler))
        .route("/query", post(query_handler))
        .with_state(surface)
}

/// HTTP status for a control error.
pub fn status_for(error: &ControlError) -> StatusCode {
    if error.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match error.kind() {
        ErrorKind::Policy => StatusCode::FORBIDDEN,
        ErrorKind::Transport => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Protocol | ErrorKind::Backend | ErrorKind::Config => StatusCode::BAD_REQUEST,
    }
}

fn api_error(error: ControlError) -> ApiError {
    let status = status_for(&error);
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: status.as_u16(),
        }),
    )
}

// ==================
// Handlers
// ==================

async fn health_handler(State(surface): State<Arc<ControlSurface>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        role: surface.role().to_string(),
    };

    (StatusCode::OK, Json(response))
}

async fn status_handler(State(surface): State<Arc<ControlSurface>>) -> Json<NodeStatus> {
    Json(surface.status().await)
}

async fn list_databases_handler(
    State(surface): State<Arc<ControlSurface>>,
) -> ApiResult<DatabasesResponse> {
    let databases = surface.list_databases().await.map_err(api_error)?;
    Ok(Json(DatabasesResponse { databases }))
}

async fn list_tables_handler(
    State(surface): State<Arc<ControlSurface>>,
    Query(params): Query<BrowseParams>,
) -> ApiResult<TablesResponse> {
    let tables = surface.list_tables(&params.db).await.map_err(api_error)?;
    Ok(Json(TablesResponse { tables }))
}

async fn schema_handler(
    State(surface): State<Arc<ControlSurface>>,
    Query(params): Query<BrowseParams>,
) -> ApiResult<SchemaResponse> {
    let columns = surface
        .describe_columns(&params.db, &params.table)
        .await
        .map_err(api_error)?;
    Ok(Json(SchemaResponse { columns }))
}

async fn list_rows_handler(
    State(surface): State<Arc<ControlSurface>>,
    Query(params): Query<BrowseParams>,
) -> ApiResult<RowIdsResponse> {
    let ids = surface
        .list_row_ids(&params.db, &params.table)
        .await
        .map_err(api_error)?;
    Ok(Json(RowIdsResponse { ids }))
}

async fn get_row_handler(
    State(surface): State<Arc<ControlSurface>>,
    Query(params): Query<BrowseParams>,
) -> ApiResult<RowResponse> {
    let columns = surface
        .get_row(&params.db, &params.table, &params.id)
        .await
        .map_err(api_error)?;
    Ok(Json(RowResponse { columns }))
}

async fn query_handler(
    State(surface): State<Arc<ControlSurface>>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<QueryResponse> {
    let outcome = surface
        .submit_statement(&request.user_type, &request.db_name, &request.query)
        .await
        .map_err(api_error)?;

    Ok(Json(QueryResponse {
        message: "Query executed successfully".to_string(),
        outcome,
    }))
}
