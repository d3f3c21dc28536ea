//! Axum routes for the Corax agent
//!
//! Request/response mapping only; the orchestrator does the work. Library
//! errors map onto statuses per kind: no pending session is 404, a busy
//! session is 409, everything else is 500, always with a JSON error body.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use corax_core::{AgentResult, ApprovalDecision, CoraxError, SessionKey};
use corax_orchestrator::Orchestrator;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub type SharedState = Arc<AppState>;

type ApiError = (StatusCode, Json<serde_json::Value>);

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub user_id: String,
    pub project_id: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub session_id: String,
    pub user_id: String,
    pub project_id: String,
    pub decision: ApprovalDecision,
    #[serde(default)]
    pub modification: Option<String>,
}

/// User/project scope carried as query parameters
#[derive(Debug, Deserialize)]
pub struct SessionScope {
    pub user_id: String,
    pub project_id: String,
}

/// Agent result plus the session echo fields clients key off
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub result: AgentResult,
    pub session_id: String,
    pub message_count: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub tools_loaded: usize,
    pub active_sessions: usize,
}

/// Build the router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/approve", post(approve))
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:session_id", delete(clear_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API
pub async fn serve(orchestrator: Arc<Orchestrator>, addr: &str) -> anyhow::Result<()> {
    let app = router(Arc::new(AppState { orchestrator }));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("corax api listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

/// POST /query - send a question to the agent
async fn query(
    State(app): State<SharedState>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let key = SessionKey::new(
        body.user_id.as_str(),
        body.project_id.as_str(),
        body.session_id.as_str(),
    );
    tracing::info!(session = %key, "query received");

    let result = app
        .orchestrator
        .invoke(&key, &body.question)
        .await
        .map_err(error_response)?;
    let message_count = app
        .orchestrator
        .message_count(&key)
        .await
        .map_err(error_response)?;

    Ok(Json(QueryResponse {
        result,
        session_id: body.session_id,
        message_count,
    }))
}

/// POST /approve - respond to a phase transition request
async fn approve(
    State(app): State<SharedState>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let key = SessionKey::new(
        body.user_id.as_str(),
        body.project_id.as_str(),
        body.session_id.as_str(),
    );
    tracing::info!(session = %key, decision = %body.decision, "approval received");

    let result = app
        .orchestrator
        .resume_after_approval(&key, body.decision, body.modification)
        .await
        .map_err(error_response)?;
    let message_count = app
        .orchestrator
        .message_count(&key)
        .await
        .map_err(error_response)?;

    Ok(Json(QueryResponse {
        result,
        session_id: body.session_id,
        message_count,
    }))
}

/// GET /health
async fn health(State(app): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let active_sessions = app
        .orchestrator
        .session_count()
        .await
        .map_err(error_response)?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools_loaded: app.orchestrator.tools().backend_names().len(),
        active_sessions,
    }))
}

/// GET /sessions?user_id=..&project_id=..
async fn list_sessions(
    State(app): State<SharedState>,
    Query(scope): Query<SessionScope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sessions = app
        .orchestrator
        .list_sessions(&scope.user_id, &scope.project_id)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

/// DELETE /sessions/:session_id?user_id=..&project_id=..
async fn clear_session(
    State(app): State<SharedState>,
    Path(session_id): Path<String>,
    Query(scope): Query<SessionScope>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = SessionKey::new(scope.user_id, scope.project_id, session_id);
    let cleared = app
        .orchestrator
        .clear_session(&key)
        .await
        .map_err(error_response)?;
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

fn error_response(err: CoraxError) -> ApiError {
    let status = match &err {
        CoraxError::NoPendingSession(_) => StatusCode::NOT_FOUND,
        CoraxError::SessionBusy(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        let (status, _) = error_response(CoraxError::NoPendingSession("a:b:c".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(CoraxError::SessionBusy("a:b:c".to_string()));
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = error_response(CoraxError::Llm("api unreachable".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.0["error"].as_str().unwrap().contains("api unreachable"));
    }

    #[test]
    fn test_query_request_decodes() {
        let body: QueryRequest = serde_json::from_str(
            r#"{
                "question": "Find vulnerabilities on the target",
                "user_id": "user1",
                "project_id": "project1",
                "session_id": "session-001"
            }"#,
        )
        .unwrap();
        assert_eq!(body.question, "Find vulnerabilities on the target");
        assert_eq!(body.session_id, "session-001");
    }

    #[test]
    fn test_approve_request_decodes_decision() {
        let body: ApproveRequest = serde_json::from_str(
            r#"{
                "session_id": "session-001",
                "user_id": "user1",
                "project_id": "project1",
                "decision": "modify",
                "modification": "only port 80"
            }"#,
        )
        .unwrap();
        assert_eq!(body.decision, ApprovalDecision::Modify);
        assert_eq!(body.modification.as_deref(), Some("only port 80"));

        assert!(serde_json::from_str::<ApproveRequest>(
            r#"{"session_id": "s", "user_id": "u", "project_id": "p", "decision": "maybe"}"#
        )
        .is_err());
    }

    #[test]
    fn test_query_response_flattens_result() {
        let response = QueryResponse {
            result: AgentResult::default().with_error("backend unreachable"),
            session_id: "session-001".to_string(),
            message_count: 4,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["session_id"], "session-001");
        assert_eq!(value["message_count"], 4);
        // result fields sit at the top level, not nested
        assert!(value.get("result").is_none());
        assert_eq!(value["task_complete"], false);
        assert_eq!(value["current_phase"], "informational");
        assert_eq!(value["error"], "backend unreachable");
    }
}
