use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
struct QueryRequest {
    #[serde(default)]
    session_id: Option<Uuid>,
    query: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct QueryResponse {
    session_id: Uuid,
    answer: String,
}

async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> impl IntoResponse {
    if request.query.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Query must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    let (session_id, agent) = match state.agent_for(request.session_id).await {
        Ok(found) => found,
        Err(e) => {
            tracing::error!("failed to start a chat session: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to start session: {}", e),
                }),
            )
                .into_response();
        }
    };

    // Queries in one chat run one at a time; other chats are not blocked
    let answer = agent.lock().await.process_query(&request.query).await;

    (StatusCode::OK, Json(QueryResponse { session_id, answer })).into_response()
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{json_body, json_request, state};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_query_creates_and_continues_a_session() {
        let app = routes(state());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/query", json!({"query": "how many users?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = json_body(response).await;
        // persona + question
        assert_eq!(first["answer"], "2 entries, last: how many users?");

        let session_id = first["session_id"].as_str().unwrap().to_string();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/query",
                json!({"session_id": session_id, "query": "and today?"}),
            ))
            .await
            .unwrap();
        let second = json_body(response).await;
        assert_eq!(second["session_id"], first["session_id"]);
        assert_eq!(second["answer"], "4 entries, last: and today?");
    }

    #[tokio::test]
    async fn test_unknown_session_starts_fresh() {
        let app = routes(state());
        let unknown = Uuid::new_v4();

        let response = app
            .oneshot(json_request(
                "POST",
                "/query",
                json!({"session_id": unknown, "query": "hello"}),
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_ne!(body["session_id"], json!(unknown));
        assert_eq!(body["answer"], "2 entries, last: hello");
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let app = routes(state());
        let response = app
            .oneshot(json_request("POST", "/query", json!({"query": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
