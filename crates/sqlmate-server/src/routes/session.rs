use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ErrorResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
struct ClearRequest {
    session_id: Uuid,
}

fn not_found(id: &Uuid) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("Session '{}' not found", id),
        }),
    )
        .into_response()
}

async fn clear_history(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> impl IntoResponse {
    match state.get(&request.session_id).await {
        Some(agent) => {
            agent.lock().await.clear_history();
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(&request.session_id),
    }
}

async fn history(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    match state.get(&id).await {
        Some(agent) => Json(agent.lock().await.messages()).into_response(),
        None => not_found(&id),
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/clear", post(clear_history))
        .route("/history/:session_id", get(history))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::configure;
    use crate::routes::test_support::{json_body, json_request, state};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn history_request(id: &str) -> Request<Body> {
        Request::builder()
            .uri(format!("/history/{}", id))
            .method("GET")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_history_and_clear() {
        let app = configure(state());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/query", json!({"query": "list the tables"})))
            .await
            .unwrap();
        let id = json_body(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app.clone().oneshot(history_request(&id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let messages = json_body(response).await;
        let roles: Vec<&str> = messages
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(messages[1]["content"], "list the tables");

        let response = app
            .clone()
            .oneshot(json_request("POST", "/clear", json!({"session_id": id})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.clone().oneshot(history_request(&id)).await.unwrap();
        let messages = json_body(response).await;
        assert_eq!(messages.as_array().unwrap().len(), 1);
        assert_eq!(messages[0]["role"], "system");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let app = configure(state());
        let id = Uuid::new_v4().to_string();

        let response = app.clone().oneshot(history_request(&id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/clear", json!({"session_id": id})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
