// Export route modules
pub mod query;
pub mod session;

use axum::Router;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(query::routes(state.clone()))
        .merge(session::routes(state))
}
