use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::server::app_state::SharedAppState;

pub mod api;
pub mod docs;

pub fn routes(app_state: SharedAppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .nest("/api", api::routes(app_state.clone()))
        .merge(docs::routes(app_state.clone()))
        .with_state(app_state)
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "mpship mini-program console server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
