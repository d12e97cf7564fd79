use axum::{response::IntoResponse, routing::get, Json, Router};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::server::app_state::SharedAppState;

use super::api::{
    healthcheck::HealthCheckOpenApi, projects::ProjectsOpenApi, uploads::UploadsOpenApi,
};

#[derive(OpenApi)]
#[openapi(info(
    title = "mpship API",
    version = "0.1.0",
    description = "Mini-program build and upload console API"
))]
pub struct OpenApiDoc;

pub fn routes(app_state: SharedAppState) -> Router<SharedAppState> {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .merge(SwaggerUi::new("/swagger-ui").url("/docs/openapi.json", full_openapi()))
        .with_state(app_state)
}

fn full_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = OpenApiDoc::openapi();
    doc.merge(HealthCheckOpenApi::openapi());
    doc.merge(ProjectsOpenApi::openapi());
    doc.merge(UploadsOpenApi::openapi());
    doc
}

async fn openapi_json() -> impl IntoResponse {
    Json(full_openapi())
}
