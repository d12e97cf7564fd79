use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::server::{
    app_state::SharedAppState,
    utils::server_utils::{handle_error, success, success_message},
};
use crate::services::types::{MiniProgramType, ProjectDescriptor};

pub fn routes(app_state: SharedAppState) -> Router<SharedAppState> {
    Router::new()
        .route("/get-project-list", get(get_project_list))
        .route("/update-version", post(update_version))
        .with_state(app_state)
}

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Projects API",
        version = "0.1.0",
        description = "Project discovery and version management"
    ),
    paths(
        get_project_list,
        update_version
    ),
    components(
        schemas(
            crate::services::types::ProjectDescriptor,
            crate::services::types::MiniProgramType,
        )
    ),
    tags(
        (name = "Projects", description = "Sub-project related endpoints")
    )
)]
pub struct ProjectsOpenApi;

#[derive(Debug, Deserialize)]
pub struct TypeQuery {
    #[serde(rename = "type")]
    pub mp_type: MiniProgramType,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVersionQuery {
    #[serde(rename = "type")]
    pub mp_type: MiniProgramType,
    pub version: Option<String>,
}

#[utoipa::path(
    tag = "Projects",
    get,
    path = "/api/get-project-list",
    responses(
        (status = 200, description = "List of buildable sub-projects", body = [ProjectDescriptor])
    ),
)]
pub async fn get_project_list(
    Query(query): Query<TypeQuery>,
    State(state): State<SharedAppState>,
) -> impl IntoResponse {
    match state.registry.list(query.mp_type) {
        Ok(projects) => Ok(success(projects)),
        Err(err) => Err(handle_error(err)),
    }
}

#[utoipa::path(
    tag = "Projects",
    post,
    path = "/api/update-version",
    responses(
        (status = 200, description = "Version rewritten, committed and pushed", body = Value)
    ),
)]
pub async fn update_version(
    Query(query): Query<UpdateVersionQuery>,
    State(state): State<SharedAppState>,
) -> impl IntoResponse {
    let Some(version) = query.version.filter(|v| !v.trim().is_empty()) else {
        return Err(handle_error(crate::error::OpsError::InvalidParam(
            "version must not be empty".to_string(),
        )));
    };

    match state.git.update_versions(query.mp_type, &version).await {
        Ok(()) => Ok(success_message(&format!("version updated to {}", version))),
        Err(err) => Err(handle_error(err)),
    }
}
