use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OpsError;
use crate::server::{
    app_state::SharedAppState,
    utils::server_utils::{failure, handle_error, success, success_message},
};
use crate::services::orchestrator::Admission;
use crate::services::types::{MiniProgramType, StatusItem, UploadMode, UploadRecord};

pub fn routes(app_state: SharedAppState) -> Router<SharedAppState> {
    Router::new()
        .route("/upload-mini-program", get(upload_mini_program))
        .route("/get-upload-statuses", get(get_upload_statuses))
        .route("/get-upload-records", get(get_upload_records))
        .with_state(app_state)
}

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Uploads API",
        version = "0.1.0",
        description = "Build/upload triggering, status polling and history"
    ),
    paths(
        upload_mini_program,
        get_upload_statuses,
        get_upload_records
    ),
    components(
        schemas(
            crate::services::types::StatusItem,
            crate::services::types::UploadStatus,
            crate::services::types::UploadMode,
            crate::services::types::UploadRecord,
            crate::services::types::RecordStatus,
            RecordPage,
        )
    ),
    tags(
        (name = "Uploads", description = "Upload orchestration endpoints")
    )
)]
pub struct UploadsOpenApi;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub name: Option<String>,
    pub mode: Option<String>,
    #[serde(rename = "type")]
    pub mp_type: MiniProgramType,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "type")]
    pub mp_type: MiniProgramType,
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    #[serde(rename = "type")]
    pub mp_type: MiniProgramType,
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecordPage {
    pub list: Vec<UploadRecord>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

#[utoipa::path(
    tag = "Uploads",
    get,
    path = "/api/upload-mini-program",
    responses(
        (status = 200, description = "Upload finished or was queued", body = Value),
        (status = 400, description = "Missing or invalid name/mode", body = Value)
    ),
)]
pub async fn upload_mini_program(
    Query(query): Query<UploadQuery>,
    State(state): State<SharedAppState>,
) -> impl IntoResponse {
    let Some(name) = query.name.filter(|n| !n.trim().is_empty()) else {
        return Err(handle_error(OpsError::InvalidParam(
            "missing required parameter: name".to_string(),
        )));
    };
    let mode = match query.mode.as_deref() {
        Some("test") => UploadMode::Test,
        Some("pro") => UploadMode::Pro,
        _ => {
            return Err(handle_error(OpsError::InvalidParam(
                "missing required parameter: mode (test|pro)".to_string(),
            )))
        }
    };

    match state.orchestrator.request_upload(query.mp_type, &name, mode) {
        Ok(Admission::Started(handle)) => match handle.await {
            Ok(Ok(result)) => Ok(success(result)),
            Ok(Err(message)) => Ok(failure(&message)),
            Err(_) => Ok(failure("upload pipeline task failed")),
        },
        Ok(Admission::Queued) => Ok(success_message("all build slots busy, upload queued")),
        Ok(Admission::AlreadyActive) => Ok(success_message("upload already in progress")),
        Err(err) => Err(handle_error(err)),
    }
}

#[utoipa::path(
    tag = "Uploads",
    get,
    path = "/api/get-upload-statuses",
    responses(
        (status = 200, description = "Active upload statuses", body = [StatusItem])
    ),
)]
pub async fn get_upload_statuses(
    Query(query): Query<StatusQuery>,
    State(state): State<SharedAppState>,
) -> impl IntoResponse {
    let statuses = state.orchestrator.poll_statuses(query.mp_type);
    success(statuses)
}

#[utoipa::path(
    tag = "Uploads",
    get,
    path = "/api/get-upload-records",
    responses(
        (status = 200, description = "Paginated upload history", body = RecordPage)
    ),
)]
pub async fn get_upload_records(
    Query(query): Query<RecordsQuery>,
    State(state): State<SharedAppState>,
) -> impl IntoResponse {
    if let Some(name) = query.name.filter(|n| !n.trim().is_empty()) {
        let list = state.records.query_by_name(query.mp_type, &name).await;
        let total = list.len();
        return success(RecordPage {
            page: 1,
            size: total,
            total,
            list,
        });
    }

    let page = query.page.unwrap_or(1).max(1);
    let size = query.size.unwrap_or(10).max(1);
    let (list, total) = state.records.query(query.mp_type, page, size).await;
    success(RecordPage {
        list,
        page,
        size,
        total,
    })
}
