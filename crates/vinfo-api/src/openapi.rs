//! OpenAPI document, generated from the handler annotations.

use axum::http::header;
use axum::response::IntoResponse;
use utoipa::OpenApi;

use vinfo_core::{CreateInfoRequest, InfoJob, InfoStatus, VideoInfo};

use crate::error::{ApiError, ErrorBody};
use crate::handlers;
use crate::handlers::health::HealthResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Video Info API",
        description = "Asynchronous video metadata extraction with webhook notification"
    ),
    paths(
        handlers::info::create_info,
        handlers::info::get_info_status,
        handlers::health::health_check,
    ),
    components(schemas(
        CreateInfoRequest,
        InfoJob,
        InfoStatus,
        VideoInfo,
        ErrorBody,
        HealthResponse
    )),
    tags(
        (name = "Info", description = "Info job admission and status"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document as YAML.
pub async fn openapi_yaml() -> Result<impl IntoResponse, ApiError> {
    let yaml = ApiDoc::openapi()
        .to_yaml()
        .map_err(|e| ApiError::Internal(format!("Failed to render OpenAPI document: {}", e)))?;
    Ok(([(header::CONTENT_TYPE, "application/yaml")], yaml))
}
