//! Admission and status endpoints for info jobs.

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::Json;
use tracing::debug;
use uuid::Uuid;

use vinfo_core::{CreateInfoRequest, InfoJob};

use crate::error::{ApiError, ErrorBody};
use crate::AppState;

/// Decode the admission body. An empty body (or JSON `null`) is reported
/// separately from a malformed one.
fn parse_create_request(body: &[u8]) -> Result<CreateInfoRequest, ApiError> {
    let required = || ApiError::BadRequest("Request body is required".into());
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(required());
    }
    serde_json::from_slice::<Option<CreateInfoRequest>>(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?
        .ok_or_else(required)
}

fn validate_create_request(request: &CreateInfoRequest) -> Result<(), ApiError> {
    if request.video_path.trim().is_empty() {
        return Err(ApiError::BadRequest("video_path must not be empty".into()));
    }

    if let Some(uri) = &request.webhook_uri {
        let valid = uri.parse::<Uri>().is_ok_and(|parsed| {
            matches!(parsed.scheme_str(), Some("http") | Some("https"))
                && parsed.host().is_some_and(|host| !host.is_empty())
        });
        if !valid {
            return Err(ApiError::BadRequest(format!(
                "webhook_uri must be an absolute http or https URL: {:?}",
                uri
            )));
        }
    }
    Ok(())
}

/// Admit a new info job.
#[utoipa::path(
    post,
    path = "/info",
    tag = "Info",
    request_body = CreateInfoRequest,
    responses(
        (status = 201, description = "Info job admitted", body = InfoJob),
        (status = 400, description = "Missing, malformed or invalid body", body = ErrorBody),
        (status = 409, description = "UUID already admitted", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody)
    )
)]
pub async fn create_info(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<InfoJob>), ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;

    let request = parse_create_request(&body)?;
    validate_create_request(&request)?;

    debug!(uuid = %request.uuid, video_path = %request.video_path, "Admitting info job");
    let view = state.db.info.admit(request.into()).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Current status of an info job.
#[utoipa::path(
    get,
    path = "/info/{uuid}",
    tag = "Info",
    params(("uuid" = Uuid, Path, description = "UUID the job was admitted under")),
    responses(
        (status = 200, description = "Current job status", body = InfoJob),
        (status = 400, description = "Malformed UUID", body = ErrorBody),
        (status = 404, description = "No job admitted under this UUID", body = ErrorBody),
        (status = 500, description = "Internal error", body = ErrorBody)
    )
)]
pub async fn get_info_status(
    State(state): State<AppState>,
    uuid: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<InfoJob>, ApiError> {
    let Path(uuid) =
        uuid.map_err(|e| ApiError::BadRequest(format!("Invalid UUID: {}", e.body_text())))?;

    let view = state.db.info.status(uuid).await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(video_path: &str, webhook_uri: Option<&str>) -> CreateInfoRequest {
        CreateInfoRequest {
            uuid: Uuid::new_v4(),
            video_path: video_path.to_string(),
            webhook_uri: webhook_uri.map(str::to_string),
            webhook_token: None,
        }
    }

    #[test]
    fn test_empty_body_is_required() {
        for body in [&b""[..], b"  \n", b"null"] {
            let err = parse_create_request(body).unwrap_err();
            assert_eq!(err.to_string(), "Request body is required");
        }
    }

    #[test]
    fn test_malformed_body() {
        let err = parse_create_request(b"{\"uuid\": 42}").unwrap_err();
        assert!(err.to_string().starts_with("Invalid request body"));
    }

    #[test]
    fn test_parses_base64_token() {
        let uuid = Uuid::new_v4();
        let body = format!(
            r#"{{"uuid": "{}", "video_path": "/v.mp4", "webhook_uri": "https://hooks.example.com/x", "webhook_token": "c2VjcmV0"}}"#,
            uuid
        );
        let parsed = parse_create_request(body.as_bytes()).unwrap();
        assert_eq!(parsed.uuid, uuid);
        assert_eq!(parsed.webhook_token.as_deref(), Some(&b"secret"[..]));
    }

    #[test]
    fn test_validation() {
        assert!(validate_create_request(&request("/videos/a.mp4", None)).is_ok());
        assert!(validate_create_request(&request("/videos/a.mp4", Some("http://h:9/cb"))).is_ok());
        assert!(validate_create_request(&request("", None)).is_err());
        assert!(validate_create_request(&request("   ", None)).is_err());
        assert!(validate_create_request(&request("/v.mp4", Some("ftp://host/x"))).is_err());
        assert!(validate_create_request(&request("/v.mp4", Some("/relative/path"))).is_err());
        assert!(validate_create_request(&request("/v.mp4", Some("not a url"))).is_err());
    }
}
