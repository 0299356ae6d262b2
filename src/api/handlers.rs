use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::Json,
    Json as RequestJson,
};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ErrorKind, ProdhubError};
use crate::logic::{
    ArtifactSource, DeleteOutcome, RepositoryOperations, UserOperations, WriteCoordinator,
};
use crate::model::{
    Activity, AppendTarget, Id, NewRepository, Repository, RepositoryUpdate, UserContext, Version,
};

/// Everything a handler can reach. Built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub coordinator: WriteCoordinator,
    pub repositories: RepositoryOperations,
    pub users: UserOperations,
}

pub type AppState = Arc<AppServices>;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub partial: bool,
}

impl ErrorResponse {
    pub fn from_error(err: &ProdhubError) -> Self {
        match err {
            ProdhubError::Partial {
                source,
                compensation_error,
            } => Self {
                error: source.to_string(),
                code: err.code().to_string(),
                detail: Some(format!("compensation failed: {}", compensation_error)),
                partial: true,
            },
            other => Self {
                error: other.to_string(),
                code: other.code().to_string(),
                detail: None,
                partial: false,
            },
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Persist | ErrorKind::PartialFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Status and body for a domain error. A partial failure answers with the
/// status of the failure that started it.
pub fn error_response(err: ProdhubError) -> ApiError {
    let status = status_for(err.root().kind());
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else if err.is_partial() {
        warn!("Request failed with partial compensation: {}", err);
    }
    (status, Json(ErrorResponse::from_error(&err)))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    error_response(ProdhubError::Validation(message.into()))
}

/// Extractor rejections keep their 413; everything else is a bad request
fn rejected(status: StatusCode, body_text: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        error_response(ProdhubError::PayloadTooLarge)
    } else {
        bad_request(body_text)
    }
}

// ============================================================================
// Repositories
// ============================================================================

pub async fn create_repository(
    State(services): State<AppState>,
    user: UserContext,
    RequestJson(input): RequestJson<NewRepository>,
) -> Result<(StatusCode, Json<Repository>), ApiError> {
    match services.coordinator.create_repository(&user.user_id, input).await {
        Ok(repo) => Ok((StatusCode::CREATED, Json(repo))),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn list_public_repositories(
    State(services): State<AppState>,
) -> Result<Json<ListResponse<Repository>>, ApiError> {
    services
        .repositories
        .list_public_repositories()
        .await
        .map(|repos| Json(ListResponse::new(repos)))
        .map_err(error_response)
}

pub async fn get_repository(
    State(services): State<AppState>,
    Path(repo_id): Path<Id>,
) -> Result<Json<Repository>, ApiError> {
    services
        .repositories
        .get_repository(&repo_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn update_repository(
    State(services): State<AppState>,
    Path(repo_id): Path<Id>,
    RequestJson(update): RequestJson<RepositoryUpdate>,
) -> Result<Json<Repository>, ApiError> {
    services
        .repositories
        .update_repository(&repo_id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn delete_repository(
    State(services): State<AppState>,
    Path(repo_id): Path<Id>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    services
        .coordinator
        .delete_repository(&repo_id)
        .await
        .map(Json)
        .map_err(error_response)
}

pub async fn list_repository_versions(
    State(services): State<AppState>,
    user: UserContext,
    Path(repo_id): Path<Id>,
) -> Result<Json<ListResponse<Version>>, ApiError> {
    services
        .repositories
        .list_versions(&repo_id, &user.user_id)
        .await
        .map(|versions| Json(ListResponse::new(versions)))
        .map_err(error_response)
}

pub async fn add_repository_version(
    State(services): State<AppState>,
    Path(repo_id): Path<Id>,
    upload: VersionUpload,
) -> Result<(StatusCode, Json<Version>), ApiError> {
    append_version(&services, &repo_id, AppendTarget::Repository, upload).await
}

pub(crate) async fn append_version(
    services: &AppServices,
    repo_id: &str,
    target: AppendTarget,
    upload: VersionUpload,
) -> Result<(StatusCode, Json<Version>), ApiError> {
    match services
        .coordinator
        .add_version(repo_id, target, upload.source, upload.changes)
        .await
    {
        Ok(version) => Ok((StatusCode::CREATED, Json(version))),
        Err(e) => Err(error_response(e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivityRequest {
    pub description: String,
    /// Appends to this branch's activity list instead of the repository log
    #[serde(default)]
    pub branch: Option<String>,
}

pub async fn append_activity(
    State(services): State<AppState>,
    Path(repo_id): Path<Id>,
    RequestJson(request): RequestJson<ActivityRequest>,
) -> Result<(StatusCode, Json<Activity>), ApiError> {
    let target = match request.branch {
        Some(name) => AppendTarget::Branch(name),
        None => AppendTarget::Repository,
    };
    match services
        .repositories
        .append_activity(&repo_id, target, request.description)
        .await
    {
        Ok(activity) => Ok((StatusCode::CREATED, Json(activity))),
        Err(e) => Err(error_response(e)),
    }
}

// ============================================================================
// Version upload body
// ============================================================================

#[derive(Debug, Deserialize)]
struct VersionJson {
    url: String,
    #[serde(default)]
    changes: String,
}

/// Body of a version append: multipart with a `file` part, or JSON naming an
/// already-stored URL
#[derive(Debug)]
pub struct VersionUpload {
    pub source: ArtifactSource,
    pub changes: String,
}

#[async_trait]
impl<S> FromRequest<S> for VersionUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let RequestJson(body) = RequestJson::<VersionJson>::from_request(req, state)
                .await
                .map_err(|rejection| rejected(rejection.status(), rejection.body_text()))?;
            return Ok(Self {
                source: ArtifactSource::Url(body.url),
                changes: body.changes,
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| rejected(rejection.status(), rejection.body_text()))?;

        let mut upload = None;
        let mut url = None;
        let mut changes = String::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| rejected(e.status(), e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or("artifact").to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| rejected(e.status(), e.body_text()))?;
                    upload = Some(ArtifactSource::Upload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
                "changes" => {
                    changes = field
                        .text()
                        .await
                        .map_err(|e| rejected(e.status(), e.body_text()))?
                }
                "url" => {
                    url = Some(
                        field
                            .text()
                            .await
                            .map_err(|e| rejected(e.status(), e.body_text()))?,
                    )
                }
                _ => {}
            }
        }

        let source = upload
            .or_else(|| url.map(ArtifactSource::Url))
            .ok_or_else(|| bad_request("either a file or a url is required"))?;
        Ok(Self { source, changes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_error_statuses() {
        let cases = [
            (ProdhubError::OwnerNotFound("u".to_string()), StatusCode::NOT_FOUND),
            (ProdhubError::DuplicateBranchName("f".to_string()), StatusCode::CONFLICT),
            (ProdhubError::ProtectedBranch("main".to_string()), StatusCode::BAD_REQUEST),
            (ProdhubError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ProdhubError::PayloadTooLarge, StatusCode::PAYLOAD_TOO_LARGE),
            (ProdhubError::Forbidden("x".to_string()), StatusCode::FORBIDDEN),
            (ProdhubError::CounterUnavailable("x".to_string()), StatusCode::SERVICE_UNAVAILABLE),
            (
                ProdhubError::from_store("repository insert", StoreError::Persist("x".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            let (got, body) = error_response(err.clone());
            assert_eq!(got, status, "{}", err);
            assert_eq!(body.0.code, err.code());
            assert!(!body.0.partial);
        }
    }

    #[test]
    fn test_partial_failure_body() {
        let err = ProdhubError::Partial {
            source: Box::new(ProdhubError::from_store(
                "ledger update",
                StoreError::Unavailable("timeout".to_string()),
            )),
            compensation_error: "repository insert: store unavailable: gone".to_string(),
        };
        let (status, body) = error_response(err);

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.0.code, "STORE_UNAVAILABLE");
        assert!(body.0.partial);
        assert!(body.0.error.contains("ledger update"));
        assert!(body.0.detail.unwrap().contains("repository insert"));
    }
}
