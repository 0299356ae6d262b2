use crate::api::handlers::{append_version, error_response, ApiError, AppState, VersionUpload};
use crate::model::{AppendTarget, Branch, Id, Version};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBranchRequest {
    pub name: String,
    /// Branch whose versions and activities are copied into the new one
    #[serde(default)]
    pub source_branch: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BranchDeleted {
    pub repo_id: Id,
    pub name: String,
}

/// POST /repo/{id}/branch
pub async fn create_branch(
    State(services): State<AppState>,
    Path(repo_id): Path<Id>,
    RequestJson(req): RequestJson<NewBranchRequest>,
) -> Result<(StatusCode, Json<Branch>), ApiError> {
    match services
        .repositories
        .create_branch(&repo_id, &req.name, req.source_branch.as_deref())
        .await
    {
        Ok(branch) => Ok((StatusCode::CREATED, Json(branch))),
        Err(e) => Err(error_response(e)),
    }
}

/// GET /repo/{id}/branch/{name}
pub async fn get_branch(
    State(services): State<AppState>,
    Path((repo_id, name)): Path<(Id, String)>,
) -> Result<Json<Branch>, ApiError> {
    services
        .repositories
        .get_branch(&repo_id, &name)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /repo/{id}/branch/{name}/switch
pub async fn switch_branch(
    State(services): State<AppState>,
    Path((repo_id, name)): Path<(Id, String)>,
) -> Result<Json<Branch>, ApiError> {
    services
        .repositories
        .switch_branch(&repo_id, &name)
        .await
        .map(Json)
        .map_err(error_response)
}

/// DELETE /repo/{id}/branch/{name}
pub async fn delete_branch(
    State(services): State<AppState>,
    Path((repo_id, name)): Path<(Id, String)>,
) -> Result<Json<BranchDeleted>, ApiError> {
    match services.repositories.delete_branch(&repo_id, &name).await {
        Ok(()) => Ok(Json(BranchDeleted { repo_id, name })),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /repo/{id}/branch/{name}/version
pub async fn add_branch_version(
    State(services): State<AppState>,
    Path((repo_id, name)): Path<(Id, String)>,
    upload: VersionUpload,
) -> Result<(StatusCode, Json<Version>), ApiError> {
    append_version(&services, &repo_id, AppendTarget::Branch(name), upload).await
}
