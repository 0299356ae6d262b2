use crate::api::handlers::{error_response, ApiError, AppState, ListResponse};
use crate::model::{Id, LoginRequest, NewUser, Repository, User, UserContext, UserUpdate};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};

/// POST /user/create
pub async fn create_user(
    State(services): State<AppState>,
    RequestJson(input): RequestJson<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    match services.users.create_user(input).await {
        Ok(user) => Ok((StatusCode::CREATED, Json(user))),
        Err(e) => Err(error_response(e)),
    }
}

/// POST /auth/login
pub async fn login(
    State(services): State<AppState>,
    RequestJson(request): RequestJson<LoginRequest>,
) -> Result<Json<User>, ApiError> {
    services.users.login(request).await.map(Json).map_err(error_response)
}

/// GET /user/{id}
pub async fn get_user(
    State(services): State<AppState>,
    _caller: UserContext,
    Path(user_id): Path<Id>,
) -> Result<Json<User>, ApiError> {
    services.users.get_user(&user_id).await.map(Json).map_err(error_response)
}

/// PUT /user/{id}
pub async fn update_user(
    State(services): State<AppState>,
    caller: UserContext,
    Path(user_id): Path<Id>,
    RequestJson(update): RequestJson<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    services
        .users
        .update_user(&caller, &user_id, update)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /user/{id}/repos
pub async fn list_user_repositories(
    State(services): State<AppState>,
    _caller: UserContext,
    Path(user_id): Path<Id>,
) -> Result<Json<ListResponse<Repository>>, ApiError> {
    services
        .users
        .list_user_repositories(&user_id)
        .await
        .map(|repos| Json(ListResponse::new(repos)))
        .map_err(error_response)
}

/// POST /user/{id}/repos/{repo_id}/like
pub async fn like_repository(
    State(services): State<AppState>,
    _caller: UserContext,
    Path((user_id, repo_id)): Path<(Id, Id)>,
) -> Result<Json<User>, ApiError> {
    services
        .users
        .like_repository(&user_id, &repo_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /user/{id}/repos/{repo_id}/unlike
pub async fn unlike_repository(
    State(services): State<AppState>,
    _caller: UserContext,
    Path((user_id, repo_id)): Path<(Id, Id)>,
) -> Result<Json<User>, ApiError> {
    services
        .users
        .unlike_repository(&user_id, &repo_id)
        .await
        .map(Json)
        .map_err(error_response)
}
