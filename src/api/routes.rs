use std::path::Path;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir};

use crate::api::{branch_handlers, handlers, user_handlers, AppState};
use crate::error::ProdhubError;

/// Path prefix uploaded artifacts are served under
pub const FILES_ROUTE: &str = "/files";

/// The body limit answers in plain text; give it the JSON error shape
async fn payload_too_large_as_json(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/json"))
        .unwrap_or(false);
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return handlers::error_response(ProdhubError::PayloadTooLarge).into_response();
    }
    response
}

/// All routes. Request bodies, uploads included, are capped at `max_body_bytes`.
/// When `files_dir` is given its contents are served at [`FILES_ROUTE`].
pub fn create_router(max_body_bytes: usize, files_dir: Option<&Path>) -> Router<AppState> {
    let router = Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Repositories
        .route("/repo/create", post(handlers::create_repository))
        .route("/repo/public", get(handlers::list_public_repositories))
        .route(
            "/repo/:id",
            get(handlers::get_repository)
                .put(handlers::update_repository)
                .delete(handlers::delete_repository),
        )
        .route("/repo/:id/versions", get(handlers::list_repository_versions))
        .route("/repo/:id/version", post(handlers::add_repository_version))
        .route("/repo/:id/activity", post(handlers::append_activity))
        // Branches
        .route("/repo/:id/branch", post(branch_handlers::create_branch))
        .route(
            "/repo/:id/branch/:name",
            get(branch_handlers::get_branch).delete(branch_handlers::delete_branch),
        )
        .route("/repo/:id/branch/:name/switch", get(branch_handlers::switch_branch))
        .route(
            "/repo/:id/branch/:name/version",
            post(branch_handlers::add_branch_version),
        )
        // Users
        .route("/auth/login", post(user_handlers::login))
        .route("/user/create", post(user_handlers::create_user))
        .route(
            "/user/:id",
            get(user_handlers::get_user).put(user_handlers::update_user),
        )
        .route("/user/:id/repos", get(user_handlers::list_user_repositories))
        .route(
            "/user/:id/repos/:repo_id/like",
            post(user_handlers::like_repository),
        )
        .route(
            "/user/:id/repos/:repo_id/unlike",
            post(user_handlers::unlike_repository),
        );

    let router = match files_dir {
        Some(dir) => router.nest_service(FILES_ROUTE, ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(middleware::map_response(payload_too_large_as_json))
}
