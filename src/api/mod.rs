pub mod branch_handlers;
pub mod handlers;
pub mod routes;
pub mod user_extractor;
pub mod user_handlers;

pub use handlers::{AppServices, AppState, ErrorResponse};
pub use routes::create_router;
