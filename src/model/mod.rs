pub mod common;
pub mod repository;
pub mod user;
pub mod user_context;

pub use common::*;
pub use repository::*;
pub use user::*;
pub use user_context::*;
