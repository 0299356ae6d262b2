pub mod artifacts;
pub mod branch_ops;
pub mod coordinator;
pub mod credentials;
pub mod ids;
pub mod repo_ops;
pub mod saga;
pub mod user_ops;

pub use artifacts::*;
pub use branch_ops::*;
pub use coordinator::*;
pub use credentials::*;
pub use ids::*;
pub use repo_ops::*;
pub use saga::*;
pub use user_ops::*;
