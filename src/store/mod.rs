pub mod memory;
pub mod objects;
pub mod postgres;
pub mod traits;

pub use memory::*;
pub use objects::*;
pub use postgres::*;
pub use traits::*;
