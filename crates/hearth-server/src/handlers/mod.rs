//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod audit;
pub mod categories;
pub mod reference;
pub mod splits;
pub mod transactions;
pub mod users;

// Re-export all handlers for use in router
pub use audit::*;
pub use categories::*;
pub use reference::*;
pub use splits::*;
pub use transactions::*;
pub use users::*;
