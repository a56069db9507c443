//! HTTP 接口层

mod handlers;
mod middleware;
mod router;
pub mod types;

pub use middleware::{AppState, cors_layer};
pub use router::create_router;
