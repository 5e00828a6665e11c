//! service-core: Shared infrastructure for the organization auth services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod utils;

pub use axum;
pub use serde;
pub use tokio;
pub use tracing;
pub use validator;
