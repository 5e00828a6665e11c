pub mod auth;
pub mod csrf;

pub use auth::{auth_middleware, AuthUser};
pub use csrf::csrf_middleware;
