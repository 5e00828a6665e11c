//! HTTP handlers. Each one translates a request into a single service call.

pub mod auth;
pub mod org;
pub mod team;
pub mod user;
