pub mod signature;

pub use signature::{sign, verify};
