pub mod registration;
pub mod session;
pub mod social;

pub use registration::{register, resend_verification, verify_email};
pub use session::{login, logout, refresh, REFRESH_COOKIE};
pub use social::{google_callback, google_login};
