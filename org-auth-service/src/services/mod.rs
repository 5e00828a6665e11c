//! Services layer: ports, their adapters, and the use cases built on them.

mod account_store;
pub mod auth;
pub mod authz;
pub mod csrf;
mod database;
mod email;
pub mod error;
mod events;
mod jwt;
mod membership_store;
pub mod organization;
pub mod policy;
pub mod team;

pub use account_store::{AccountStore, InMemoryAccountStore};
pub use auth::{AuthService, AuthSession, AuthSettings, RegisterInput};
pub use authz::{AuthorizationService, Permission, TeamAction};
pub use csrf::{CsrfService, CSRF_COOKIE, CSRF_HEADER};
pub use database::Database;
pub use email::{EmailNotifier, MockEmailService, SentEmail, SmtpEmailService};
pub use error::{ErrorKind, ServiceError};
pub use events::{BroadcastEventPublisher, DomainEvent, EventPublisher, NoopEventPublisher};
pub use jwt::{
    generate_random_token, AccessTokenClaims, IdentityClaims, JwtService, RefreshTokenClaims,
    TokenIssuer, TokenPair, VerifiedRefreshToken,
};
pub use membership_store::{InMemoryMembershipStore, MembershipStore};
pub use organization::{IssuedInvitation, OrganizationService};
pub use policy::{PolicyError, PolicyService};
pub use team::TeamService;
