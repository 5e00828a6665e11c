pub mod account;
pub mod invitation;
pub mod membership;
pub mod organization;
pub mod team;

pub use account::{Account, AccountProfile, AccountResponse, PendingVerification};
pub use invitation::{hash_token, Invitation, InvitationResponse};
pub use membership::{MemberStatus, OrgRole, OrganizationMember};
pub use organization::Organization;
pub use team::{Team, TeamMember};
