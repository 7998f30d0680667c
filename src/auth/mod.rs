//! Authentication module
//!
//! Password hashing, bearer token issuance and validation, and the
//! register/login orchestration built on top of them.

pub mod handlers;
pub mod middleware;
pub mod password;
pub mod service;
pub mod token;

pub use middleware::{AuthenticatedUser, RequireBearer};
pub use password::PasswordHasher;
pub use service::{AuthService, TokenPair};
pub use token::{TokenClaims, TokenError, TokenIssuer, TokenValidator, SIGNING_ALGORITHM};
