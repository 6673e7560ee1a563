//! Authentication module
//!
//! Opaque bearer tokens, user accounts, permission codes and the middleware
//! that turns a request's `Authorization` header into an identity.

pub mod api;
pub mod middleware;
pub mod models;
pub mod permissions;
pub mod tokens;
pub mod user_store;

pub use api::AuthState;
pub use middleware::{authenticate, require_permission, CurrentUser, PermissionGate};
pub use models::{Identity, User};
pub use permissions::{PermissionRepository, PermissionSource, Permissions};
pub use tokens::{TokenScope, TokenStore};
pub use user_store::UserRepository;
