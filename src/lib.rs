//! RPG Vault backend library
//!
//! Exposes the store client, repositories and the HTTP router for use by the
//! binary and integration tests.

pub mod api;
pub mod auth;
pub mod characters;
pub mod config;
pub mod middleware;
pub mod objects;
pub mod services;
pub mod store;
pub mod validation;
pub mod worlds;

pub use api::{create_router, AppState};
pub use config::Config;
