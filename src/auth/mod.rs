use crate::state::AppState;
use axum::Router;

pub mod claims;
pub mod clock;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod jwt;
#[cfg(test)]
pub(crate) mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod tokens;

pub use error::{CredentialError, ErrorKind};
pub use services::{CredentialService, OAuthProfile, ResetSettings};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
