use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::jwt::AuthUser, state::AppState};

#[derive(Debug, Serialize)]
pub struct OrganizationSummary {
    pub id: Uuid,
    pub name: String,
}

pub fn organization_routes() -> Router<AppState> {
    Router::new().route("/organizations/owned", get(get_owned_organization))
}

/// The organization the caller owns, or `null`.
#[instrument(skip(state))]
pub async fn get_owned_organization(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Option<OrganizationSummary>>, (StatusCode, String)> {
    let organization = state.credentials.owned_organization(user_id).await?;
    Ok(Json(organization.map(|o| OrganizationSummary {
        id: o.id,
        name: o.name,
    })))
}
