use axum::{
    extract::{FromRef, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, OAuthProvisionRequest,
            PasswordResetConfirm, PasswordResetRequest, PublicUser, RefreshRequest,
            RegisterRequest, SuccessResponse, UpdateNameRequest,
        },
        jwt::{AuthUser, JwtKeys},
        repo_types::User,
        tokens::secrets_match,
        OAuthProfile,
    },
    state::AppState,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub const PROVISION_SECRET_HEADER: &str = "x-provision-secret";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/password-reset/request", post(request_password_reset))
        .route("/auth/password-reset/confirm", post(confirm_password_reset))
        .route("/auth/oauth/provision", post(provision_oauth_user))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/name", patch(update_name))
        .route("/me/password", post(change_password))
}

fn session_for(state: &AppState, user: User) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(state);
    let pair = keys.issue_pair(user.id).map_err(|e| {
        error!(error = %e, "jwt sign failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
    })?;
    Ok(Json(AuthResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<AuthResponse> {
    let user = state
        .credentials
        .register(&payload.name, &payload.email, &payload.password)
        .await?;
    session_for(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let user = state
        .credentials
        .authenticate(&payload.email, &payload.password)
        .await?;
    info!(user_id = %user.id, "user logged in");
    session_for(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<AuthResponse> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        (StatusCode::UNAUTHORIZED, "Invalid or expired token".to_string())
    })?;

    let user = state.credentials.get_user(claims.sub).await.map_err(|e| {
        warn!(error = %e, user_id = %claims.sub, "refresh for missing user");
        (StatusCode::UNAUTHORIZED, "User not found".to_string())
    })?;
    session_for(&state, user)
}

#[instrument(skip(state, payload))]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> ApiResult<SuccessResponse> {
    state.credentials.request_password_reset(&payload.email).await?;
    Ok(Json(SuccessResponse::ok()))
}

#[instrument(skip(state, payload))]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> ApiResult<SuccessResponse> {
    state
        .credentials
        .confirm_password_reset(
            &payload.token,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Called by the identity provider after an OAuth sign-in. Finds or creates
/// the account (and its organization) and returns a session for it.
#[instrument(skip(state, headers, payload))]
pub async fn provision_oauth_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OAuthProvisionRequest>,
) -> ApiResult<AuthResponse> {
    let Some(expected) = state.config.oauth_provision_secret.as_deref() else {
        return Err((StatusCode::NOT_FOUND, "Not found".to_string()));
    };
    let presented = headers
        .get(PROVISION_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(presented, expected) {
        warn!("oauth provisioning with bad secret");
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid provisioning secret".to_string(),
        ));
    }

    let user = state
        .credentials
        .provision_oauth_user(OAuthProfile {
            email: payload.email,
            name: payload.name,
            image: payload.image,
            email_verified: payload.email_verified,
        })
        .await?;
    session_for(&state, user)
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<PublicUser> {
    let user = state.credentials.get_user(user_id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_name(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<UpdateNameRequest>,
) -> ApiResult<PublicUser> {
    let user = state.credentials.update_name(user_id, &payload.name).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<SuccessResponse> {
    if payload.new_password != payload.confirm_password {
        return Err((StatusCode::BAD_REQUEST, "Passwords do not match.".into()));
    }
    state
        .credentials
        .change_password(user_id, &payload.current_password, &payload.new_password)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}
