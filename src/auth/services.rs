use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        clock::Clock,
        error::CredentialError,
        password::{hash_password_blocking, verify_password_blocking},
        repo::{CredentialStore, RepoError},
        repo_types::{NewUser, Organization, User},
        tokens::{generate_reset_token, reset_link},
    },
    email::ResetMailer,
    organizations::derive_organization_name,
};

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_name(name: &str) -> Result<String, CredentialError> {
    let name = name.trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(CredentialError::validation(
            "Name must be at least 2 characters long",
        ));
    }
    Ok(name.to_string())
}

/// Display name for an OAuth account: the IdP name, else the email local part,
/// else the whole address, taking the first that passes `validate_name`.
fn oauth_display_name(profile_name: Option<&str>, email: &str) -> String {
    profile_name
        .and_then(|n| validate_name(n).ok())
        .or_else(|| {
            email
                .split('@')
                .next()
                .and_then(|local| validate_name(local).ok())
        })
        .unwrap_or_else(|| email.to_string())
}

fn validate_password(password: &str) -> Result<(), CredentialError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialError::validation(
            "Password must be at least 8 characters long",
        ));
    }
    Ok(())
}

/// Where reset links point and how long their tokens live.
#[derive(Debug, Clone)]
pub struct ResetSettings {
    pub base_url: String,
    pub ttl: Duration,
}

/// Identity handed over by the external OAuth provider on first sign-in.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub email_verified: bool,
}

/// Registration, login, account changes and the password-reset token lifecycle.
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    mailer: Arc<dyn ResetMailer>,
    clock: Arc<dyn Clock>,
    reset: ResetSettings,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        mailer: Arc<dyn ResetMailer>,
        clock: Arc<dyn Clock>,
        reset: ResetSettings,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            reset,
        }
    }

    /// Creates the user and its organization (owner membership included) atomically.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<User, CredentialError> {
        let name = validate_name(name)?;
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!("invalid email");
            return Err(CredentialError::validation("Invalid email address"));
        }
        validate_password(password)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            warn!("email already registered");
            return Err(RepoError::DuplicateEmail.into());
        }

        let password_hash = hash_password_blocking(password.to_owned()).await?;
        let organization_name = derive_organization_name(&name);
        let (user, organization) = self
            .store
            .create_user_with_organization(
                NewUser {
                    name,
                    email,
                    password_hash: Some(password_hash),
                    image: None,
                    email_verified_at: None,
                },
                &organization_name,
            )
            .await?;

        info!(
            user_id = %user.id,
            organization_id = %organization.id,
            organization = %organization.name,
            "user registered"
        );
        Ok(user)
    }

    /// Credential login. Every failure is the same `InvalidCredentials`.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, CredentialError> {
        let email = normalize_email(email);

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            warn!("login unknown email");
            return Err(CredentialError::InvalidCredentials);
        };

        let Some(hash) = user.password_hash.clone() else {
            warn!(user_id = %user.id, "login on account without password");
            return Err(CredentialError::InvalidCredentials);
        };

        if !verify_password_blocking(password.to_owned(), hash).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(CredentialError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user authenticated");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, user_id: Uuid) -> Result<User, CredentialError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| CredentialError::NotFound("User not found".into()))
    }

    #[instrument(skip(self, new_name))]
    pub async fn update_name(&self, user_id: Uuid, new_name: &str) -> Result<User, CredentialError> {
        let name = validate_name(new_name)?;
        let user = self
            .store
            .update_name(user_id, &name)
            .await?
            .ok_or_else(|| CredentialError::NotFound("User not found".into()))?;
        info!(user_id = %user.id, "name updated");
        Ok(user)
    }

    #[instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), CredentialError> {
        validate_password(new_password)?;

        let not_found = || CredentialError::NotFound("User not found or password not set.".into());
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(not_found)?;
        let hash = user.password_hash.ok_or_else(not_found)?;

        if !verify_password_blocking(current_password.to_owned(), hash).await? {
            warn!(%user_id, "change password with wrong current password");
            return Err(CredentialError::InvalidCredentials);
        }

        let new_hash = hash_password_blocking(new_password.to_owned()).await?;
        self.store
            .update_password_hash(user_id, &new_hash)
            .await?
            .ok_or_else(not_found)?;
        info!(%user_id, "password changed");
        Ok(())
    }

    /// Always succeeds from the caller's point of view, whether or not the
    /// email belongs to an account and whether or not the mail went out.
    #[instrument(skip_all)]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), CredentialError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Ok(());
        }

        let Some(user) = self.store.find_user_by_email(&email).await? else {
            info!("password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_reset_token();
        let expires_at = self.clock.now() + self.reset.ttl;
        if let Err(e) = self.store.set_reset_token(user.id, &token, expires_at).await {
            error!(user_id = %user.id, error = %e, "storing reset token failed");
            return Ok(());
        }

        let link = reset_link(&self.reset.base_url, &token);
        match self.mailer.send_reset(&user.email, &link).await {
            Ok(()) => info!(user_id = %user.id, "password reset email sent"),
            Err(e) => error!(user_id = %user.id, error = %format!("{e:#}"), "password reset email failed"),
        }
        Ok(())
    }

    /// Consumes a reset token. The token is single-use: the hash update and the
    /// token clear happen in one conditional write.
    #[instrument(skip_all)]
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), CredentialError> {
        if new_password != confirm_password {
            return Err(CredentialError::validation("Passwords do not match."));
        }
        validate_password(new_password)?;
        if token.is_empty() {
            return Err(CredentialError::InvalidOrExpiredToken);
        }

        if self
            .store
            .find_user_by_reset_token(token, self.clock.now())
            .await?
            .is_none()
        {
            warn!("reset confirm with unknown or expired token");
            return Err(CredentialError::InvalidOrExpiredToken);
        }

        let new_hash = hash_password_blocking(new_password.to_owned()).await?;
        match self
            .store
            .consume_reset_token(token, self.clock.now(), &new_hash)
            .await?
        {
            Some(user) => {
                info!(user_id = %user.id, "password reset completed");
                Ok(())
            }
            None => {
                warn!("reset token consumed or expired before write");
                Err(CredentialError::InvalidOrExpiredToken)
            }
        }
    }

    /// First-sign-in hook for OAuth identities: returns the existing account
    /// for the email or creates a password-less one with its organization.
    #[instrument(skip_all, fields(email = %profile.email))]
    pub async fn provision_oauth_user(&self, profile: OAuthProfile) -> Result<User, CredentialError> {
        let email = normalize_email(&profile.email);
        if !is_valid_email(&email) {
            return Err(CredentialError::validation("Invalid email address"));
        }

        if let Some(existing) = self.store.find_user_by_email(&email).await? {
            return Ok(existing);
        }

        let name = oauth_display_name(profile.name.as_deref(), &email);
        let organization_name = derive_organization_name(&name);
        let email_verified_at = profile.email_verified.then(|| self.clock.now());

        let created = self
            .store
            .create_user_with_organization(
                NewUser {
                    name,
                    email: email.clone(),
                    password_hash: None,
                    image: profile.image,
                    email_verified_at,
                },
                &organization_name,
            )
            .await;

        match created {
            Ok((user, organization)) => {
                info!(user_id = %user.id, organization_id = %organization.id, "oauth user provisioned");
                Ok(user)
            }
            // Lost a race with a concurrent first sign-in for the same email.
            Err(RepoError::DuplicateEmail) => self
                .store
                .find_user_by_email(&email)
                .await?
                .ok_or_else(|| CredentialError::Internal(anyhow::anyhow!("user vanished after duplicate insert"))),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn owned_organization(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Organization>, CredentialError> {
        Ok(self.store.find_owned_organization(user_id).await?)
    }
}
