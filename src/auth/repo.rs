use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{MemberRole, NewUser, Organization, User};

const USER_COLUMNS: &str = "id, name, email, password_hash, reset_token, reset_token_expires_at, \
                            email_verified_at, image, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persistence for users and their organizations.
///
/// Multi-row writes are atomic: an implementation either applies all of them
/// or none.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;

    /// Inserts the user, its organization and the owner membership in one unit of work.
    async fn create_user_with_organization(
        &self,
        user: NewUser,
        organization_name: &str,
    ) -> Result<(User, Organization), RepoError>;

    async fn update_name(&self, id: Uuid, name: &str) -> Result<Option<User>, RepoError>;

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, RepoError>;

    /// Replaces any outstanding reset token for the user.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    /// Exact token match with `expires_at > now`.
    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, RepoError>;

    /// Sets the new hash and clears the token only if the token still matches
    /// and is unexpired at write time. `None` means nothing was written.
    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, RepoError>;

    async fn find_owned_organization(
        &self,
        owner_user_id: Uuid,
    ) -> Result<Option<Organization>, RepoError>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_user_insert_error(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() && db_err.constraint() == Some("users_email_key") {
            return RepoError::DuplicateEmail;
        }
    }
    RepoError::Other(anyhow::Error::new(e).context("insert user"))
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    async fn create_user_with_organization(
        &self,
        user: NewUser,
        organization_name: &str,
    ) -> Result<(User, Organization), RepoError> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let sql = format!(
            r#"
            INSERT INTO users (id, name, email, password_hash, image, email_verified_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.image)
            .bind(user.email_verified_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_user_insert_error)?;

        let organization = sqlx::query_as::<_, Organization>(
            r#"
            INSERT INTO organizations (id, name, owner_user_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, owner_user_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(organization_name)
        .bind(created.id)
        .fetch_one(&mut *tx)
        .await
        .context("insert organization")?;

        sqlx::query(
            r#"
            INSERT INTO organization_members (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(organization.id)
        .bind(created.id)
        .bind(MemberRole::Owner.as_str())
        .execute(&mut *tx)
        .await
        .context("insert owner membership")?;

        tx.commit().await.context("commit tx")?;
        Ok((created, organization))
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<Option<User>, RepoError> {
        let sql = format!(
            "UPDATE users SET name = $1, updated_at = now() WHERE id = $2 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(name)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("update name")?;
        Ok(user)
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, RepoError> {
        let sql = format!(
            "UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(password_hash)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("update password hash")?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            UPDATE users
               SET reset_token = $1, reset_token_expires_at = $2, updated_at = now()
             WHERE id = $3
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.db)
        .await
        .context("set reset token")?;
        Ok(())
    }

    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, RepoError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token = $1 AND reset_token_expires_at > $2"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.db)
            .await
            .context("find user by reset token")?;
        Ok(user)
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, RepoError> {
        // Single conditional UPDATE: a concurrent consumer re-evaluates the
        // WHERE clause after the first commits and matches nothing.
        let sql = format!(
            r#"
            UPDATE users
               SET password_hash = $1,
                   reset_token = NULL,
                   reset_token_expires_at = NULL,
                   updated_at = now()
             WHERE reset_token = $2 AND reset_token_expires_at > $3
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(password_hash)
            .bind(token)
            .bind(now)
            .fetch_optional(&self.db)
            .await
            .context("consume reset token")?;
        Ok(user)
    }

    async fn find_owned_organization(
        &self,
        owner_user_id: Uuid,
    ) -> Result<Option<Organization>, RepoError> {
        let organization = sqlx::query_as::<_, Organization>(
            r#"
            SELECT id, name, owner_user_id, created_at
              FROM organizations
             WHERE owner_user_id = $1
            "#,
        )
        .bind(owner_user_id)
        .fetch_optional(&self.db)
        .await
        .context("find owned organization")?;
        Ok(organization)
    }
}
