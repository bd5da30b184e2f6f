//! In-memory [`CredentialStore`] used by the service and router tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::{CredentialStore, RepoError};
use crate::auth::repo_types::{MemberRole, NewUser, Organization, User};

#[derive(Default, Clone)]
struct Tables {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    members: Vec<(Uuid, Uuid, MemberRole)>,
}

/// Write inside `create_user_with_organization` that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertStep {
    Organization,
    Membership,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: Mutex<Tables>,
    fail_at: Mutex<Option<InsertStep>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next registration fail at `step`, after the earlier writes were staged.
    pub fn fail_next_insert_at(&self, step: InsertStep) {
        *self.fail_at.lock().unwrap() = Some(step);
    }

    fn take_failure(&self, step: InsertStep) -> Result<(), RepoError> {
        let mut fail_at = self.fail_at.lock().unwrap();
        if *fail_at == Some(step) {
            *fail_at = None;
            return Err(RepoError::Other(anyhow::anyhow!(
                "insert {step:?}: simulated failure"
            )));
        }
        Ok(())
    }

    pub fn user_count(&self) -> usize {
        self.tables.lock().unwrap().users.len()
    }

    pub fn organization_count(&self) -> usize {
        self.tables.lock().unwrap().organizations.len()
    }

    pub fn membership_count(&self) -> usize {
        self.tables.lock().unwrap().members.len()
    }

    pub fn organizations_owned_by(&self, user_id: Uuid) -> Vec<Organization> {
        self.tables
            .lock()
            .unwrap()
            .organizations
            .values()
            .filter(|o| o.owner_user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn role_of(&self, organization_id: Uuid, user_id: Uuid) -> Option<MemberRole> {
        self.tables
            .lock()
            .unwrap()
            .members
            .iter()
            .find(|(org, user, _)| *org == organization_id && *user == user_id)
            .map(|(_, _, role)| *role)
    }

    pub fn snapshot(&self, user_id: Uuid) -> Option<User> {
        self.tables.lock().unwrap().users.get(&user_id).cloned()
    }
}

fn token_is_live(user: &User, token: &str, now: OffsetDateTime) -> bool {
    user.reset_token.as_deref() == Some(token)
        && user.reset_token_expires_at.map_or(false, |exp| exp > now)
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        Ok(self.tables.lock().unwrap().users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_user_with_organization(
        &self,
        user: NewUser,
        organization_name: &str,
    ) -> Result<(User, Organization), RepoError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(RepoError::DuplicateEmail);
        }

        // Writes go to a copy that replaces the live tables only once every insert succeeded.
        let mut staged = tables.clone();
        let now = OffsetDateTime::now_utc();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            reset_token: None,
            reset_token_expires_at: None,
            email_verified_at: user.email_verified_at,
            image: user.image,
            created_at: now,
            updated_at: now,
        };
        staged.users.insert(created.id, created.clone());

        self.take_failure(InsertStep::Organization)?;
        let organization = Organization {
            id: Uuid::new_v4(),
            name: organization_name.to_string(),
            owner_user_id: created.id,
            created_at: now,
        };
        staged
            .organizations
            .insert(organization.id, organization.clone());

        self.take_failure(InsertStep::Membership)?;
        staged
            .members
            .push((organization.id, created.id, MemberRole::Owner));

        *tables = staged;
        Ok((created, organization))
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<Option<User>, RepoError> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.users.get_mut(&id).map(|u| {
            u.name = name.to_string();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<Option<User>, RepoError> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables.users.get_mut(&id).map(|u| {
            u.password_hash = Some(password_hash.to_string());
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(u) = tables.users.get_mut(&id) {
            u.reset_token = Some(token.to_string());
            u.reset_token_expires_at = Some(expires_at);
            u.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn find_user_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, RepoError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .values()
            .find(|u| token_is_live(u, token, now))
            .cloned())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<User>, RepoError> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .values_mut()
            .find(|u| token_is_live(u, token, now))
            .map(|u| {
                u.password_hash = Some(password_hash.to_string());
                u.reset_token = None;
                u.reset_token_expires_at = None;
                u.updated_at = OffsetDateTime::now_utc();
                u.clone()
            }))
    }

    async fn find_owned_organization(
        &self,
        owner_user_id: Uuid,
    ) -> Result<Option<Organization>, RepoError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .organizations
            .values()
            .find(|o| o.owner_user_id == owner_user_id)
            .cloned())
    }
}
