use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, RolesRepo, UsersRepo};
use crate::cache::{InvalidationCoordinator, InvalidationSet};
use crate::domain::entities::{RoleRecord, UserRecord};
use crate::domain::permissions::{ADMIN_ROLE, USER_ROLE, seeded_permissions, seeded_roles};

pub const MIN_PASSWORD_CHARS: usize = 6;

#[derive(Debug, Error)]
pub enum AdminUserError {
    #[error("{0}")]
    Validation(String),
    #[error("User already exists")]
    AlreadyExists,
    #[error("user not found")]
    UserNotFound,
    #[error("role `{0}` not found")]
    RoleNotFound(String),
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default)]
pub struct RegisterCommand {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct SetupAdminCommand {
    pub email: String,
    pub name: String,
    pub password: String,
    pub update_password: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupAdminOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Clone)]
pub struct AdminUserService {
    users: Arc<dyn UsersRepo>,
    roles: Arc<dyn RolesRepo>,
    invalidation: InvalidationCoordinator,
    bcrypt_cost: u32,
}

impl AdminUserService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        roles: Arc<dyn RolesRepo>,
        invalidation: InvalidationCoordinator,
    ) -> Self {
        Self {
            users,
            roles,
            invalidation,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Lower the hashing cost; only tests want this.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub async fn register(&self, command: RegisterCommand) -> Result<RegisteredUser, AdminUserError> {
        let (Some(name), Some(email), Some(password)) = (
            present(command.name),
            present(command.email),
            command.password.filter(|password| !password.is_empty()),
        ) else {
            return Err(AdminUserError::Validation(
                "Missing required fields".to_string(),
            ));
        };

        let email = normalize_email(&email)?;
        ensure_password(&password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AdminUserError::AlreadyExists);
        }

        let role_name = if self.users.count_users().await? == 0 {
            ADMIN_ROLE
        } else {
            USER_ROLE
        };
        let role = self.ensure_role(role_name).await?;
        let password_hash = self.hash(password).await?;

        let user = self
            .users
            .create_user(CreateUserParams {
                name,
                email,
                password_hash,
                role_id: Some(role.id),
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => AdminUserError::AlreadyExists,
                other => AdminUserError::Repo(other),
            })?;

        self.invalidation.apply(&InvalidationSet::for_users()).await;
        info!(target: "inkpost::admin", id = %user.id, role = %role.name, "user registered");

        Ok(RegisteredUser {
            id: user.id,
            name: user.name,
            email: user.email,
            role: role.name,
        })
    }

    pub async fn list(&self) -> Result<Vec<UserRecord>, AdminUserError> {
        self.users.list_users().await.map_err(AdminUserError::from)
    }

    pub async fn list_roles(&self) -> Result<Vec<RoleRecord>, AdminUserError> {
        self.roles.list_roles().await.map_err(AdminUserError::from)
    }

    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_name: &str,
    ) -> Result<UserRecord, AdminUserError> {
        let role = self
            .roles
            .find_by_name(role_name.trim())
            .await?
            .ok_or_else(|| AdminUserError::RoleNotFound(role_name.trim().to_string()))?;

        let user = self
            .users
            .set_role(user_id, role.id)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => AdminUserError::UserNotFound,
                other => AdminUserError::Repo(other),
            })?;

        self.invalidation.apply(&InvalidationSet::for_users()).await;
        info!(target: "inkpost::admin", %user_id, role = %role.name, "role assigned");
        Ok(user)
    }

    /// Create or refresh the built-in roles. Safe to run repeatedly.
    pub async fn seed_roles(&self) -> Result<Vec<RoleRecord>, AdminUserError> {
        let mut seeded = Vec::new();
        for seed in seeded_roles() {
            let role = self
                .roles
                .upsert_role(seed.name, &seed.permission_names())
                .await?;
            info!(
                target: "inkpost::admin",
                role = %role.name,
                permissions = role.permissions.len(),
                "role seeded"
            );
            seeded.push(role);
        }
        Ok(seeded)
    }

    pub async fn setup_admin(
        &self,
        command: SetupAdminCommand,
    ) -> Result<SetupAdminOutcome, AdminUserError> {
        self.seed_roles().await?;
        let admin = self.ensure_role(ADMIN_ROLE).await?;
        let email = normalize_email(&command.email)?;

        let outcome = match self.users.find_by_email(&email).await? {
            Some(existing) if command.update_password => {
                ensure_password(&command.password)?;
                let hash = self.hash(command.password).await?;
                self.users.set_password_hash(existing.id, &hash).await?;
                if existing.role_id != Some(admin.id) {
                    self.users.set_role(existing.id, admin.id).await?;
                }
                SetupAdminOutcome::Updated
            }
            Some(_) => SetupAdminOutcome::Unchanged,
            None => {
                let name = command.name.trim().to_string();
                if name.is_empty() {
                    return Err(AdminUserError::Validation("Name is required".to_string()));
                }
                ensure_password(&command.password)?;
                let password_hash = self.hash(command.password).await?;
                self.users
                    .create_user(CreateUserParams {
                        name,
                        email: email.clone(),
                        password_hash,
                        role_id: Some(admin.id),
                    })
                    .await?;
                SetupAdminOutcome::Created
            }
        };

        if outcome != SetupAdminOutcome::Unchanged {
            self.invalidation.apply(&InvalidationSet::for_users()).await;
        }
        info!(target: "inkpost::admin", %email, ?outcome, "admin account ready");
        Ok(outcome)
    }

    async fn ensure_role(&self, name: &str) -> Result<RoleRecord, AdminUserError> {
        if let Some(role) = self.roles.find_by_name(name).await? {
            return Ok(role);
        }
        let permissions = seeded_permissions(name).unwrap_or_default();
        Ok(self.roles.upsert_role(name, &permissions).await?)
    }

    async fn hash(&self, password: String) -> Result<String, AdminUserError> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|err| AdminUserError::Hash(err.to_string()))?
            .map_err(|err| AdminUserError::Hash(err.to_string()))
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn normalize_email(raw: &str) -> Result<String, AdminUserError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AdminUserError::Validation(
            "Email address is invalid".to_string(),
        )),
    }
}

fn ensure_password(password: &str) -> Result<(), AdminUserError> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AdminUserError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }
    Ok(())
}
