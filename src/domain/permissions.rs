//! Permission catalogue and the roles seeded at setup.

use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CreatePost,
    EditPost,
    EditOwnPost,
    DeletePost,
    DeleteOwnPost,
    PublishPost,
    ViewDraftPost,
    CreateCategory,
    EditCategory,
    DeleteCategory,
    ViewUsers,
    CreateUser,
    EditUser,
    DeleteUser,
    AssignRoles,
    ViewRoles,
    CreateRole,
    EditRole,
    DeleteRole,
    ViewPermissions,
    CreatePermission,
    EditPermission,
    DeletePermission,
}

impl Permission {
    pub const ALL: [Permission; 23] = [
        Permission::CreatePost,
        Permission::EditPost,
        Permission::EditOwnPost,
        Permission::DeletePost,
        Permission::DeleteOwnPost,
        Permission::PublishPost,
        Permission::ViewDraftPost,
        Permission::CreateCategory,
        Permission::EditCategory,
        Permission::DeleteCategory,
        Permission::ViewUsers,
        Permission::CreateUser,
        Permission::EditUser,
        Permission::DeleteUser,
        Permission::AssignRoles,
        Permission::ViewRoles,
        Permission::CreateRole,
        Permission::EditRole,
        Permission::DeleteRole,
        Permission::ViewPermissions,
        Permission::CreatePermission,
        Permission::EditPermission,
        Permission::DeletePermission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::CreatePost => "create_post",
            Permission::EditPost => "edit_post",
            Permission::EditOwnPost => "edit_own_post",
            Permission::DeletePost => "delete_post",
            Permission::DeleteOwnPost => "delete_own_post",
            Permission::PublishPost => "publish_post",
            Permission::ViewDraftPost => "view_draft_post",
            Permission::CreateCategory => "create_category",
            Permission::EditCategory => "edit_category",
            Permission::DeleteCategory => "delete_category",
            Permission::ViewUsers => "view_users",
            Permission::CreateUser => "create_user",
            Permission::EditUser => "edit_user",
            Permission::DeleteUser => "delete_user",
            Permission::AssignRoles => "assign_roles",
            Permission::ViewRoles => "view_roles",
            Permission::CreateRole => "create_role",
            Permission::EditRole => "edit_role",
            Permission::DeleteRole => "delete_role",
            Permission::ViewPermissions => "view_permissions",
            Permission::CreatePermission => "create_permission",
            Permission::EditPermission => "edit_permission",
            Permission::DeletePermission => "delete_permission",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown permission `{0}`")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|permission| permission.as_str() == value)
            .ok_or_else(|| UnknownPermission(value.to_string()))
    }
}

pub const ADMIN_ROLE: &str = "admin";
pub const EDITOR_ROLE: &str = "editor";
pub const AUTHOR_ROLE: &str = "author";
pub const USER_ROLE: &str = "user";

/// A role created or refreshed by `seed-roles`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRole {
    pub name: &'static str,
    pub permissions: Vec<Permission>,
}

impl SeedRole {
    pub fn permission_names(&self) -> Vec<String> {
        self.permissions
            .iter()
            .map(|permission| permission.as_str().to_string())
            .collect()
    }
}

pub fn seeded_roles() -> Vec<SeedRole> {
    use Permission::*;

    let admin = Permission::ALL
        .into_iter()
        .filter(|permission| !matches!(permission, EditOwnPost | DeleteOwnPost))
        .collect();

    vec![
        SeedRole {
            name: ADMIN_ROLE,
            permissions: admin,
        },
        SeedRole {
            name: EDITOR_ROLE,
            permissions: vec![
                CreatePost,
                EditPost,
                DeletePost,
                PublishPost,
                ViewDraftPost,
                CreateCategory,
                EditCategory,
            ],
        },
        SeedRole {
            name: AUTHOR_ROLE,
            permissions: vec![CreatePost, EditOwnPost, DeleteOwnPost, ViewDraftPost],
        },
        SeedRole {
            name: USER_ROLE,
            permissions: Vec::new(),
        },
    ]
}

/// Permissions granted to a seeded role, if the name is one of them.
pub fn seeded_permissions(role: &str) -> Option<Vec<String>> {
    seeded_roles()
        .into_iter()
        .find(|seed| seed.name == role)
        .map(|seed| seed.permission_names())
}
