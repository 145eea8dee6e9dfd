pub mod errors;
pub mod loader;
pub mod parser;
pub mod types;

pub use errors::CatalogError;
pub use loader::load_catalog;

use std::collections::BTreeSet;

use crate::consent::types::Permission;

/// Compiled permission catalog. Immutable after construction; shared by
/// reference with the consent engine.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    permissions: BTreeSet<Permission>,
    groups: Vec<PermissionGroup>,
    profiles: Vec<CustomerProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGroup {
    pub name: String,
    pub permissions: BTreeSet<Permission>,
}

impl PermissionGroup {
    pub fn contains(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerProfile {
    pub name: String,
    pub permissions: BTreeSet<Permission>,
}

impl PermissionCatalog {
    pub(crate) fn new(
        permissions: BTreeSet<Permission>,
        groups: Vec<PermissionGroup>,
        profiles: Vec<CustomerProfile>,
    ) -> Self {
        Self {
            permissions,
            groups,
            profiles,
        }
    }

    pub fn contains(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    pub fn groups(&self) -> &[PermissionGroup] {
        &self.groups
    }

    /// Groups that contain `permission`.
    pub fn groups_containing<'a>(
        &'a self,
        permission: &'a Permission,
    ) -> impl Iterator<Item = &'a PermissionGroup> + 'a {
        self.groups.iter().filter(move |g| g.contains(permission))
    }

    pub fn profiles(&self) -> &[CustomerProfile] {
        &self.profiles
    }
}
