use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::catalog::errors::CatalogError;
use crate::catalog::parser::parse_kdl_document;
use crate::catalog::types::*;
use crate::catalog::{CustomerProfile, PermissionCatalog, PermissionGroup};
use crate::consent::types::Permission;

/// Catalog compiled into the binary, used when no `consent.catalog_path` is configured.
pub const DEFAULT_CATALOG: &str = include_str!("../../catalog/open_finance.kdl");

/// Load the permission catalog from `path`, or the built-in Open Finance
/// catalog when no path is given.
pub fn load_catalog(path: Option<&Path>) -> Result<PermissionCatalog, CatalogError> {
    let (source, origin) = match path {
        Some(path) => {
            let contents =
                std::fs::read_to_string(path).map_err(|source| CatalogError::LoadError {
                    path: path.display().to_string(),
                    source,
                })?;
            (contents, path.display().to_string())
        }
        None => (DEFAULT_CATALOG.to_string(), "built-in".to_string()),
    };

    let parsed = parse_kdl_document(&source)?;
    let catalog = compile_catalog(vec![parsed])?;

    tracing::info!(
        origin = %origin,
        permissions = catalog.permissions().count(),
        groups = catalog.groups().len(),
        profiles = catalog.profiles().len(),
        "Loaded permission catalog"
    );

    Ok(catalog)
}

/// Merge and compile parsed catalog documents. Later documents override
/// groups and profiles of the same name.
pub fn compile_catalog(parsed: Vec<ParsedCatalog>) -> Result<PermissionCatalog, CatalogError> {
    let mut permissions: BTreeSet<Permission> = BTreeSet::new();
    let mut groups: BTreeMap<String, GroupDef> = BTreeMap::new();
    let mut profiles: BTreeMap<String, ProfileDef> = BTreeMap::new();

    for p in parsed {
        permissions.extend(p.permissions.into_iter().map(Permission::new));
        for group in p.groups {
            groups.insert(group.name.clone(), group);
        }
        for profile in p.profiles {
            profiles.insert(profile.name.clone(), profile);
        }
    }

    if permissions.is_empty() {
        return Err(CatalogError::InvalidCatalog(
            "catalog does not declare any permission".into(),
        ));
    }

    let groups = groups
        .into_values()
        .map(|g| {
            let members = resolve(&permissions, &g.permissions, || format!("group `{}`", g.name))?;
            Ok(PermissionGroup {
                name: g.name,
                permissions: members,
            })
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;

    let profiles = profiles
        .into_values()
        .map(|p| {
            let members =
                resolve(&permissions, &p.permissions, || format!("profile `{}`", p.name))?;
            Ok(CustomerProfile {
                name: p.name,
                permissions: members,
            })
        })
        .collect::<Result<Vec<_>, CatalogError>>()?;

    // Every declared permission must be requestable through some group
    for permission in &permissions {
        if !groups.iter().any(|g| g.contains(permission)) {
            return Err(CatalogError::InvalidCatalog(format!(
                "permission `{permission}` does not belong to any group"
            )));
        }
    }

    Ok(PermissionCatalog::new(permissions, groups, profiles))
}

fn resolve(
    declared: &BTreeSet<Permission>,
    codes: &[String],
    owner: impl Fn() -> String,
) -> Result<BTreeSet<Permission>, CatalogError> {
    codes
        .iter()
        .map(|code| {
            let permission = Permission::new(code.as_str());
            if declared.contains(&permission) {
                Ok(permission)
            } else {
                Err(CatalogError::UndefinedPermission {
                    permission: code.clone(),
                    owner: owner(),
                })
            }
        })
        .collect()
}
