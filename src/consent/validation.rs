use std::collections::BTreeSet;

use chrono::{DateTime, Months, Utc};

use crate::catalog::PermissionCatalog;
use crate::consent::errors::ConsentError;
use crate::consent::types::Permission;

/// Check a requested permission set against the catalog.
///
/// A code is only accepted when some group containing it was requested in
/// full, and codes from more than one customer profile never mix.
pub fn validate_permissions(
    catalog: &PermissionCatalog,
    requested: &[Permission],
) -> Result<(), ConsentError> {
    if requested.is_empty() {
        return Err(ConsentError::InvalidPermissionCombination);
    }

    if let Some(unknown) = requested.iter().find(|p| !catalog.contains(p)) {
        return Err(ConsentError::InvalidPermission(unknown.to_string()));
    }

    let requested_set: BTreeSet<&Permission> = requested.iter().collect();

    for permission in &requested_set {
        let covered = catalog
            .groups_containing(permission)
            .any(|group| group.permissions.iter().all(|p| requested_set.contains(p)));
        if !covered {
            tracing::debug!(permission = %permission, "No complete group covers permission");
            return Err(ConsentError::InvalidPermissionCombination);
        }
    }

    let touched_profiles = catalog
        .profiles()
        .iter()
        .filter(|profile| requested_set.iter().any(|p| profile.permissions.contains(*p)))
        .count();
    if touched_profiles > 1 {
        return Err(ConsentError::PersonalBusinessConflict);
    }

    Ok(())
}

/// The latest expiration a consent may carry when requested at `now`.
pub fn max_expiration(now: DateTime<Utc>) -> DateTime<Utc> {
    // Feb 29 + 1 year clamps to Feb 28
    now.checked_add_months(Months::new(12)).unwrap_or(now)
}

/// An expiration must fall within `[now, now + 1 year]`.
pub fn validate_expiration(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), ConsentError> {
    if expires_at < now || expires_at > max_expiration(now) {
        return Err(ConsentError::InvalidExpiration);
    }
    Ok(())
}

/// Authorization may only narrow the requested permissions to a non-empty subset.
pub fn validate_narrowing(
    requested: &[Permission],
    granted: &[Permission],
) -> Result<(), ConsentError> {
    if granted.is_empty() {
        return Err(ConsentError::InvalidPermission(
            "at least one permission must be granted".to_string(),
        ));
    }
    if let Some(extra) = granted.iter().find(|p| !requested.contains(p)) {
        return Err(ConsentError::InvalidPermission(format!(
            "{extra} was not requested"
        )));
    }
    Ok(())
}
