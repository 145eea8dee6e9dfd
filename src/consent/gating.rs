use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::consent::types::Consent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Account,
    CreditCardAccount,
}

/// Whether a resource of a joint-account holder may be shown yet.
///
/// Accounts shared with other holders stay hidden until the grace period
/// after consent creation has elapsed, standing in for the co-holders'
/// approval. Everything else is visible immediately.
pub fn resource_visible(
    is_joint_subject: bool,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    grace: Duration,
) -> bool {
    !is_joint_subject || now >= created_at + grace
}

/// Subjects whose accounts are held jointly.
#[derive(Debug, Clone)]
pub struct JointAccounts {
    subjects: HashSet<String>,
    grace: Duration,
}

impl JointAccounts {
    pub fn new<I, S>(subjects: I, grace: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
            grace,
        }
    }

    pub fn none() -> Self {
        Self::new(Vec::<String>::new(), Duration::zero())
    }

    pub fn is_joint_subject(&self, user_id: &str) -> bool {
        self.subjects.contains(user_id)
    }

    pub fn is_visible(&self, consent: &Consent, kind: ResourceKind, now: DateTime<Utc>) -> bool {
        match kind {
            ResourceKind::Account => resource_visible(
                self.is_joint_subject(&consent.user_id),
                consent.created_at,
                now,
                self.grace,
            ),
            ResourceKind::CreditCardAccount => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::types::{ResourceBindings, Status};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_resource_visible_window() {
        let grace = Duration::seconds(30);
        assert!(!resource_visible(true, t0(), t0() + Duration::seconds(29), grace));
        assert!(resource_visible(true, t0(), t0() + Duration::seconds(30), grace));
        assert!(resource_visible(false, t0(), t0(), grace));
    }

    #[test]
    fn test_only_joint_accounts_are_gated() {
        let joint = JointAccounts::new(["96362357086"], Duration::seconds(30));
        let consent = Consent {
            id: "urn:lodestar:j".into(),
            status: Status::Authorized,
            user_id: "96362357086".into(),
            business_id: None,
            client_id: "client-a".into(),
            permissions: vec![],
            created_at: t0(),
            status_updated_at: t0(),
            expires_at: None,
            rejection: None,
            extensions: vec![],
            resources: ResourceBindings::default(),
            version: 1,
        };
        let now = t0() + Duration::seconds(5);

        assert!(!joint.is_visible(&consent, ResourceKind::Account, now));
        assert!(joint.is_visible(&consent, ResourceKind::CreditCardAccount, now));
        assert!(JointAccounts::none().is_visible(&consent, ResourceKind::Account, now));
    }
}
