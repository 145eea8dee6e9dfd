//! Pure state transitions. Nothing here touches the store or the clock.

use chrono::{DateTime, Duration, Utc};

use crate::consent::errors::ConsentError;
use crate::consent::types::{Consent, RejectedBy, RejectionInfo, RejectionReason, Status};

/// Apply the time-driven transitions to `consent` as seen at `now`.
///
/// Returns `Some(updated)` when the consent has gone stale and must be
/// persisted, `None` when it is already current.
pub fn normalize(
    consent: &Consent,
    now: DateTime<Utc>,
    awaiting_window: Duration,
) -> Option<Consent> {
    let info = match consent.status {
        Status::AwaitingAuthorization if now > consent.created_at + awaiting_window => {
            RejectionInfo::new(RejectedBy::User, RejectionReason::ConsentExpired)
        }
        Status::Authorized if consent.expires_at.is_some_and(|exp| now > exp) => {
            RejectionInfo::new(RejectedBy::Aspsp, RejectionReason::ConsentMaxDateReached)
        }
        _ => return None,
    };

    let mut updated = consent.clone();
    updated.status = Status::Rejected;
    updated.status_updated_at = now;
    updated.rejection = Some(info);
    Some(updated)
}

/// Move `consent` to `REJECTED`.
pub fn reject(
    consent: &mut Consent,
    info: RejectionInfo,
    now: DateTime<Utc>,
) -> Result<(), ConsentError> {
    if consent.is_rejected() {
        return Err(ConsentError::AlreadyRejected);
    }
    consent.status = Status::Rejected;
    consent.status_updated_at = now;
    consent.rejection = Some(info);
    Ok(())
}

/// Reason recorded when the customer deletes a consent.
pub fn deletion_reason(consent: &Consent) -> RejectionReason {
    if consent.is_authorized() {
        RejectionReason::CustomerManuallyRevoked
    } else {
        RejectionReason::CustomerManuallyRejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::types::ResourceBindings;
    use chrono::TimeZone;

    fn consent(status: Status, created_at: DateTime<Utc>) -> Consent {
        Consent {
            id: "urn:lodestar:n".into(),
            status,
            user_id: "76109277673".into(),
            business_id: None,
            client_id: "client-a".into(),
            permissions: vec!["RESOURCES_READ".into()],
            created_at,
            status_updated_at: created_at,
            expires_at: None,
            rejection: None,
            extensions: Vec::new(),
            resources: ResourceBindings::default(),
            version: 1,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_awaiting_consent_times_out_after_window() {
        let c = consent(Status::AwaitingAuthorization, t0());
        let window = Duration::hours(1);

        // Exactly at the boundary the consent is still current
        assert!(normalize(&c, t0() + window, window).is_none());

        let stale = normalize(&c, t0() + Duration::minutes(61), window).expect("stale");
        assert_eq!(stale.status, Status::Rejected);
        assert_eq!(
            stale.rejection,
            Some(RejectionInfo::new(RejectedBy::User, RejectionReason::ConsentExpired))
        );
        assert_eq!(stale.status_updated_at, t0() + Duration::minutes(61));
        assert_eq!(stale.version, c.version);
    }

    #[test]
    fn test_authorized_consent_expires() {
        let mut c = consent(Status::Authorized, t0());
        c.expires_at = Some(t0() + Duration::days(2));
        let window = Duration::hours(1);

        assert!(normalize(&c, t0() + Duration::days(2), window).is_none());
        let stale = normalize(&c, t0() + Duration::days(2) + Duration::seconds(1), window)
            .expect("stale");
        assert_eq!(
            stale.rejection,
            Some(RejectionInfo::new(
                RejectedBy::Aspsp,
                RejectionReason::ConsentMaxDateReached
            ))
        );

        c.expires_at = None;
        assert!(normalize(&c, t0() + Duration::days(900), window).is_none());
    }

    #[test]
    fn test_rejected_is_absorbing() {
        let mut c = consent(Status::AwaitingAuthorization, t0());
        let info = RejectionInfo::new(RejectedBy::Tpp, RejectionReason::InternalSecurityReason);
        reject(&mut c, info, t0()).unwrap();
        assert!(normalize(&c, t0() + Duration::days(10), Duration::hours(1)).is_none());
        assert!(matches!(
            reject(&mut c, info, t0()),
            Err(ConsentError::AlreadyRejected)
        ));
    }

    #[test]
    fn test_deletion_reason_depends_on_status() {
        assert_eq!(
            deletion_reason(&consent(Status::Authorized, t0())),
            RejectionReason::CustomerManuallyRevoked
        );
        assert_eq!(
            deletion_reason(&consent(Status::AwaitingAuthorization, t0())),
            RejectionReason::CustomerManuallyRejected
        );
    }
}
