use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::catalog::PermissionCatalog;
use crate::clock::{truncate_to_seconds, Clock};
use crate::consent::errors::{ConsentError, ExtensionDenial};
use crate::consent::gating::JointAccounts;
use crate::consent::lifecycle::{self, normalize};
use crate::consent::page::{paginate, Page, Pagination};
use crate::consent::types::*;
use crate::consent::validation::{validate_expiration, validate_narrowing, validate_permissions};
use crate::errors::StoreError;
use crate::storage::{random_id, ConsentStore};

/// How many times a mutation is re-applied after losing a version race.
pub const MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Middle segment of generated ids: `urn:<namespace>:<random>`.
    pub id_namespace: String,
    pub awaiting_authorization_window: Duration,
    pub revalidate_narrowed_permissions: bool,
    pub joint_accounts: JointAccounts,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            id_namespace: "lodestar".to_string(),
            awaiting_authorization_window: Duration::hours(1),
            revalidate_narrowed_permissions: false,
            joint_accounts: JointAccounts::none(),
        }
    }
}

/// Result of one pass over the non-rejected consents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// The consent state machine.
///
/// Every read goes through [`ConsentEngine::consent`], which applies the
/// time-driven transitions and persists them before the record is used.
/// Mutations re-read, re-apply and retry when the store reports a version
/// conflict, so the stored state is always some serial order of the calls.
#[derive(Clone)]
pub struct ConsentEngine {
    store: Arc<dyn ConsentStore>,
    clock: Arc<dyn Clock>,
    catalog: Arc<PermissionCatalog>,
    options: Arc<EngineOptions>,
}

impl ConsentEngine {
    pub fn new(
        store: Arc<dyn ConsentStore>,
        clock: Arc<dyn Clock>,
        catalog: Arc<PermissionCatalog>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            clock,
            catalog,
            options: Arc::new(options),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn joint_accounts(&self) -> &JointAccounts {
        &self.options.joint_accounts
    }

    /// Open a new consent in `AWAITING_AUTHORISATION`.
    pub async fn create(&self, draft: ConsentDraft) -> Result<Consent, ConsentError> {
        let now = self.now();
        let permissions = dedup_permissions(draft.permissions);
        let expires_at = draft.expires_at.map(truncate_to_seconds);

        if let Err(err) = validate_permissions(&self.catalog, &permissions) {
            debug!(client_id = %draft.client_id, error = %err, "Rejected consent request");
            return Err(err);
        }
        if let Some(expires_at) = expires_at {
            validate_expiration(expires_at, now)?;
        }

        let mut consent = Consent {
            id: format!("urn:{}:{}", self.options.id_namespace, random_id()),
            status: Status::AwaitingAuthorization,
            user_id: draft.user_id,
            business_id: draft.business_id,
            client_id: draft.client_id,
            permissions,
            created_at: now,
            status_updated_at: now,
            expires_at,
            rejection: None,
            extensions: Vec::new(),
            resources: ResourceBindings::default(),
            version: 0,
        };
        consent.version = self.store.put(&consent).await?;

        info!(
            consent_id = %consent.id,
            client_id = %consent.client_id,
            status = %consent.status,
            "Consent created"
        );
        Ok(consent)
    }

    /// Fetch a consent, bringing it up to date first.
    ///
    /// When `caller` is given it must be the client that created the consent.
    pub async fn consent(&self, id: &str, caller: Option<&str>) -> Result<Consent, ConsentError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let consent = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| ConsentError::NotFound(id.to_string()))?;

            if caller.is_some_and(|client_id| client_id != consent.client_id) {
                return Err(ConsentError::AccessDenied);
            }

            let Some(mut updated) =
                normalize(&consent, self.now(), self.options.awaiting_authorization_window)
            else {
                return Ok(consent);
            };

            match self.store.put(&updated).await {
                Ok(version) => {
                    updated.version = version;
                    info!(
                        consent_id = %updated.id,
                        status = %updated.status,
                        reason = updated.rejection.map(|r| r.reason.as_str()).unwrap_or_default(),
                        "Consent rejected on read"
                    );
                    return Ok(updated);
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(consent_id = %id, attempt, "Version conflict while normalizing");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(consent_id = %id, "Giving up after repeated version conflicts");
        Err(ConsentError::Contention(id.to_string()))
    }

    /// Record the user's approval.
    pub async fn authorize(
        &self,
        id: &str,
        grant: AuthorizationGrant,
    ) -> Result<Consent, ConsentError> {
        let consent = self
            .modify(id, None, |consent, now| {
                if !consent.is_awaiting_authorization() {
                    return Err(ConsentError::InvalidStatusTransition {
                        from: consent.status,
                        to: Status::Authorized,
                    });
                }

                let granted = match &grant.permissions {
                    Some(narrowed) => dedup_permissions(narrowed.clone()),
                    None => consent.permissions.clone(),
                };
                validate_narrowing(&consent.permissions, &granted)?;
                if self.options.revalidate_narrowed_permissions {
                    validate_permissions(&self.catalog, &granted)?;
                }

                consent.status = Status::Authorized;
                consent.status_updated_at = now;
                consent.permissions = granted;
                consent.resources = grant.resources.clone();
                Ok(())
            })
            .await?;

        info!(consent_id = %consent.id, status = %consent.status, "Consent authorized");
        Ok(consent)
    }

    pub async fn reject(
        &self,
        id: &str,
        caller: Option<&str>,
        info: RejectionInfo,
    ) -> Result<Consent, ConsentError> {
        let consent = self
            .modify(id, caller, |consent, now| lifecycle::reject(consent, info, now))
            .await?;

        info!(
            consent_id = %consent.id,
            rejected_by = info.rejected_by.as_str(),
            reason = info.reason.as_str(),
            "Consent rejected"
        );
        Ok(consent)
    }

    /// Customer-initiated removal. The record stays as a `REJECTED` tombstone.
    pub async fn delete(&self, id: &str, caller: Option<&str>) -> Result<Consent, ConsentError> {
        let consent = self
            .modify(id, caller, |consent, now| {
                let reason = lifecycle::deletion_reason(consent);
                lifecycle::reject(consent, RejectionInfo::new(RejectedBy::User, reason), now)
            })
            .await?;

        info!(consent_id = %consent.id, "Consent deleted");
        Ok(consent)
    }

    /// Push back (or remove) the expiration of an authorized consent.
    pub async fn extend(
        &self,
        id: &str,
        caller: Option<&str>,
        request: ExtensionRequest,
    ) -> Result<Consent, ConsentError> {
        let requested_expiry = request.expires_at.map(truncate_to_seconds);
        let consent = self
            .modify(id, caller, |consent, now| {
                if !consent.is_authorized() {
                    return Err(ConsentError::ExtensionNotAllowed(ExtensionDenial::NotAuthorised));
                }

                let requester = &request.requester;
                let business_mismatch = consent
                    .business_id
                    .as_ref()
                    .is_some_and(|b| requester.business_id.as_ref() != Some(b));
                if requester.user_id != consent.user_id || business_mismatch {
                    return Err(ConsentError::ExtensionNotAllowed(
                        ExtensionDenial::IdentityMismatch,
                    ));
                }

                if self.options.joint_accounts.is_joint_subject(&consent.user_id) {
                    return Err(ConsentError::ExtensionNotAllowedJointAccount);
                }

                if let Some(expires_at) = requested_expiry {
                    validate_expiration(expires_at, now)?;
                    if consent.expires_at.is_some_and(|current| expires_at <= current) {
                        return Err(ConsentError::InvalidExpiration);
                    }
                }

                let extension = Extension {
                    expires_at: requested_expiry,
                    previous_expires_at: consent.expires_at,
                    user_id: requester.user_id.clone(),
                    business_id: requester.business_id.clone(),
                    requested_at: now,
                    customer_ip: request.customer_ip.clone(),
                    customer_user_agent: request.customer_user_agent.clone(),
                };
                consent.expires_at = requested_expiry;
                consent.extensions.insert(0, extension);
                Ok(())
            })
            .await?;

        info!(
            consent_id = %consent.id,
            extensions = consent.extensions.len(),
            "Consent extended"
        );
        Ok(consent)
    }

    /// Extension history, most recent first.
    pub async fn extensions(
        &self,
        id: &str,
        caller: Option<&str>,
        pagination: Pagination,
    ) -> Result<Page<Extension>, ConsentError> {
        let consent = self.consent(id, caller).await?;
        Ok(paginate(&consent.extensions, pagination))
    }

    /// Normalize every consent that is not rejected yet.
    pub async fn sweep(&self) -> Result<SweepReport, ConsentError> {
        let ids = self.store.non_rejected_ids().await?;
        let mut report = SweepReport::default();

        for id in ids {
            report.examined += 1;
            match self.consent(&id, None).await {
                Ok(consent) if consent.is_rejected() => report.rejected += 1,
                Ok(_) => {}
                // Deleted or rejected between listing and reading
                Err(ConsentError::NotFound(_)) => {}
                Err(err) => {
                    warn!(consent_id = %id, error = %err, "Sweep could not normalize consent");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Read through `consent`, apply `change`, write back. Repeats from the
    /// read when another writer got there first.
    async fn modify<F>(
        &self,
        id: &str,
        caller: Option<&str>,
        mut change: F,
    ) -> Result<Consent, ConsentError>
    where
        F: FnMut(&mut Consent, DateTime<Utc>) -> Result<(), ConsentError> + Send,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            let mut consent = self.consent(id, caller).await?;
            change(&mut consent, self.now())?;

            match self.store.put(&consent).await {
                Ok(version) => {
                    consent.version = version;
                    return Ok(consent);
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(consent_id = %id, attempt, "Version conflict, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        warn!(consent_id = %id, "Giving up after repeated version conflicts");
        Err(ConsentError::Contention(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_catalog;
    use crate::clock::ManualClock;
    use crate::storage::MemoryConsentStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const USER: &str = "76109277673";
    const JOINT_USER: &str = "96362357086";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn engine_with(store: Arc<dyn ConsentStore>) -> (ConsentEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let options = EngineOptions {
            joint_accounts: JointAccounts::new([JOINT_USER], Duration::seconds(30)),
            ..EngineOptions::default()
        };
        let engine = ConsentEngine::new(
            store,
            clock.clone(),
            Arc::new(load_catalog(None).unwrap()),
            options,
        );
        (engine, clock)
    }

    fn engine() -> (ConsentEngine, Arc<ManualClock>) {
        engine_with(Arc::new(MemoryConsentStore::new()))
    }

    fn draft(user: &str) -> ConsentDraft {
        ConsentDraft {
            user_id: user.to_string(),
            business_id: None,
            client_id: "client-a".to_string(),
            permissions: vec![
                "ACCOUNTS_READ".into(),
                "ACCOUNTS_BALANCES_READ".into(),
                "RESOURCES_READ".into(),
            ],
            expires_at: None,
        }
    }

    fn extension_request(user: &str, expires_at: Option<DateTime<Utc>>) -> ExtensionRequest {
        ExtensionRequest {
            expires_at,
            requester: Identity {
                user_id: user.to_string(),
                business_id: None,
            },
            customer_ip: Some("10.1.1.1".into()),
            customer_user_agent: Some("okhttp".into()),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_status() {
        let (engine, _) = engine();
        let mut d = draft(USER);
        d.permissions.push("RESOURCES_READ".into());

        let consent = engine.create(d).await.unwrap();
        assert!(consent.id.starts_with("urn:lodestar:"));
        assert_eq!(consent.status, Status::AwaitingAuthorization);
        assert_eq!(consent.created_at, t0());
        assert_eq!(consent.permissions.len(), 3, "duplicates are dropped");
        assert_eq!(consent.version, 1);
    }

    #[tokio::test]
    async fn test_create_validates_expiration() {
        let (engine, _) = engine();
        let mut d = draft(USER);
        d.expires_at = Some(t0() - Duration::seconds(1));
        assert!(matches!(
            engine.create(d).await,
            Err(ConsentError::InvalidExpiration)
        ));

        let mut d = draft(USER);
        d.expires_at = Some(t0() + Duration::days(366));
        assert!(matches!(
            engine.create(d).await,
            Err(ConsentError::InvalidExpiration)
        ));
    }

    #[tokio::test]
    async fn test_awaiting_consent_expires_after_one_hour() {
        let (engine, clock) = engine();
        let created = engine.create(draft(USER)).await.unwrap();

        clock.advance(Duration::minutes(61));
        let consent = engine.consent(&created.id, None).await.unwrap();
        assert_eq!(consent.status, Status::Rejected);
        assert_eq!(
            consent.rejection,
            Some(RejectionInfo::new(RejectedBy::User, RejectionReason::ConsentExpired))
        );

        // Persisted, not just computed
        let again = engine.consent(&created.id, None).await.unwrap();
        assert_eq!(again.version, consent.version);
    }

    #[tokio::test]
    async fn test_authorized_consent_reaches_max_date() {
        let (engine, clock) = engine();
        let mut d = draft(USER);
        d.expires_at = Some(t0() + Duration::days(2));
        let created = engine.create(d).await.unwrap();
        engine
            .authorize(&created.id, AuthorizationGrant::default())
            .await
            .unwrap();

        clock.advance(Duration::days(2) + Duration::seconds(1));
        let consent = engine.consent(&created.id, None).await.unwrap();
        assert_eq!(
            consent.rejection,
            Some(RejectionInfo::new(
                RejectedBy::Aspsp,
                RejectionReason::ConsentMaxDateReached
            ))
        );
    }

    #[tokio::test]
    async fn test_authorize_narrows_and_binds_resources() {
        let (engine, clock) = engine();
        let created = engine.create(draft(USER)).await.unwrap();
        clock.advance(Duration::minutes(5));

        let consent = engine
            .authorize(
                &created.id,
                AuthorizationGrant {
                    permissions: Some(vec!["ACCOUNTS_READ".into(), "RESOURCES_READ".into()]),
                    resources: ResourceBindings {
                        account_id: Some("acc-1".into()),
                        credit_card_account_id: None,
                    },
                },
            )
            .await
            .unwrap();

        assert_eq!(consent.status, Status::Authorized);
        assert_eq!(consent.status_updated_at, t0() + Duration::minutes(5));
        assert_eq!(consent.permissions.len(), 2);
        assert_eq!(consent.resources.account_id.as_deref(), Some("acc-1"));

        let second = engine
            .authorize(&created.id, AuthorizationGrant::default())
            .await;
        assert!(matches!(
            second,
            Err(ConsentError::InvalidStatusTransition {
                from: Status::Authorized,
                to: Status::Authorized
            })
        ));
    }

    #[tokio::test]
    async fn test_authorize_rejects_widening() {
        let (engine, _) = engine();
        let created = engine.create(draft(USER)).await.unwrap();
        let result = engine
            .authorize(
                &created.id,
                AuthorizationGrant {
                    permissions: Some(vec!["LOANS_READ".into()]),
                    resources: ResourceBindings::default(),
                },
            )
            .await;
        assert!(matches!(result, Err(ConsentError::InvalidPermission(_))));
    }

    #[tokio::test]
    async fn test_revalidation_of_narrowed_permissions() {
        let store: Arc<dyn ConsentStore> = Arc::new(MemoryConsentStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let engine = ConsentEngine::new(
            store,
            clock,
            Arc::new(load_catalog(None).unwrap()),
            EngineOptions {
                revalidate_narrowed_permissions: true,
                ..EngineOptions::default()
            },
        );
        let created = engine.create(draft(USER)).await.unwrap();
        let result = engine
            .authorize(
                &created.id,
                AuthorizationGrant {
                    permissions: Some(vec!["ACCOUNTS_BALANCES_READ".into()]),
                    resources: ResourceBindings::default(),
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(ConsentError::InvalidPermissionCombination)
        ));
    }

    #[tokio::test]
    async fn test_rejecting_twice_fails() {
        let (engine, _) = engine();
        let created = engine.create(draft(USER)).await.unwrap();
        let info = RejectionInfo::new(RejectedBy::Tpp, RejectionReason::ConsentTechnicalIssue);

        let rejected = engine.reject(&created.id, None, info).await.unwrap();
        assert_eq!(rejected.rejection, Some(info));
        assert!(matches!(
            engine.reject(&created.id, None, info).await,
            Err(ConsentError::AlreadyRejected)
        ));
        assert!(matches!(
            engine.authorize(&created.id, AuthorizationGrant::default()).await,
            Err(ConsentError::InvalidStatusTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_revokes_authorized_consent() {
        let (engine, _) = engine();
        let created = engine.create(draft(USER)).await.unwrap();
        engine
            .authorize(&created.id, AuthorizationGrant::default())
            .await
            .unwrap();

        let deleted = engine.delete(&created.id, Some("client-a")).await.unwrap();
        assert_eq!(
            deleted.rejection,
            Some(RejectionInfo::new(
                RejectedBy::User,
                RejectionReason::CustomerManuallyRevoked
            ))
        );
        // Tombstone remains readable
        assert!(engine.consent(&created.id, None).await.unwrap().is_rejected());
    }

    #[tokio::test]
    async fn test_access_control() {
        let (engine, _) = engine();
        let created = engine.create(draft(USER)).await.unwrap();

        assert!(matches!(
            engine.consent(&created.id, Some("client-b")).await,
            Err(ConsentError::AccessDenied)
        ));
        assert!(matches!(
            engine.delete(&created.id, Some("client-b")).await,
            Err(ConsentError::AccessDenied)
        ));
        assert!(engine.consent(&created.id, Some("client-a")).await.is_ok());
        assert!(matches!(
            engine.consent("urn:lodestar:missing", None).await,
            Err(ConsentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_extension_must_move_forward() {
        let (engine, clock) = engine();
        let mut d = draft(USER);
        d.expires_at = Some(t0() + Duration::days(10));
        let created = engine.create(d).await.unwrap();
        engine
            .authorize(&created.id, AuthorizationGrant::default())
            .await
            .unwrap();
        clock.advance(Duration::days(1));

        let same = engine
            .extend(
                &created.id,
                None,
                extension_request(USER, Some(t0() + Duration::days(10))),
            )
            .await;
        assert!(matches!(same, Err(ConsentError::InvalidExpiration)));

        let earlier = engine
            .extend(
                &created.id,
                None,
                extension_request(USER, Some(t0() + Duration::days(5))),
            )
            .await;
        assert!(matches!(earlier, Err(ConsentError::InvalidExpiration)));

        // Later than now + 1 year
        let too_far = engine
            .extend(
                &created.id,
                None,
                extension_request(USER, Some(t0() + Duration::days(368))),
            )
            .await;
        assert!(matches!(too_far, Err(ConsentError::InvalidExpiration)));
        assert_eq!(
            engine.consent(&created.id, None).await.unwrap().extensions.len(),
            0
        );

        let extended = engine
            .extend(
                &created.id,
                None,
                extension_request(USER, Some(t0() + Duration::days(20))),
            )
            .await
            .unwrap();
        assert_eq!(extended.expires_at, Some(t0() + Duration::days(20)));
        assert_eq!(
            extended.extensions[0].previous_expires_at,
            Some(t0() + Duration::days(10))
        );
        assert_eq!(extended.extensions[0].requested_at, t0() + Duration::days(1));
        assert_eq!(extended.extensions[0].customer_ip.as_deref(), Some("10.1.1.1"));

        // No expiration makes the consent indefinite
        let indefinite = engine
            .extend(&created.id, None, extension_request(USER, None))
            .await
            .unwrap();
        assert_eq!(indefinite.expires_at, None);
        assert_eq!(indefinite.extensions.len(), 2);
        assert_eq!(
            indefinite.extensions[0].previous_expires_at,
            Some(t0() + Duration::days(20))
        );

        let page = engine
            .extensions(&created.id, None, Pagination { number: 1, size: 1 })
            .await
            .unwrap();
        assert_eq!(page.total_records, 2);
        assert_eq!(page.records[0].expires_at, None);
    }

    #[tokio::test]
    async fn test_extension_checks_in_order() {
        let (engine, _) = engine();
        let created = engine.create(draft(USER)).await.unwrap();
        assert!(matches!(
            engine
                .extend(&created.id, None, extension_request(USER, None))
                .await,
            Err(ConsentError::ExtensionNotAllowed(ExtensionDenial::NotAuthorised))
        ));

        engine
            .authorize(&created.id, AuthorizationGrant::default())
            .await
            .unwrap();
        assert!(matches!(
            engine
                .extend(&created.id, None, extension_request("11111111111", None))
                .await,
            Err(ConsentError::ExtensionNotAllowed(ExtensionDenial::IdentityMismatch))
        ));

        let joint = engine.create(draft(JOINT_USER)).await.unwrap();
        engine
            .authorize(&joint.id, AuthorizationGrant::default())
            .await
            .unwrap();
        assert!(matches!(
            engine
                .extend(&joint.id, None, extension_request(JOINT_USER, None))
                .await,
            Err(ConsentError::ExtensionNotAllowedJointAccount)
        ));
    }

    #[tokio::test]
    async fn test_extension_requires_same_business() {
        let (engine, _) = engine();
        let mut d = draft(USER);
        d.business_id = Some("50685362006773".into());
        let created = engine.create(d).await.unwrap();
        engine
            .authorize(&created.id, AuthorizationGrant::default())
            .await
            .unwrap();

        let mut request = extension_request(USER, None);
        request.requester.business_id = Some("00000000000191".into());
        assert!(matches!(
            engine.extend(&created.id, None, request.clone()).await,
            Err(ConsentError::ExtensionNotAllowed(ExtensionDenial::IdentityMismatch))
        ));

        request.requester.business_id = Some("50685362006773".into());
        assert!(engine.extend(&created.id, None, request).await.is_ok());
    }

    /// Store that loses the first `conflicts` writes of existing records.
    struct RacingStore {
        inner: MemoryConsentStore,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl ConsentStore for RacingStore {
        async fn get(&self, id: &str) -> Result<Option<Consent>, StoreError> {
            self.inner.get(id).await
        }

        async fn put(&self, consent: &Consent) -> Result<u64, StoreError> {
            if consent.version > 0
                && self
                    .conflicts
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(StoreError::Conflict {
                    id: consent.id.clone(),
                    version: consent.version,
                });
            }
            self.inner.put(consent).await
        }

        async fn non_rejected_ids(&self) -> Result<Vec<String>, StoreError> {
            self.inner.non_rejected_ids().await
        }
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let store = Arc::new(RacingStore {
            inner: MemoryConsentStore::new(),
            conflicts: AtomicUsize::new(0),
        });
        let (engine, _) = engine_with(store.clone());
        let created = engine.create(draft(USER)).await.unwrap();

        store.conflicts.store(MAX_ATTEMPTS - 1, Ordering::SeqCst);
        let consent = engine
            .authorize(&created.id, AuthorizationGrant::default())
            .await
            .unwrap();
        assert_eq!(consent.version, 2);

        store.conflicts.store(MAX_ATTEMPTS, Ordering::SeqCst);
        let result = engine.delete(&created.id, None).await;
        assert!(matches!(result, Err(ConsentError::Contention(_))));
        assert!(engine.consent(&created.id, None).await.unwrap().is_authorized());
    }

    #[tokio::test]
    async fn test_concurrent_rejections_apply_once() {
        let (engine, _) = engine();
        let created = engine.create(draft(USER)).await.unwrap();
        let info = RejectionInfo::new(RejectedBy::Tpp, RejectionReason::ConsentTechnicalIssue);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let id = created.id.clone();
                tokio::spawn(async move { engine.reject(&id, None, info).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(ConsentError::AlreadyRejected) | Err(ConsentError::Contention(_)) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(succeeded, 1);
    }

    #[tokio::test]
    async fn test_sweep_rejects_stale_consents() {
        let (engine, clock) = engine();
        let stale = engine.create(draft(USER)).await.unwrap();
        clock.advance(Duration::minutes(30));
        let fresh = engine.create(draft(USER)).await.unwrap();
        clock.advance(Duration::minutes(31));

        let report = engine.sweep().await.unwrap();
        assert_eq!(report.examined, 2);
        assert_eq!(report.rejected, 1);
        assert!(engine.consent(&stale.id, None).await.unwrap().is_rejected());
        assert!(engine
            .consent(&fresh.id, None)
            .await
            .unwrap()
            .is_awaiting_authorization());

        let report = engine.sweep().await.unwrap();
        assert_eq!(report.examined, 1);
    }
}
