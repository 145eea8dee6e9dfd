use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::consent::errors::error_response;
use crate::consent::page::{paginate, Page, Pagination};
use crate::consent::types::codes;
use crate::consent::{
    AuthorizationGrant, Consent, ConsentEngine, ConsentError, Identity, Permission, RejectedBy,
    RejectionInfo, RejectionReason, ResourceBindings, ResourceKind,
};

#[derive(Debug, Error, Diagnostic)]
pub enum PolicyError {
    #[error("Invalid token")]
    #[diagnostic(code(lodestar::policy::unauthorised))]
    Unauthorised,

    #[error("The consent is not authorized")]
    #[diagnostic(code(lodestar::policy::not_authorised))]
    NotAuthorised,

    #[error("The consent is missing permissions")]
    #[diagnostic(code(lodestar::policy::missing_permissions))]
    MissingPermissions,

    #[error("The consent is not awaiting authorization")]
    #[diagnostic(code(lodestar::policy::not_awaiting_authorisation))]
    NotAwaitingAuthorisation,

    #[error("The consent was created for a different customer")]
    #[diagnostic(code(lodestar::policy::subject_mismatch))]
    SubjectMismatch,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Consent(#[from] ConsentError),
}

impl IntoResponse for PolicyError {
    fn into_response(self) -> Response {
        match self {
            PolicyError::Unauthorised => {
                error_response(StatusCode::UNAUTHORIZED, "UNAUTHORISED", &self.to_string())
            }
            PolicyError::NotAuthorised => {
                error_response(StatusCode::UNAUTHORIZED, "INVALID_STATUS", &self.to_string())
            }
            PolicyError::MissingPermissions => {
                error_response(StatusCode::FORBIDDEN, "INVALID_STATUS", &self.to_string())
            }
            PolicyError::NotAwaitingAuthorisation => error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "ESTADO_CONSENTIMENTO_INVALIDO",
                &self.to_string(),
            ),
            PolicyError::SubjectMismatch => {
                error_response(StatusCode::FORBIDDEN, "FORBIDDEN", &self.to_string())
            }
            PolicyError::Consent(err) => err.into_response(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Available,
    PendingAuthorisation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub resource_id: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub status: ResourceStatus,
}

/// Accounts the authenticated customer holds, offered for binding at grant time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerAccounts {
    pub account_id: Option<String>,
    pub credit_card_account_id: Option<String>,
}

/// Entry point for the interactive consent screens and for resource
/// endpoints that need to know what a consent allows.
#[derive(Clone)]
pub struct ConsentPolicy {
    engine: ConsentEngine,
}

impl ConsentPolicy {
    pub fn new(engine: ConsentEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ConsentEngine {
        &self.engine
    }

    /// Start the approval screen for `consent_id` on behalf of `customer`.
    pub async fn begin_authorization(
        &self,
        consent_id: &str,
        customer: &Identity,
    ) -> Result<Consent, PolicyError> {
        let consent = self.engine.consent(consent_id, None).await?;
        if !consent.is_awaiting_authorization() {
            return Err(PolicyError::NotAwaitingAuthorisation);
        }
        let business_mismatch = consent
            .business_id
            .as_ref()
            .is_some_and(|b| customer.business_id.as_ref() != Some(b));
        if consent.user_id != customer.user_id || business_mismatch {
            return Err(PolicyError::SubjectMismatch);
        }
        Ok(consent)
    }

    /// The customer approved. Accounts are bound only when a granted
    /// permission reaches that kind of resource.
    pub async fn grant(
        &self,
        consent_id: &str,
        permissions: Option<Vec<Permission>>,
        accounts: CustomerAccounts,
    ) -> Result<Consent, PolicyError> {
        let requested = match &permissions {
            Some(p) => p.clone(),
            None => self.engine.consent(consent_id, None).await?.permissions,
        };
        let reaches = |prefix: &str| requested.iter().any(|p| p.as_str().starts_with(prefix));

        let resources = ResourceBindings {
            account_id: accounts
                .account_id
                .filter(|_| reaches(codes::ACCOUNTS_PREFIX)),
            credit_card_account_id: accounts
                .credit_card_account_id
                .filter(|_| reaches(codes::CREDIT_CARDS_ACCOUNTS_PREFIX)),
        };

        Ok(self
            .engine
            .authorize(
                consent_id,
                AuthorizationGrant {
                    permissions,
                    resources,
                },
            )
            .await?)
    }

    /// The customer refused.
    pub async fn deny(&self, consent_id: &str) -> Result<Consent, PolicyError> {
        let info = RejectionInfo::new(RejectedBy::User, RejectionReason::CustomerManuallyRejected);
        Ok(self.engine.reject(consent_id, None, info).await?)
    }

    /// Gate for resource endpoints. The consent must exist, be authorized and
    /// carry every permission in `required`.
    pub async fn require_permissions(
        &self,
        consent_id: &str,
        required: &[Permission],
    ) -> Result<Consent, PolicyError> {
        let consent = match self.engine.consent(consent_id, None).await {
            Ok(consent) => consent,
            Err(ConsentError::NotFound(_)) | Err(ConsentError::AccessDenied) => {
                debug!(consent_id, "Consent lookup failed");
                return Err(PolicyError::Unauthorised);
            }
            Err(err) => return Err(err.into()),
        };

        if !consent.is_authorized() {
            debug!(consent_id, status = %consent.status, "Consent is not authorized");
            return Err(PolicyError::NotAuthorised);
        }
        if !consent.has_permissions(required) {
            debug!(consent_id, "Consent is missing permissions");
            return Err(PolicyError::MissingPermissions);
        }
        Ok(consent)
    }

    pub fn is_resource_visible(&self, consent: &Consent, kind: ResourceKind) -> bool {
        self.engine
            .joint_accounts()
            .is_visible(consent, kind, self.engine.now())
    }

    /// Resources bound to the consent, requires `RESOURCES_READ`.
    pub async fn resources(
        &self,
        consent_id: &str,
        pagination: Pagination,
    ) -> Result<Page<Resource>, PolicyError> {
        let consent = self
            .require_permissions(consent_id, &[Permission::new(codes::RESOURCES_READ)])
            .await?;

        let bound = [
            (ResourceKind::Account, &consent.resources.account_id),
            (
                ResourceKind::CreditCardAccount,
                &consent.resources.credit_card_account_id,
            ),
        ];
        let resources: Vec<Resource> = bound
            .into_iter()
            .filter_map(|(kind, id)| {
                let id = id.as_ref()?;
                let status = if self.is_resource_visible(&consent, kind) {
                    ResourceStatus::Available
                } else {
                    ResourceStatus::PendingAuthorisation
                };
                Some(Resource {
                    resource_id: id.clone(),
                    kind,
                    status,
                })
            })
            .collect();

        Ok(paginate(&resources, pagination))
    }
}
