use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Permission codes the service itself relies on. Everything else is only
/// known through the permission catalog.
pub mod codes {
    pub const RESOURCES_READ: &str = "RESOURCES_READ";
    pub const ACCOUNTS_PREFIX: &str = "ACCOUNTS_";
    pub const CREDIT_CARDS_ACCOUNTS_PREFIX: &str = "CREDIT_CARDS_ACCOUNTS_";
}

/// A permission code such as `ACCOUNTS_READ`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Permission {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "AWAITING_AUTHORISATION")]
    AwaitingAuthorization,
    #[serde(rename = "AUTHORISED")]
    Authorized,
    #[serde(rename = "REJECTED")]
    Rejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::AwaitingAuthorization => "AWAITING_AUTHORISATION",
            Status::Authorized => "AUTHORISED",
            Status::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AWAITING_AUTHORISATION" => Ok(Status::AwaitingAuthorization),
            "AUTHORISED" => Ok(Status::Authorized),
            "REJECTED" => Ok(Status::Rejected),
            other => Err(format!("unknown consent status `{other}`")),
        }
    }
}

/// Who moved the consent to `REJECTED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RejectedBy {
    User,
    Aspsp,
    Tpp,
}

impl RejectedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectedBy::User => "USER",
            RejectedBy::Aspsp => "ASPSP",
            RejectedBy::Tpp => "TPP",
        }
    }
}

impl FromStr for RejectedBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(RejectedBy::User),
            "ASPSP" => Ok(RejectedBy::Aspsp),
            "TPP" => Ok(RejectedBy::Tpp),
            other => Err(format!("unknown rejecting party `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    ConsentExpired,
    CustomerManuallyRejected,
    CustomerManuallyRevoked,
    ConsentMaxDateReached,
    ConsentTechnicalIssue,
    InternalSecurityReason,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::ConsentExpired => "CONSENT_EXPIRED",
            RejectionReason::CustomerManuallyRejected => "CUSTOMER_MANUALLY_REJECTED",
            RejectionReason::CustomerManuallyRevoked => "CUSTOMER_MANUALLY_REVOKED",
            RejectionReason::ConsentMaxDateReached => "CONSENT_MAX_DATE_REACHED",
            RejectionReason::ConsentTechnicalIssue => "CONSENT_TECHNICAL_ISSUE",
            RejectionReason::InternalSecurityReason => "INTERNAL_SECURITY_REASON",
        }
    }
}

impl FromStr for RejectionReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONSENT_EXPIRED" => Ok(RejectionReason::ConsentExpired),
            "CUSTOMER_MANUALLY_REJECTED" => Ok(RejectionReason::CustomerManuallyRejected),
            "CUSTOMER_MANUALLY_REVOKED" => Ok(RejectionReason::CustomerManuallyRevoked),
            "CONSENT_MAX_DATE_REACHED" => Ok(RejectionReason::ConsentMaxDateReached),
            "CONSENT_TECHNICAL_ISSUE" => Ok(RejectionReason::ConsentTechnicalIssue),
            "INTERNAL_SECURITY_REASON" => Ok(RejectionReason::InternalSecurityReason),
            other => Err(format!("unknown rejection reason `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionInfo {
    pub rejected_by: RejectedBy,
    pub reason: RejectionReason,
}

impl RejectionInfo {
    pub fn new(rejected_by: RejectedBy, reason: RejectionReason) -> Self {
        Self {
            rejected_by,
            reason,
        }
    }
}

/// One change of a consent's expiration date. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
    /// `None` extends the consent indefinitely.
    pub expires_at: Option<DateTime<Utc>>,
    pub previous_expires_at: Option<DateTime<Utc>>,
    pub user_id: String,
    pub business_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub customer_ip: Option<String>,
    pub customer_user_agent: Option<String>,
}

/// Resources the user attached to the consent while authorizing it.
/// Opaque identifiers owned by the account systems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_card_account_id: Option<String>,
}

impl ResourceBindings {
    pub fn is_empty(&self) -> bool {
        self.account_id.is_none() && self.credit_card_account_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub id: String,
    pub status: Status,
    pub user_id: String,
    pub business_id: Option<String>,
    pub client_id: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rejection: Option<RejectionInfo>,
    /// Most recent first.
    pub extensions: Vec<Extension>,
    #[serde(default)]
    pub resources: ResourceBindings,
    /// Optimistic concurrency counter; 0 until the consent is first stored.
    #[serde(default)]
    pub version: u64,
}

impl Consent {
    pub fn is_awaiting_authorization(&self) -> bool {
        self.status == Status::AwaitingAuthorization
    }

    pub fn is_authorized(&self) -> bool {
        self.status == Status::Authorized
    }

    pub fn is_rejected(&self) -> bool {
        self.status == Status::Rejected
    }

    /// True when every permission in `required` was granted.
    pub fn has_permissions(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.permissions.contains(p))
    }
}

/// What a client submits to open a consent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentDraft {
    pub user_id: String,
    pub business_id: Option<String>,
    pub client_id: String,
    pub permissions: Vec<Permission>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of the interactive authorization step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationGrant {
    /// Subset of the requested permissions the user agreed to; `None` keeps
    /// the requested set.
    pub permissions: Option<Vec<Permission>>,
    pub resources: ResourceBindings,
}

/// The authenticated person (and business) behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub business_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRequest {
    pub expires_at: Option<DateTime<Utc>>,
    pub requester: Identity,
    pub customer_ip: Option<String>,
    pub customer_user_agent: Option<String>,
}

/// Remove duplicates, keeping the first occurrence of each permission.
pub fn dedup_permissions(permissions: Vec<Permission>) -> Vec<Permission> {
    let mut seen = std::collections::HashSet::new();
    permissions
        .into_iter()
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
