use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::consent::errors::error_response;

/// Headers set by the fronting authorization server once the access token
/// has been validated. Never taken from the client directly.
pub const CLIENT_ID_HEADER: &str = "x-client-id";
pub const CONSENT_ID_HEADER: &str = "x-consent-id";
pub const SUBJECT_HEADER: &str = "x-subject";
pub const BUSINESS_HEADER: &str = "x-business-subject";
pub const CUSTOMER_IP_HEADER: &str = "x-fapi-customer-ip-address";
pub const CUSTOMER_USER_AGENT_HEADER: &str = "x-customer-user-agent";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Who is calling, as asserted by the authorization server.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Caller {
    pub client_id: Option<String>,
    pub consent_id: Option<String>,
    pub subject: Option<String>,
    pub business_subject: Option<String>,
    pub customer_ip: Option<String>,
    pub customer_user_agent: Option<String>,
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            client_id: header(headers, CLIENT_ID_HEADER),
            consent_id: header(headers, CONSENT_ID_HEADER),
            subject: header(headers, SUBJECT_HEADER),
            business_subject: header(headers, BUSINESS_HEADER),
            customer_ip: header(headers, CUSTOMER_IP_HEADER),
            customer_user_agent: header(headers, CUSTOMER_USER_AGENT_HEADER),
        }
    }

    pub fn require_client_id(&self) -> Result<&str, CallerRejection> {
        self.client_id
            .as_deref()
            .ok_or(CallerRejection::Missing(CLIENT_ID_HEADER))
    }

    pub fn require_consent_id(&self) -> Result<&str, CallerRejection> {
        self.consent_id
            .as_deref()
            .ok_or(CallerRejection::Missing(CONSENT_ID_HEADER))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller::from_headers(&parts.headers))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerRejection {
    Missing(&'static str),
    Mismatch(&'static str),
}

impl IntoResponse for CallerRejection {
    fn into_response(self) -> Response {
        match self {
            CallerRejection::Missing(name) => error_response(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORISED",
                &format!("missing {name} header"),
            ),
            CallerRejection::Mismatch(name) => error_response(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                &format!("{name} does not match the request"),
            ),
        }
    }
}
