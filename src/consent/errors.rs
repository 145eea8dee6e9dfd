use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::consent::types::Status;
use crate::errors::StoreError;

/// Why an extension request was refused before its expiration was examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionDenial {
    NotAuthorised,
    IdentityMismatch,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConsentError {
    #[error("Consent `{0}` not found")]
    #[diagnostic(code(lodestar::consent::not_found))]
    NotFound(String),

    #[error("Access to consent is not allowed")]
    #[diagnostic(
        code(lodestar::consent::access_denied),
        help("A consent can only be read by the client that created it")
    )]
    AccessDenied,

    #[error("Cannot move consent from {from} to {to}")]
    #[diagnostic(code(lodestar::consent::invalid_status_transition))]
    InvalidStatusTransition { from: Status, to: Status },

    #[error("The consent is already rejected")]
    #[diagnostic(code(lodestar::consent::already_rejected))]
    AlreadyRejected,

    #[error("The consent is not allowed to be extended")]
    #[diagnostic(code(lodestar::consent::extension_not_allowed))]
    ExtensionNotAllowed(ExtensionDenial),

    #[error("A consent created for a joint account cannot be extended")]
    #[diagnostic(code(lodestar::consent::extension_joint_account))]
    ExtensionNotAllowedJointAccount,

    #[error("The expiration date time is invalid")]
    #[diagnostic(
        code(lodestar::consent::invalid_expiration),
        help("The expiration must lie between now and one year from now")
    )]
    InvalidExpiration,

    #[error("Invalid permission: {0}")]
    #[diagnostic(code(lodestar::consent::invalid_permission))]
    InvalidPermission(String),

    #[error("The requested permission groups are invalid")]
    #[diagnostic(
        code(lodestar::consent::invalid_permission_combination),
        help("Request every permission of at least one group containing each code")
    )]
    InvalidPermissionCombination,

    #[error("Cannot request personal and business permissions together")]
    #[diagnostic(code(lodestar::consent::personal_business_conflict))]
    PersonalBusinessConflict,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("Consent `{0}` is being modified concurrently, try again")]
    #[diagnostic(code(lodestar::consent::contention))]
    Contention(String),
}

impl ConsentError {
    /// HTTP status and Open Finance error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ConsentError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ConsentError::AccessDenied
            | ConsentError::ExtensionNotAllowed(ExtensionDenial::IdentityMismatch) => {
                (StatusCode::FORBIDDEN, "FORBIDDEN")
            }
            ConsentError::InvalidStatusTransition { .. }
            | ConsentError::ExtensionNotAllowed(ExtensionDenial::NotAuthorised) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ESTADO_CONSENTIMENTO_INVALIDO",
            ),
            ConsentError::AlreadyRejected => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CONSENTIMENTO_EM_STATUS_REJEITADO",
            ),
            ConsentError::ExtensionNotAllowedJointAccount => {
                (StatusCode::UNPROCESSABLE_ENTITY, "DEPENDE_MULTIPLA_ALCADA")
            }
            ConsentError::InvalidExpiration => {
                (StatusCode::UNPROCESSABLE_ENTITY, "DATA_EXPIRACAO_INVALIDA")
            }
            ConsentError::InvalidPermission(_) => (StatusCode::BAD_REQUEST, "INVALID_PERMISSION"),
            ConsentError::InvalidPermissionCombination => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "COMBINACAO_PERMISSOES_INCORRETA",
            ),
            ConsentError::PersonalBusinessConflict => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PERMISSAO_PF_PJ_EM_CONJUNTO")
            }
            ConsentError::Contention(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ConsentError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

/// Open Finance error envelope: `{"errors": [{"code", "title", "detail"}]}`.
pub fn error_response(status: StatusCode, code: &str, detail: &str) -> Response {
    let body = json!({
        "errors": [{ "code": code, "title": code, "detail": detail }]
    });
    (status, Json(body)).into_response()
}

impl IntoResponse for ConsentError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Consent operation failed");
            return error_response(status, code, "internal error");
        }
        error_response(status, code, &self.to_string())
    }
}
