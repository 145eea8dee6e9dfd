//! HTTP surface: the consent v3 API, the resources listing, and the
//! approval hooks the authorization server drives during login.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use miette::IntoDiagnostic;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::caller::{
    Caller, CallerRejection, CONSENT_ID_HEADER, CUSTOMER_IP_HEADER, CUSTOMER_USER_AGENT_HEADER,
    SUBJECT_HEADER,
};
use crate::consent::errors::error_response;
use crate::consent::page::{Page, Pagination};
use crate::consent::{
    Consent, ConsentDraft, ConsentEngine, ConsentError, Extension, ExtensionRequest, Identity,
    Permission, RejectedBy, RejectionReason, Status,
};
use crate::policy::{ConsentPolicy, CustomerAccounts, PolicyError, Resource};
use crate::settings::Settings;

const CONSENTS_PATH: &str = "/open-banking/consents/v3/consents";
const RESOURCES_PATH: &str = "/open-banking/resources/v3/resources";

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub engine: ConsentEngine,
    pub policy: ConsentPolicy,
}

impl AppState {
    pub fn new(settings: Settings, engine: ConsentEngine) -> Self {
        Self {
            settings: Arc::new(settings),
            policy: ConsentPolicy::new(engine.clone()),
            engine,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.public_base_url(), path)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(CONSENTS_PATH, post(create_consent))
        .route(
            &format!("{CONSENTS_PATH}/{{id}}"),
            get(get_consent).delete(delete_consent),
        )
        .route(
            &format!("{CONSENTS_PATH}/{{id}}/extends"),
            post(extend_consent),
        )
        .route(
            &format!("{CONSENTS_PATH}/{{id}}/extensions"),
            get(list_extensions),
        )
        .route(RESOURCES_PATH, get(list_resources))
        .route(
            "/authorisations/{id}",
            get(authorisation_page).post(authorisation_submit),
        )
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: Settings, engine: ConsentEngine) -> miette::Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .map_err(|e| miette::miette!("bad listen addr: {e}"))?;
    let router = router(AppState::new(settings, engine));

    tracing::info!(%addr, "Consent API listening");
    let listener = tokio::net::TcpListener::bind(addr).await.into_diagnostic()?;
    axum::serve(listener, router).await.into_diagnostic()?;
    Ok(())
}

/// Everything a handler can fail with.
#[derive(Debug)]
pub enum WebError {
    Consent(ConsentError),
    Policy(PolicyError),
    Caller(CallerRejection),
    BadRequest(String),
    InvalidParameter(String),
}

impl From<ConsentError> for WebError {
    fn from(err: ConsentError) -> Self {
        WebError::Consent(err)
    }
}

impl From<PolicyError> for WebError {
    fn from(err: PolicyError) -> Self {
        WebError::Policy(err)
    }
}

impl From<CallerRejection> for WebError {
    fn from(err: CallerRejection) -> Self {
        WebError::Caller(err)
    }
}

impl From<JsonRejection> for WebError {
    fn from(err: JsonRejection) -> Self {
        WebError::BadRequest(err.body_text())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::Consent(err) => err.into_response(),
            WebError::Policy(err) => err.into_response(),
            WebError::Caller(err) => err.into_response(),
            WebError::BadRequest(detail) => {
                error_response(StatusCode::BAD_REQUEST, "INVALID_REQUEST", &detail)
            }
            WebError::InvalidParameter(detail) => {
                error_response(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PARAMETER", &detail)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDto {
    pub identification: String,
    #[serde(default)]
    pub rel: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDto {
    pub document: DocumentDto,
}

impl EntityDto {
    fn new(identification: &str, rel: &str) -> Self {
        Self {
            document: DocumentDto {
                identification: identification.to_string(),
                rel: rel.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConsentData {
    pub logged_user: EntityDto,
    pub business_entity: Option<EntityDto>,
    pub permissions: Vec<Permission>,
    pub expiration_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConsentRequest {
    pub data: CreateConsentData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendConsentData {
    pub expiration_date_time: Option<DateTime<Utc>>,
    pub logged_user: EntityDto,
    pub business_entity: Option<EntityDto>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendConsentRequest {
    pub data: ExtendConsentData,
}

#[derive(Debug, Serialize)]
struct RejectionReasonDto {
    code: RejectionReason,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionDto {
    rejected_by: RejectedBy,
    reason: RejectionReasonDto,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConsentData {
    consent_id: String,
    status: Status,
    permissions: Vec<Permission>,
    creation_date_time: DateTime<Utc>,
    status_update_date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<RejectionDto>,
}

impl From<&Consent> for ConsentData {
    fn from(c: &Consent) -> Self {
        Self {
            consent_id: c.id.clone(),
            status: c.status,
            permissions: c.permissions.clone(),
            creation_date_time: c.created_at,
            status_update_date_time: c.status_updated_at,
            expiration_date_time: c.expires_at,
            rejection: c.rejection.map(|r| RejectionDto {
                rejected_by: r.rejected_by,
                reason: RejectionReasonDto { code: r.reason },
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtensionData {
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_expiration_date_time: Option<DateTime<Utc>>,
    logged_user: EntityDto,
    request_date_time: DateTime<Utc>,
    x_fapi_customer_ip_address: Option<String>,
    x_customer_user_agent: Option<String>,
}

impl From<&Extension> for ExtensionData {
    fn from(e: &Extension) -> Self {
        Self {
            expiration_date_time: e.expires_at,
            previous_expiration_date_time: e.previous_expires_at,
            logged_user: EntityDto::new(&e.user_id, "CPF"),
            request_date_time: e.requested_at,
            x_fapi_customer_ip_address: e.customer_ip.clone(),
            x_customer_user_agent: e.customer_user_agent.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct Links {
    #[serde(rename = "self")]
    self_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    first: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last: Option<String>,
}

impl Links {
    fn single(self_link: String) -> Self {
        Self {
            self_link,
            ..Self::default()
        }
    }

    fn paginated<T>(base: &str, page: &Page<T>) -> Self {
        let at = |number: usize| format!("{base}?page={number}&page-size={}", page.size);
        Self {
            self_link: at(page.number),
            first: page.has_previous().then(|| at(1)),
            prev: page.has_previous().then(|| at(page.number - 1)),
            next: page.has_next().then(|| at(page.number + 1)),
            last: page.has_next().then(|| at(page.total_pages)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    request_date_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_pages: Option<usize>,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    data: T,
    links: Links,
    meta: Meta,
}

impl<T> Envelope<T> {
    fn single(data: T, self_link: String, now: DateTime<Utc>) -> Self {
        Self {
            data,
            links: Links::single(self_link),
            meta: Meta {
                request_date_time: now,
                total_records: None,
                total_pages: None,
            },
        }
    }
}

fn paginated<T, U>(
    page: &Page<T>,
    base: &str,
    now: DateTime<Utc>,
    map: impl Fn(&T) -> U,
) -> Envelope<Vec<U>> {
    Envelope {
        data: page.records.iter().map(map).collect(),
        links: Links::paginated(base, page),
        meta: Meta {
            request_date_time: now,
            total_records: Some(page.total_records),
            total_pages: Some(page.total_pages),
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
    #[serde(rename = "page-size")]
    page_size: Option<String>,
}

impl PageQuery {
    /// Unparseable values are ignored; an oversized page is an error.
    fn pagination(&self) -> Result<Pagination, WebError> {
        let parse = |v: &Option<String>| v.as_deref().and_then(|s| s.parse::<usize>().ok());
        Pagination::new(parse(&self.page), parse(&self.page_size))
            .ok_or_else(|| WebError::InvalidParameter("invalid page size".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Consent API
// ---------------------------------------------------------------------------

async fn create_consent(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<CreateConsentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WebError> {
    let client_id = caller.require_client_id()?.to_string();
    let Json(req) = body?;

    let consent = state
        .engine
        .create(ConsentDraft {
            user_id: req.data.logged_user.document.identification,
            business_id: req.data.business_entity.map(|b| b.document.identification),
            client_id,
            permissions: req.data.permissions,
            expires_at: req.data.expiration_date_time,
        })
        .await?;

    let link = state.url(&format!("{CONSENTS_PATH}/{}", consent.id));
    let body = Envelope::single(ConsentData::from(&consent), link, state.engine.now());
    Ok((StatusCode::CREATED, Json(body)))
}

async fn get_consent(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    let client_id = caller.require_client_id()?;
    let consent = state.engine.consent(&id, Some(client_id)).await?;

    let link = state.url(&format!("{CONSENTS_PATH}/{id}"));
    Ok(Json(Envelope::single(
        ConsentData::from(&consent),
        link,
        state.engine.now(),
    )))
}

async fn delete_consent(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    let client_id = caller.require_client_id()?;
    state.engine.delete(&id, Some(client_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn extend_consent(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<ExtendConsentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, WebError> {
    if caller.require_consent_id()? != id {
        return Err(CallerRejection::Mismatch(CONSENT_ID_HEADER).into());
    }
    let customer_ip = caller
        .customer_ip
        .clone()
        .ok_or_else(|| WebError::BadRequest(format!("missing {CUSTOMER_IP_HEADER} header")))?;
    let customer_user_agent = caller.customer_user_agent.clone().ok_or_else(|| {
        WebError::BadRequest(format!("missing {CUSTOMER_USER_AGENT_HEADER} header"))
    })?;
    let Json(req) = body?;

    let consent = state
        .engine
        .extend(
            &id,
            caller.client_id.as_deref(),
            ExtensionRequest {
                expires_at: req.data.expiration_date_time,
                requester: Identity {
                    user_id: req.data.logged_user.document.identification,
                    business_id: req.data.business_entity.map(|b| b.document.identification),
                },
                customer_ip: Some(customer_ip),
                customer_user_agent: Some(customer_user_agent),
            },
        )
        .await?;

    let link = state.url(&format!("{CONSENTS_PATH}/{id}/extends"));
    let body = Envelope::single(ConsentData::from(&consent), link, state.engine.now());
    Ok((StatusCode::CREATED, Json(body)))
}

async fn list_extensions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, WebError> {
    let client_id = caller.require_client_id()?;
    let pagination = query.pagination()?;
    let page = state
        .engine
        .extensions(&id, Some(client_id), pagination)
        .await?;

    let base = state.url(&format!("{CONSENTS_PATH}/{id}/extensions"));
    Ok(Json(paginated(&page, &base, state.engine.now(), |e| ExtensionData::from(e))))
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

async fn list_resources(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, WebError> {
    let consent_id = caller.require_consent_id()?;
    let pagination = query.pagination()?;
    let page = state.policy.resources(consent_id, pagination).await?;

    let base = state.url(RESOURCES_PATH);
    Ok(Json(paginated(&page, &base, state.engine.now(), Resource::clone)))
}

// ---------------------------------------------------------------------------
// Approval hooks
// ---------------------------------------------------------------------------

fn customer(caller: &Caller) -> Result<Identity, WebError> {
    let user_id = caller
        .subject
        .clone()
        .ok_or(CallerRejection::Missing(SUBJECT_HEADER))?;
    Ok(Identity {
        user_id,
        business_id: caller.business_subject.clone(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorisationPage {
    consent_id: String,
    logged_user: EntityDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    business_entity: Option<EntityDto>,
    permissions: Vec<Permission>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorisationForm {
    /// "approve" or "deny"
    pub action: String,
    pub permissions: Option<Vec<Permission>>,
    pub account_id: Option<String>,
    pub credit_card_account_id: Option<String>,
}

async fn authorisation_page(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, WebError> {
    let customer = customer(&caller)?;
    let consent = state.policy.begin_authorization(&id, &customer).await?;

    Ok(Json(AuthorisationPage {
        consent_id: consent.id,
        logged_user: EntityDto::new(&consent.user_id, "CPF"),
        business_entity: consent
            .business_id
            .as_deref()
            .map(|b| EntityDto::new(b, "CNPJ")),
        permissions: consent.permissions,
        expiration_date_time: consent.expires_at,
    }))
}

async fn authorisation_submit(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<AuthorisationForm>, JsonRejection>,
) -> Result<impl IntoResponse, WebError> {
    let customer = customer(&caller)?;
    let Json(form) = body?;
    state.policy.begin_authorization(&id, &customer).await?;

    let consent = match form.action.as_str() {
        "approve" => {
            state
                .policy
                .grant(
                    &id,
                    form.permissions,
                    CustomerAccounts {
                        account_id: form.account_id,
                        credit_card_account_id: form.credit_card_account_id,
                    },
                )
                .await?
        }
        "deny" => state.policy.deny(&id).await?,
        other => return Err(WebError::BadRequest(format!("unknown action `{other}`"))),
    };

    let link = state.url(&format!("{CONSENTS_PATH}/{id}"));
    Ok(Json(Envelope::single(
        ConsentData::from(&consent),
        link,
        state.engine.now(),
    )))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
