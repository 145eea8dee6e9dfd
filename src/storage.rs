use std::collections::HashMap;

use async_trait::async_trait;
use base64ct::Encoding;
use chrono::{DateTime, Utc};
use rand::RngCore;
use sea_orm::{
    ColumnTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set, SqlErr,
};
use tokio::sync::RwLock;

use crate::consent::types::{Consent, RejectionInfo, ResourceBindings, Status};
use crate::entities;
use crate::errors::{LodestarError, StoreError};
use crate::settings::Database as DbCfg;

/// Durable home of consent records.
///
/// `put` is a compare-and-swap on `Consent::version`: a record with version 0
/// is inserted and must not exist yet, any other record replaces the stored
/// one only if the stored version is equal. On success the new version is
/// returned. A lost race is reported as `StoreError::Conflict`.
#[async_trait]
pub trait ConsentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Consent>, StoreError>;

    async fn put(&self, consent: &Consent) -> Result<u64, StoreError>;

    /// Ids of every consent that is not `REJECTED`.
    async fn non_rejected_ids(&self) -> Result<Vec<String>, StoreError>;
}

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, LodestarError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

/// 24 random bytes, URL-safe base64 without padding.
pub fn random_id() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64ct::Base64UrlUnpadded::encode_string(&bytes)
}

/// In-process store, used by tests and by deployments without a database.
#[derive(Debug, Default)]
pub struct MemoryConsentStore {
    consents: RwLock<HashMap<String, Consent>>,
}

impl MemoryConsentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsentStore for MemoryConsentStore {
    async fn get(&self, id: &str) -> Result<Option<Consent>, StoreError> {
        Ok(self.consents.read().await.get(id).cloned())
    }

    async fn put(&self, consent: &Consent) -> Result<u64, StoreError> {
        let mut consents = self.consents.write().await;
        let stored_version = consents.get(&consent.id).map(|c| c.version).unwrap_or(0);
        let exists = consents.contains_key(&consent.id);

        let stale = consent.version != 0 && stored_version != consent.version;
        if (consent.version == 0 && exists) || stale {
            return Err(StoreError::Conflict {
                id: consent.id.clone(),
                version: consent.version,
            });
        }

        let mut stored = consent.clone();
        stored.version = consent.version + 1;
        let version = stored.version;
        consents.insert(stored.id.clone(), stored);
        Ok(version)
    }

    async fn non_rejected_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .consents
            .read()
            .await
            .values()
            .filter(|c| !c.is_rejected())
            .map(|c| c.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// sea-orm backed store over the `consents` table.
#[derive(Debug, Clone)]
pub struct DbConsentStore {
    db: DatabaseConnection,
}

impl DbConsentStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn to_active_model(
    consent: &Consent,
    version: u64,
) -> Result<entities::consent::ActiveModel, StoreError> {
    Ok(entities::consent::ActiveModel {
        id: Set(consent.id.clone()),
        status: Set(consent.status.as_str().to_string()),
        user_id: Set(consent.user_id.clone()),
        business_id: Set(consent.business_id.clone()),
        client_id: Set(consent.client_id.clone()),
        permissions: Set(serde_json::to_string(&consent.permissions)?),
        created_at: Set(consent.created_at.timestamp()),
        status_updated_at: Set(consent.status_updated_at.timestamp()),
        expires_at: Set(consent.expires_at.map(|t| t.timestamp())),
        rejected_by: Set(consent.rejection.map(|r| r.rejected_by.as_str().to_string())),
        rejection_reason: Set(consent.rejection.map(|r| r.reason.as_str().to_string())),
        extensions: Set(serde_json::to_string(&consent.extensions)?),
        resources: Set(serde_json::to_string(&consent.resources)?),
        version: Set(version as i64),
    })
}

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("{field} out of range: {secs}")))
}

fn from_model(model: entities::consent::Model) -> Result<Consent, StoreError> {
    let status: Status = model.status.parse().map_err(StoreError::Corrupt)?;
    let rejection = match (model.rejected_by, model.rejection_reason) {
        (Some(by), Some(reason)) => Some(RejectionInfo::new(
            by.parse().map_err(StoreError::Corrupt)?,
            reason.parse().map_err(StoreError::Corrupt)?,
        )),
        (None, None) => None,
        _ => {
            return Err(StoreError::Corrupt(format!(
                "consent {} has a partial rejection record",
                model.id
            )))
        }
    };
    let resources: ResourceBindings = serde_json::from_str(&model.resources)?;

    Ok(Consent {
        status,
        user_id: model.user_id,
        business_id: model.business_id,
        client_id: model.client_id,
        permissions: serde_json::from_str(&model.permissions)?,
        created_at: timestamp(model.created_at, "created_at")?,
        status_updated_at: timestamp(model.status_updated_at, "status_updated_at")?,
        expires_at: model
            .expires_at
            .map(|t| timestamp(t, "expires_at"))
            .transpose()?,
        rejection,
        extensions: serde_json::from_str(&model.extensions)?,
        resources,
        version: u64::try_from(model.version)
            .map_err(|_| StoreError::Corrupt(format!("negative version on {}", model.id)))?,
        id: model.id,
    })
}

#[async_trait]
impl ConsentStore for DbConsentStore {
    async fn get(&self, id: &str) -> Result<Option<Consent>, StoreError> {
        use entities::consent::{Column, Entity};

        Entity::find()
            .filter(Column::Id.eq(id))
            .one(&self.db)
            .await?
            .map(from_model)
            .transpose()
    }

    async fn put(&self, consent: &Consent) -> Result<u64, StoreError> {
        use entities::consent::{Column, Entity};

        let next = consent.version + 1;
        let model = to_active_model(consent, next)?;
        let conflict = || StoreError::Conflict {
            id: consent.id.clone(),
            version: consent.version,
        };

        if consent.version == 0 {
            return match Entity::insert(model).exec(&self.db).await {
                Ok(_) => Ok(next),
                Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                    Err(conflict())
                }
                Err(err) => Err(err.into()),
            };
        }

        let result = Entity::update_many()
            .set(model)
            .filter(Column::Id.eq(consent.id.as_str()))
            .filter(Column::Version.eq(consent.version as i64))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(conflict());
        }
        Ok(next)
    }

    async fn non_rejected_ids(&self) -> Result<Vec<String>, StoreError> {
        use entities::consent::{Column, Entity};

        let ids = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::Status.ne(Status::Rejected.as_str()))
            .into_tuple::<String>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }
}
