use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use lodestar::catalog::load_catalog;
use lodestar::clock::ManualClock;
use lodestar::consent::{ConsentDraft, ConsentEngine, EngineOptions, JointAccounts, Permission};
use lodestar::storage::{ConsentStore, DbConsentStore, MemoryConsentStore};
use sea_orm::DatabaseConnection;

pub const USER: &str = "76109277673";
pub const JOINT_USER: &str = "96362357086";
pub const CLIENT: &str = "client-a";

/// Noon, 1 March 2025.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Builder for consent engines over a manual clock
pub struct EngineBuilder {
    options: EngineOptions,
    store: Option<Arc<dyn ConsentStore>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            options: EngineOptions {
                joint_accounts: JointAccounts::new([JOINT_USER], Duration::seconds(30)),
                ..EngineOptions::default()
            },
            store: None,
        }
    }

    pub fn with_db(mut self, db: &DatabaseConnection) -> Self {
        self.store = Some(Arc::new(DbConsentStore::new(db.clone())));
        self
    }

    pub fn revalidate_narrowed_permissions(mut self) -> Self {
        self.options.revalidate_narrowed_permissions = true;
        self
    }

    pub fn build(self) -> (ConsentEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryConsentStore::new()));
        let engine = ConsentEngine::new(
            store,
            clock.clone(),
            Arc::new(load_catalog(None).expect("Failed to load built-in catalog")),
            self.options,
        );
        (engine, clock)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for consent requests
pub struct ConsentBuilder {
    draft: ConsentDraft,
}

impl ConsentBuilder {
    pub fn new() -> Self {
        Self {
            draft: ConsentDraft {
                user_id: USER.to_string(),
                business_id: None,
                client_id: CLIENT.to_string(),
                permissions: ["ACCOUNTS_READ", "ACCOUNTS_BALANCES_READ", "RESOURCES_READ"]
                    .into_iter()
                    .map(Permission::from)
                    .collect(),
                expires_at: None,
            },
        }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.draft.user_id = user_id.to_string();
        self
    }

    pub fn business(mut self, business_id: &str) -> Self {
        self.draft.business_id = Some(business_id.to_string());
        self
    }

    pub fn client(mut self, client_id: &str) -> Self {
        self.draft.client_id = client_id.to_string();
        self
    }

    pub fn permissions(mut self, permissions: &[&str]) -> Self {
        self.draft.permissions = permissions.iter().map(|p| Permission::from(*p)).collect();
        self
    }

    pub fn expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.draft.expires_at = Some(expires_at);
        self
    }

    pub fn build(self) -> ConsentDraft {
        self.draft
    }
}

impl Default for ConsentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
