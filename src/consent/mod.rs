pub mod engine;
pub mod errors;
pub mod gating;
pub mod lifecycle;
pub mod page;
pub mod types;
pub mod validation;

pub use engine::{ConsentEngine, EngineOptions, SweepReport, MAX_ATTEMPTS};
pub use errors::{ConsentError, ExtensionDenial};
pub use gating::{JointAccounts, ResourceKind};
pub use page::{Page, Pagination};
pub use types::*;
