//! Lodestar - Open Finance consent service
//!
//! Consent lifecycle (create, authorize, reject, extend, expire) and the
//! permission checks resource servers run against a consent. The HTTP
//! surface lives in [`web`]; everything below it is usable on its own.

pub mod caller;
pub mod catalog;
pub mod clock;
pub mod consent;
pub mod entities;
pub mod errors;
pub mod jobs;
pub mod policy;
pub mod settings;
pub mod storage;
pub mod web;
