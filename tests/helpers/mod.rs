#![allow(dead_code)]

pub mod builders;
pub mod db;

pub use builders::{ConsentBuilder, EngineBuilder};
pub use db::TestDb;
