pub mod consent;
pub mod job_execution;

pub use consent::Entity as Consent;
pub use job_execution::Entity as JobExecution;
