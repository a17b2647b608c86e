//! AWS Organization Auditor Library
//!
//! Assumes a read-only role in every active member account of an AWS
//! Organization and checks AWS Config and IAM against the Control Tower
//! baseline. Findings are logged, never acted on.

pub mod auditor;
pub mod aws;
pub mod checks;
pub mod config;
pub mod credentials;
pub mod error;
pub mod health;
pub mod organizations;
pub mod pagination;
pub mod scheduler;

pub use auditor::{Auditor, RunSummary};
pub use aws::{AwsServiceFactory, ServiceFactory};
pub use checks::{AuditWorker, Finding, FindingSink, TracingSink};
pub use config::AuditConfig;
pub use credentials::{CredentialBroker, Identity, RoleAssumer};
pub use error::{AuditError, BoxError};
pub use organizations::{Account, AccountDirectory, AccountStatus};
pub use pagination::{drain, DrainError, Page};
pub use scheduler::{BarrierReport, CheckKind, FanOut, RunReport, UnitPlan, UnitWorker, WorkUnit};
