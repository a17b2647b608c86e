//! Policy Checks
//!
//! Read-only comparisons of account state against the expected baseline.
//! Every deviation becomes a [`Finding`] delivered to a [`FindingSink`];
//! API failures are returned to the scheduler and fail only their unit.

pub mod config;
pub mod iam;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::aws::ServiceFactory;
use crate::config::AuditConfig;
use crate::scheduler::{CheckKind, UnitWorker, WorkUnit};

/// `"{name} ({id}) - {LABEL} -"`, followed by `" {region} -"` for regional work
pub fn log_prefix(
    account_name: &str,
    account_id: &str,
    label: impl fmt::Display,
    region: Option<&str>,
) -> String {
    match region {
        Some(region) => format!("{} ({}) - {} - {} -", account_name, account_id, label, region),
        None => format!("{} ({}) - {} -", account_name, account_id, label),
    }
}

/// Where a check is running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub account_id: String,
    pub account_name: String,
    pub check: CheckKind,
    pub region: Option<String>,
}

impl Scope {
    pub fn for_unit(unit: &WorkUnit) -> Self {
        Self {
            account_id: unit.account.id.clone(),
            account_name: unit.account.name.clone(),
            check: unit.check,
            region: unit.region.clone(),
        }
    }

    pub fn prefix(&self) -> String {
        log_prefix(
            &self.account_name,
            &self.account_id,
            self.check,
            self.region.as_deref(),
        )
    }

    pub fn finding(&self, message: impl Into<String>) -> Finding {
        Finding {
            account_id: self.account_id.clone(),
            account_name: self.account_name.clone(),
            check: self.check,
            region: self.region.clone(),
            message: message.into(),
        }
    }
}

/// A detected deviation from the expected baseline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub account_id: String,
    pub account_name: String,
    pub check: CheckKind,
    pub region: Option<String>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            log_prefix(
                &self.account_name,
                &self.account_id,
                self.check,
                self.region.as_deref()
            ),
            self.message
        )
    }
}

/// Destination for findings. Shared by all units, so it must be internally synchronized.
pub trait FindingSink: Send + Sync {
    fn record(&self, finding: Finding);

    /// Findings recorded so far
    fn count(&self) -> usize;
}

/// Logs each finding at `warn`
#[derive(Debug, Default)]
pub struct TracingSink {
    recorded: AtomicUsize,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FindingSink for TracingSink {
    fn record(&self, finding: Finding) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
        warn!(
            account_id = %finding.account_id,
            region = finding.region.as_deref().unwrap_or("global"),
            check = %finding.check,
            "{}",
            finding
        );
    }

    fn count(&self) -> usize {
        self.recorded.load(Ordering::Relaxed)
    }
}

/// Runs the policy check named by each unit's [`CheckKind`]
pub struct AuditWorker {
    factory: Arc<dyn ServiceFactory>,
    config: Arc<AuditConfig>,
    sink: Arc<dyn FindingSink>,
}

impl AuditWorker {
    pub fn new(
        factory: Arc<dyn ServiceFactory>,
        config: Arc<AuditConfig>,
        sink: Arc<dyn FindingSink>,
    ) -> Self {
        Self {
            factory,
            config,
            sink,
        }
    }
}

#[async_trait]
impl UnitWorker for AuditWorker {
    async fn run(&self, unit: WorkUnit) -> anyhow::Result<()> {
        let scope = Scope::for_unit(&unit);
        if unit.identity.is_expired() {
            anyhow::bail!("{} Credentials expired before the unit started", scope.prefix());
        }
        // Global checks are issued against the home region endpoint
        let region = unit
            .region
            .clone()
            .unwrap_or_else(|| self.config.home_region.clone());

        match unit.check {
            CheckKind::Config => {
                let api = self.factory.config_service(&unit.identity, &region);
                config::audit_config(api.as_ref(), &scope, &self.config, self.sink.as_ref()).await?;
            }
            CheckKind::Iam => {
                let api = self.factory.iam(&unit.identity, &region);
                iam::audit_iam(
                    api.as_ref(),
                    &scope,
                    &self.config.iam,
                    self.sink.as_ref(),
                )
                .await?;
            }
        }

        Ok(())
    }
}
