//! Bounded Fan-Out Scheduler
//!
//! Accounts are processed one at a time. Inside an account, one work unit
//! per region (and per check kind) runs on a tokio task, admitted through a
//! shared semaphore of `limit` permits. [`FanOut::run_barrier`] returns only
//! after every admitted unit has finished, so no unit ever overlaps the next
//! account's pass.
//!
//! A unit that errors, panics, or exceeds its deadline is logged and counted
//! as failed. Its siblings and later accounts are unaffected.

use anyhow::anyhow;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};
use tracing::{debug, error, info};

use crate::checks::log_prefix;
use crate::config::DEFAULT_CONCURRENCY;
use crate::credentials::{CredentialBroker, Identity};
use crate::organizations::Account;

/// Kind of audit a work unit performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckKind {
    /// AWS Config recorder/delivery/aggregator baseline (regional)
    Config,
    /// IAM users and roles (global)
    Iam,
}

impl CheckKind {
    pub fn is_regional(&self) -> bool {
        matches!(self, CheckKind::Config)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Config => write!(f, "CONFIG"),
            CheckKind::Iam => write!(f, "IAM"),
        }
    }
}

/// The smallest schedulable piece of audit work
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub account: Account,
    /// `None` for global checks
    pub region: Option<String>,
    pub check: CheckKind,
    /// This unit's own copy of the account's credentials
    pub identity: Identity,
}

impl WorkUnit {
    pub fn prefix(&self) -> String {
        log_prefix(
            &self.account.name,
            &self.account.id,
            self.check,
            self.region.as_deref(),
        )
    }
}

/// Executes one work unit. Implemented by the policy checks.
#[async_trait]
pub trait UnitWorker: Send + Sync + 'static {
    async fn run(&self, unit: WorkUnit) -> anyhow::Result<()>;
}

/// Which units to create for each account
#[derive(Debug, Clone)]
pub struct UnitPlan {
    pub regions: Vec<String>,
    pub checks: Vec<CheckKind>,
}

impl UnitPlan {
    pub fn new(regions: Vec<String>, checks: Vec<CheckKind>) -> Self {
        Self { regions, checks }
    }

    /// One unit per region for regional checks, one per account for global ones
    pub fn units(&self, account: &Account, identity: &Identity) -> Vec<WorkUnit> {
        let mut units = Vec::new();

        for check in &self.checks {
            if check.is_regional() {
                for region in &self.regions {
                    units.push(WorkUnit {
                        account: account.clone(),
                        region: Some(region.clone()),
                        check: *check,
                        identity: identity.clone(),
                    });
                }
            } else {
                units.push(WorkUnit {
                    account: account.clone(),
                    region: None,
                    check: *check,
                    identity: identity.clone(),
                });
            }
        }

        units
    }
}

/// A unit that did not complete successfully
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub unit: String,
    pub error: String,
}

/// Outcome of one account barrier
#[derive(Debug, Clone, Default, Serialize)]
pub struct BarrierReport {
    pub account_id: String,
    pub completed: usize,
    pub failed: Vec<UnitFailure>,
}

impl BarrierReport {
    pub fn total(&self) -> usize {
        self.completed + self.failed.len()
    }
}

/// An account whose pass never started
#[derive(Debug, Clone, Serialize)]
pub struct SkippedAccount {
    pub account_id: String,
    pub account_name: String,
    pub reason: String,
}

/// Outcome of a sequential pass over all accounts
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub audited: Vec<BarrierReport>,
    pub skipped: Vec<SkippedAccount>,
}

impl RunReport {
    pub fn units_completed(&self) -> usize {
        self.audited.iter().map(|b| b.completed).sum()
    }

    pub fn units_failed(&self) -> usize {
        self.audited.iter().map(|b| b.failed.len()).sum()
    }
}

/// Semaphore-bounded task pool with a per-account join barrier
pub struct FanOut {
    semaphore: Arc<Semaphore>,
    limit: usize,
    unit_timeout: Option<Duration>,
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl FanOut {
    /// A pool admitting at most `limit` concurrent units (minimum 1)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            unit_timeout: None,
        }
    }

    /// Fail any unit still running after `timeout`
    pub fn with_unit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `units` with bounded concurrency and wait for all of them
    ///
    /// Admission blocks until a permit is free. The returned report covers
    /// every unit passed in.
    pub async fn run_barrier(&self, units: Vec<WorkUnit>, worker: Arc<dyn UnitWorker>) -> BarrierReport {
        let mut report = BarrierReport {
            account_id: units
                .first()
                .map(|u| u.account.id.clone())
                .unwrap_or_default(),
            ..Default::default()
        };
        let mut tasks = JoinSet::new();
        let mut labels: HashMap<task::Id, String> = HashMap::new();

        for unit in units {
            let label = unit.prefix();

            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("{} Unit not admitted: {}", label, e);
                    report.failed.push(UnitFailure {
                        unit: label,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let worker = worker.clone();
            let timeout = self.unit_timeout;

            let task_label = label.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                debug!("{} Unit started", task_label);

                let outcome = AssertUnwindSafe(run_unit(worker, unit, timeout))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(anyhow!("unit panicked: {}", panic_message(&*panic))));

                debug!(elapsed = ?started.elapsed(), "{} Unit finished", task_label);
                outcome
            });
            labels.insert(handle.id(), label);
        }

        // Barrier: reap every admitted unit before returning
        while let Some(joined) = tasks.join_next_with_id().await {
            record_joined(&mut report, &mut labels, joined);
        }

        report
    }

    /// Audit `accounts` one after another
    ///
    /// Each account gets a fresh identity from the broker. An account whose
    /// role cannot be assumed is logged and skipped; the run continues.
    pub async fn run_per_account(
        &self,
        accounts: &[Account],
        plan: &UnitPlan,
        broker: &CredentialBroker,
        role_name: &str,
        worker: Arc<dyn UnitWorker>,
    ) -> RunReport {
        let mut report = RunReport::default();

        for account in accounts {
            let prefix = log_prefix(&account.name, &account.id, "STS", None);

            let identity = match broker.assume(&account.id, role_name).await {
                Ok(identity) => identity,
                Err(e) => {
                    error!("{} Skipping account: {}", prefix, e);
                    report.skipped.push(SkippedAccount {
                        account_id: account.id.clone(),
                        account_name: account.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let units = plan.units(account, &identity);
            info!(
                account_id = %account.id,
                units = units.len(),
                concurrency = self.limit,
                "Auditing {} account",
                account.name
            );

            let barrier = self.run_barrier(units, worker.clone()).await;
            info!(
                account_id = %account.id,
                completed = barrier.completed,
                failed = barrier.failed.len(),
                "Finished {} account",
                account.name
            );
            report.audited.push(barrier);
        }

        report
    }
}

/// Account one reaped unit, naming it by the label it was spawned with
fn record_joined(
    report: &mut BarrierReport,
    labels: &mut HashMap<task::Id, String>,
    joined: Result<(task::Id, anyhow::Result<()>), JoinError>,
) {
    match joined {
        Ok((id, Ok(()))) => {
            labels.remove(&id);
            report.completed += 1;
        }
        Ok((id, Err(e))) => {
            let label = labels.remove(&id).unwrap_or_else(|| report.account_id.clone());
            error!("{} {:#}", label, e);
            report.failed.push(UnitFailure {
                unit: label,
                error: format!("{:#}", e),
            });
        }
        Err(e) => {
            let label = labels
                .remove(&e.id())
                .unwrap_or_else(|| report.account_id.clone());
            error!("{} Unit task aborted: {}", label, e);
            report.failed.push(UnitFailure {
                unit: label,
                error: e.to_string(),
            });
        }
    }
}

async fn run_unit(
    worker: Arc<dyn UnitWorker>,
    unit: WorkUnit,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, worker.run(unit))
            .await
            .unwrap_or_else(|_| Err(anyhow!("unit timed out after {:?}", limit))),
        None => worker.run(unit).await,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
