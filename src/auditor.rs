//! Run Driver
//!
//! One audit run: enter the organization account, discover member accounts,
//! then audit every member except the management account through the
//! fan-out scheduler.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aws::ServiceFactory;
use crate::checks::{AuditWorker, FindingSink};
use crate::config::AuditConfig;
use crate::credentials::CredentialBroker;
use crate::error::AuditError;
use crate::organizations::{list_active_accounts, management_account_id};
use crate::scheduler::{CheckKind, FanOut, RunReport, SkippedAccount, UnitPlan, UnitWorker};

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub accounts_discovered: usize,
    pub management_account_id: String,
    pub accounts_audited: usize,
    pub accounts_skipped: Vec<SkippedAccount>,
    pub units_completed: usize,
    pub units_failed: usize,
    pub findings: usize,
}

pub struct Auditor {
    config: Arc<AuditConfig>,
    broker: CredentialBroker,
    factory: Arc<dyn ServiceFactory>,
    sink: Arc<dyn FindingSink>,
    worker: Arc<dyn UnitWorker>,
}

impl Auditor {
    pub fn new(
        config: Arc<AuditConfig>,
        broker: CredentialBroker,
        factory: Arc<dyn ServiceFactory>,
        sink: Arc<dyn FindingSink>,
    ) -> Self {
        let worker = Arc::new(AuditWorker::new(factory.clone(), config.clone(), sink.clone()));
        Self {
            config,
            broker,
            factory,
            sink,
            worker,
        }
    }

    /// Replace the policy checks with another unit worker
    pub fn with_worker(mut self, worker: Arc<dyn UnitWorker>) -> Self {
        self.worker = worker;
        self
    }

    /// Execute one full audit run
    ///
    /// Fails only if the organization account cannot be entered or the
    /// account list cannot be obtained.
    pub async fn run(&self) -> Result<RunSummary, AuditError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("audit_run", run_id = %run_id);
        self.execute(run_id).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunSummary, AuditError> {
        let config = &self.config;
        let findings_before = self.sink.count();

        info!(
            organization_account_id = %config.organization_account_id,
            regions = config.regions.len(),
            concurrency = config.concurrency,
            "Starting audit run"
        );

        let (directory, management_id) = {
            let root = self
                .broker
                .assume(&config.organization_account_id, &config.auditor_role_name)
                .await?;
            let organizations = self.factory.organizations(&root, &config.home_region);

            let directory = list_active_accounts(organizations.as_ref()).await?;
            let management_id = management_account_id(organizations.as_ref()).await?;
            (directory, management_id)
        };

        if management_id != config.organization_account_id {
            warn!(
                management_account_id = %management_id,
                organization_account_id = %config.organization_account_id,
                "Organization account is not the management account"
            );
        }

        match directory.get(&management_id) {
            Some(account) => info!(
                management_account_id = %management_id,
                "Excluding {} account from the audit",
                account.name
            ),
            None => warn!(
                management_account_id = %management_id,
                "Management account is not among the active accounts"
            ),
        }

        let targets = directory.without(&management_id);
        info!(
            discovered = directory.len(),
            targets = targets.len(),
            "Discovered member accounts"
        );

        let plan = UnitPlan::new(config.regions.clone(), vec![CheckKind::Config, CheckKind::Iam]);
        let fanout = FanOut::new(config.concurrency).with_unit_timeout(config.unit_timeout());

        let report: RunReport = fanout
            .run_per_account(
                &targets,
                &plan,
                &self.broker,
                &config.auditor_role_name,
                self.worker.clone(),
            )
            .await;

        let summary = RunSummary {
            run_id,
            accounts_discovered: directory.len(),
            management_account_id: management_id,
            accounts_audited: report.audited.len(),
            units_completed: report.units_completed(),
            units_failed: report.units_failed(),
            accounts_skipped: report.skipped,
            findings: self.sink.count().saturating_sub(findings_before),
        };

        info!(
            accounts_audited = summary.accounts_audited,
            accounts_skipped = summary.accounts_skipped.len(),
            units_completed = summary.units_completed,
            units_failed = summary.units_failed,
            findings = summary.findings,
            "Audit run finished"
        );

        Ok(summary)
    }
}
