//! AWS Config baseline check
//!
//! Control Tower expects exactly one recorder named `default`, recording
//! all supported resources (global types included) with the landing zone's
//! recorder role, delivering to the central log archive bucket and SNS
//! topic. The Audit account additionally hosts the guardrails aggregator.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tracing::debug;

use super::{FindingSink, Scope};
use crate::config::AuditConfig;
use crate::error::BoxError;
use crate::pagination::{drain, Page};

/// AWS Config supports a single recorder with this name
pub const DEFAULT_RECORDER_NAME: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderInfo {
    pub name: String,
    pub role_arn: Option<String>,
    pub all_supported: bool,
    pub include_global_resource_types: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderStatus {
    pub name: String,
    pub recording: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryChannelInfo {
    pub name: String,
    pub s3_bucket_name: Option<String>,
    pub sns_topic_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorInfo {
    pub name: String,
}

/// Seam over the AWS Config service in one account and region
#[async_trait]
pub trait ConfigServiceApi: Send + Sync {
    async fn describe_recorders(&self) -> Result<Vec<RecorderInfo>, BoxError>;

    async fn describe_recorder_status(&self) -> Result<Vec<RecorderStatus>, BoxError>;

    async fn describe_delivery_channels(&self) -> Result<Vec<DeliveryChannelInfo>, BoxError>;

    async fn list_aggregators(&self, next_token: Option<String>) -> Result<Page<AggregatorInfo>, BoxError>;
}

/// Compare the Config setup in `scope` against `config`, returning the number of findings
pub async fn audit_config(
    api: &dyn ConfigServiceApi,
    scope: &Scope,
    config: &AuditConfig,
    sink: &dyn FindingSink,
) -> anyhow::Result<usize> {
    let region = scope
        .region
        .as_deref()
        .ok_or_else(|| anyhow!("{} Config check requires a region", scope.prefix()))?;

    let recorders = api
        .describe_recorders()
        .await
        .map_err(|e| anyhow!(e))
        .context("Error describing configuration recorders")?;

    if recorders.is_empty() {
        sink.record(scope.finding("No configuration recorders found"));
        return Ok(1);
    }

    let recorder = match recorders.as_slice() {
        [only] if only.name == DEFAULT_RECORDER_NAME => only,
        other => {
            sink.record(scope.finding(format!(
                "Expected a single recorder named \"{}\", found {}",
                DEFAULT_RECORDER_NAME,
                other.len()
            )));
            return Ok(1);
        }
    };

    // Each deviation is recorded as soon as it is observed, so a later API
    // failure keeps what was already found
    let mut count = 0;
    let mut report = |message: &str| {
        sink.record(scope.finding(message));
        count += 1;
    };

    let statuses = api
        .describe_recorder_status()
        .await
        .map_err(|e| anyhow!(e))
        .context("Error describing configuration recorder status")?;
    let recording = statuses
        .iter()
        .find(|s| s.name == recorder.name)
        .is_some_and(|s| s.recording);
    if !recording {
        report("Recording is off");
    }

    if !(recorder.all_supported && recorder.include_global_resource_types) {
        report("All supported resources is not enabled, or global resources not included");
    }

    let expected_role = config.expected_recorder_role_arn(&scope.account_id);
    if recorder.role_arn.as_deref() != Some(expected_role.as_str()) {
        debug!(expected = %expected_role, actual = ?recorder.role_arn, "{} Recorder role mismatch", scope.prefix());
        report("Using an incorrect role");
    }

    let channels = api
        .describe_delivery_channels()
        .await
        .map_err(|e| anyhow!(e))
        .context("Error describing delivery channels")?;
    match channels.first() {
        None => report("No delivery channels found"),
        Some(channel) => {
            if channel.s3_bucket_name.as_deref() != Some(config.config.s3_bucket_name.as_str()) {
                report("Using an incorrect delivery configuration for S3");
            }
            let expected_topic = config.expected_sns_topic_arn(region);
            if channel.sns_topic_arn.as_deref() != Some(expected_topic.as_str()) {
                report("Using an incorrect SNS topic for delivery notifications");
            }
        }
    }

    if scope.account_id == config.audit_account_id {
        let aggregators = drain(|token| api.list_aggregators(token))
            .await
            .map_err(|e| anyhow!(e.source))
            .context("Error describing configuration aggregators")?;

        match aggregators.as_slice() {
            [] => report("No configuration aggregator found"),
            [only] if only.name != config.config.aggregator_name => {
                report("Aggregator has an incorrect name")
            }
            [_] => {}
            _ => report("More than one aggregator is defined"),
        }
    }

    Ok(count)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::checks::tests::{scope, MemorySink};
    use crate::scheduler::CheckKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MEMBER: &str = "797979728091";
    const AUDIT: &str = "984217156667";
    const REGION: &str = "eu-west-1";

    /// Serves canned Config responses and counts calls
    pub(crate) struct FakeConfigService {
        pub recorders: Vec<RecorderInfo>,
        pub statuses: Vec<RecorderStatus>,
        pub channels: Vec<DeliveryChannelInfo>,
        pub aggregators: Vec<AggregatorInfo>,
        pub fail_recorders: bool,
        pub fail_channels: bool,
        pub fail_aggregators: bool,
        pub calls: AtomicUsize,
    }

    impl FakeConfigService {
        /// A landing-zone compliant setup for `account_id` in `region`
        pub fn compliant(account_id: &str, region: &str) -> Self {
            let config = AuditConfig::default();
            Self {
                recorders: vec![RecorderInfo {
                    name: "default".to_string(),
                    role_arn: Some(config.expected_recorder_role_arn(account_id)),
                    all_supported: true,
                    include_global_resource_types: true,
                }],
                statuses: vec![RecorderStatus {
                    name: "default".to_string(),
                    recording: true,
                }],
                channels: vec![DeliveryChannelInfo {
                    name: "default".to_string(),
                    s3_bucket_name: Some(config.config.s3_bucket_name.clone()),
                    sns_topic_arn: Some(config.expected_sns_topic_arn(region)),
                }],
                aggregators: vec![AggregatorInfo {
                    name: config.config.aggregator_name.clone(),
                }],
                fail_recorders: false,
                fail_channels: false,
                fail_aggregators: false,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn empty() -> Self {
            Self {
                recorders: Vec::new(),
                statuses: Vec::new(),
                channels: Vec::new(),
                aggregators: Vec::new(),
                fail_recorders: false,
                fail_channels: false,
                fail_aggregators: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ConfigServiceApi for FakeConfigService {
        async fn describe_recorders(&self) -> Result<Vec<RecorderInfo>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_recorders {
                return Err("AccessDeniedException".into());
            }
            Ok(self.recorders.clone())
        }

        async fn describe_recorder_status(&self) -> Result<Vec<RecorderStatus>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.statuses.clone())
        }

        async fn describe_delivery_channels(&self) -> Result<Vec<DeliveryChannelInfo>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_channels {
                return Err("AccessDeniedException".into());
            }
            Ok(self.channels.clone())
        }

        async fn list_aggregators(
            &self,
            next_token: Option<String>,
        ) -> Result<Page<AggregatorInfo>, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_aggregators {
                return Err("ThrottlingException".into());
            }
            // One aggregator per page
            let index: usize = next_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let items = self.aggregators.get(index).cloned().into_iter().collect();
            let next = (index + 1 < self.aggregators.len()).then(|| (index + 1).to_string());
            Ok(Page::new(items, next))
        }
    }

    async fn run(api: &FakeConfigService, account_id: &str) -> (usize, Vec<String>) {
        let sink = MemorySink::default();
        let scope = scope(account_id, CheckKind::Config, Some(REGION));
        let count = audit_config(api, &scope, &AuditConfig::default(), &sink)
            .await
            .unwrap();
        (count, sink.messages())
    }

    #[tokio::test]
    async fn test_no_recorders_is_single_finding() {
        let api = FakeConfigService::empty();

        let (count, messages) = run(&api, MEMBER).await;

        assert_eq!(count, 1);
        assert_eq!(messages, vec!["No configuration recorders found"]);
        // Nothing else is queried
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compliant_member_has_no_findings() {
        let api = FakeConfigService::compliant(MEMBER, REGION);

        let (count, messages) = run(&api, MEMBER).await;

        assert_eq!(count, 0);
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_recorder_name() {
        let mut api = FakeConfigService::compliant(MEMBER, REGION);
        api.recorders[0].name = "custom".to_string();

        let (_, messages) = run(&api, MEMBER).await;

        assert_eq!(messages, vec!["Expected a single recorder named \"default\", found 1"]);
    }

    #[tokio::test]
    async fn test_each_deviation_is_reported() {
        let mut api = FakeConfigService::compliant(MEMBER, REGION);
        api.statuses[0].recording = false;
        api.recorders[0].include_global_resource_types = false;
        api.recorders[0].role_arn = Some("arn:aws:iam::797979728091:role/SomethingElse".to_string());
        api.channels[0].s3_bucket_name = Some("my-own-bucket".to_string());
        api.channels[0].sns_topic_arn = None;

        let (count, messages) = run(&api, MEMBER).await;

        assert_eq!(count, 5);
        assert_eq!(
            messages,
            vec![
                "Recording is off",
                "All supported resources is not enabled, or global resources not included",
                "Using an incorrect role",
                "Using an incorrect delivery configuration for S3",
                "Using an incorrect SNS topic for delivery notifications",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_status_and_channels() {
        let mut api = FakeConfigService::compliant(MEMBER, REGION);
        api.statuses.clear();
        api.channels.clear();

        let (_, messages) = run(&api, MEMBER).await;

        assert_eq!(messages, vec!["Recording is off", "No delivery channels found"]);
    }

    #[tokio::test]
    async fn test_aggregator_only_checked_in_audit_account() {
        let mut api = FakeConfigService::compliant(MEMBER, REGION);
        api.aggregators.clear();

        let (count, _) = run(&api, MEMBER).await;
        assert_eq!(count, 0);

        let mut api = FakeConfigService::compliant(AUDIT, REGION);
        api.aggregators.clear();

        let (_, messages) = run(&api, AUDIT).await;
        assert_eq!(messages, vec!["No configuration aggregator found"]);
    }

    #[tokio::test]
    async fn test_aggregator_deviations_in_audit_account() {
        let mut api = FakeConfigService::compliant(AUDIT, REGION);
        api.aggregators[0].name = "my-aggregator".to_string();
        let (_, messages) = run(&api, AUDIT).await;
        assert_eq!(messages, vec!["Aggregator has an incorrect name"]);

        let mut api = FakeConfigService::compliant(AUDIT, REGION);
        api.aggregators.push(AggregatorInfo {
            name: "second".to_string(),
        });
        let (_, messages) = run(&api, AUDIT).await;
        assert_eq!(messages, vec!["More than one aggregator is defined"]);

        let api = FakeConfigService::compliant(AUDIT, REGION);
        let (count, _) = run(&api, AUDIT).await;
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_api_failure_is_error_not_finding() {
        let mut api = FakeConfigService::compliant(MEMBER, REGION);
        api.fail_recorders = true;
        let sink = MemorySink::default();
        let scope = scope(MEMBER, CheckKind::Config, Some(REGION));

        let err = audit_config(&api, &scope, &AuditConfig::default(), &sink)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("AccessDeniedException"));
        assert!(sink.messages().is_empty());
    }

    #[tokio::test]
    async fn test_findings_kept_when_delivery_channels_fail() {
        let mut api = FakeConfigService::compliant(MEMBER, REGION);
        api.statuses[0].recording = false;
        api.recorders[0].role_arn = None;
        api.fail_channels = true;
        let sink = MemorySink::default();
        let scope = scope(MEMBER, CheckKind::Config, Some(REGION));

        let err = audit_config(&api, &scope, &AuditConfig::default(), &sink)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Error describing delivery channels"));
        assert_eq!(sink.messages(), vec!["Recording is off", "Using an incorrect role"]);
    }

    #[tokio::test]
    async fn test_findings_kept_when_aggregator_listing_fails() {
        let mut api = FakeConfigService::compliant(AUDIT, REGION);
        api.channels[0].s3_bucket_name = Some("my-own-bucket".to_string());
        api.fail_aggregators = true;
        let sink = MemorySink::default();
        let scope = scope(AUDIT, CheckKind::Config, Some(REGION));

        let err = audit_config(&api, &scope, &AuditConfig::default(), &sink)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("ThrottlingException"));
        assert_eq!(
            sink.messages(),
            vec!["Using an incorrect delivery configuration for S3"]
        );
    }
}
