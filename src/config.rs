//! Audit configuration
//!
//! Every value has a compiled-in default matching the Control Tower landing
//! zone this auditor was written for. A JSON file can override any subset.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::AuditError;

/// Default number of concurrent work units per account
pub const DEFAULT_CONCURRENCY: usize = 10;

const DEFAULT_REGIONS: [&str; 17] = [
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-central-1",
    "eu-north-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
    "sa-east-1",
];

/// Top-level auditor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Account that owns the organization (ListAccounts is issued from here)
    pub organization_account_id: String,
    /// Control Tower Audit account, the only one expected to host an aggregator
    pub audit_account_id: String,
    /// Regions to audit
    pub regions: Vec<String>,
    /// Region pinned for organization-wide APIs and IAM
    pub home_region: String,
    /// ARN partition (aws, aws-us-gov, aws-cn)
    pub partition: String,
    /// Cross-account role with read-only access
    pub auditor_role_name: String,
    /// RoleSessionName sent with every AssumeRole
    pub session_name: String,
    /// Optional session duration override in seconds
    pub session_duration_secs: Option<i32>,
    /// Maximum concurrent work units
    pub concurrency: usize,
    /// Optional deadline for a single work unit
    pub unit_timeout_secs: Option<u64>,
    /// Expected AWS Config settings
    pub config: ConfigExpectations,
    /// Expected IAM settings
    pub iam: IamExpectations,
    /// Address fetched by the health endpoint
    pub health_check_address: String,
}

/// Expected AWS Config baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigExpectations {
    pub aggregator_name: String,
    /// Role the recorder must use. Must exist in every account with
    /// ReadOnlyAccess and AWS_ConfigRole attached.
    pub recorder_role_name: String,
    /// Archival bucket in the Log archive account
    pub s3_bucket_name: String,
    /// Account which owns the delivery SNS topic
    pub sns_topic_account_id: String,
    pub sns_topic_name: String,
}

/// Expected IAM baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IamExpectations {
    /// Role name substrings that are managed by AWS or Control Tower
    pub excluded_role_patterns: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            organization_account_id: "665735848255".to_string(),
            audit_account_id: "984217156667".to_string(),
            regions: DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect(),
            home_region: "us-east-1".to_string(),
            partition: "aws".to_string(),
            auditor_role_name: "aws-controltower-ReadOnlyExecutionRole".to_string(),
            session_name: "sam-aws-auditor".to_string(),
            session_duration_secs: None,
            concurrency: DEFAULT_CONCURRENCY,
            unit_timeout_secs: None,
            config: ConfigExpectations::default(),
            iam: IamExpectations::default(),
            health_check_address: "https://checkip.amazonaws.com".to_string(),
        }
    }
}

impl Default for ConfigExpectations {
    fn default() -> Self {
        Self {
            aggregator_name: "aws-controltower-GuardrailsComplianceAggregator".to_string(),
            recorder_role_name: "aws-controltower-ConfigRecorderRole".to_string(),
            s3_bucket_name: "aws-controltower-logs-543705552769-us-east-1".to_string(),
            sns_topic_account_id: "984217156667".to_string(),
            sns_topic_name: "aws-controltower-AllConfigNotifications".to_string(),
        }
    }
}

impl Default for IamExpectations {
    fn default() -> Self {
        Self {
            excluded_role_patterns: vec![
                "aws-controltower-".to_string(),
                "AWSControlTower".to_string(),
                "AWSReservedSSO_".to_string(),
                "AWSServiceRoleFor".to_string(),
            ],
        }
    }
}

impl AuditConfig {
    /// Load a configuration file, falling back to defaults for missing fields
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: AuditConfig = serde_json::from_str(&raw).map_err(|e| {
            AuditError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful run
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.regions.is_empty() {
            return Err(AuditError::Config("regions must not be empty".to_string()));
        }
        if self.regions.iter().any(|r| r.trim().is_empty()) {
            return Err(AuditError::Config("regions must not contain blanks".to_string()));
        }
        if self.auditor_role_name.is_empty() {
            return Err(AuditError::Config("auditor_role_name must be set".to_string()));
        }
        if self.organization_account_id.is_empty() || self.audit_account_id.is_empty() {
            return Err(AuditError::Config(
                "organization_account_id and audit_account_id must be set".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(AuditError::Config("concurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_secs.map(Duration::from_secs)
    }

    /// Role ARN the Config recorder is expected to use in `account_id`
    pub fn expected_recorder_role_arn(&self, account_id: &str) -> String {
        format!(
            "arn:{}:iam::{}:role/{}",
            self.partition, account_id, self.config.recorder_role_name
        )
    }

    /// SNS topic ARN the delivery channel is expected to publish to in `region`
    pub fn expected_sns_topic_arn(&self, region: &str) -> String {
        format!(
            "arn:{}:sns:{}:{}:{}",
            self.partition, region, self.config.sns_topic_account_id, self.config.sns_topic_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AuditConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.regions.len(), 17);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.iam.excluded_role_patterns.len(), 4);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"regions": ["eu-west-1", "eu-west-2"], "concurrency": 4, "config": {{"s3_bucket_name": "my-bucket"}}}}"#
        )
        .unwrap();

        let config = AuditConfig::load(file.path()).unwrap();
        assert_eq!(config.regions, vec!["eu-west-1", "eu-west-2"]);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.config.s3_bucket_name, "my-bucket");
        // Untouched fields keep their defaults
        assert_eq!(config.config.recorder_role_name, "aws-controltower-ConfigRecorderRole");
        assert_eq!(config.home_region, "us-east-1");
    }

    #[test]
    fn test_load_rejects_empty_regions() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"regions": []}}"#).unwrap();

        let err = AuditConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = AuditConfig::load("/nonexistent/auditor.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_expected_arns() {
        let config = AuditConfig::default();
        assert_eq!(
            config.expected_recorder_role_arn("123456789012"),
            "arn:aws:iam::123456789012:role/aws-controltower-ConfigRecorderRole"
        );
        assert_eq!(
            config.expected_sns_topic_arn("eu-west-1"),
            "arn:aws:sns:eu-west-1:984217156667:aws-controltower-AllConfigNotifications"
        );
    }
}
