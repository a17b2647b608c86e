//! Error types for the auditor
//!
//! Root-level failures (role assumption in the organization account, account
//! discovery) abort the run. Everything below that is logged and isolated
//! by the scheduler.

use thiserror::Error;

/// Boxed error returned by the AWS seam traits
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while preparing or driving an audit run
#[derive(Debug, Error)]
pub enum AuditError {
    /// A caller passed an empty or malformed identifier
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// STS refused or failed the AssumeRole call
    #[error("AssumeRole failed for account {account_id} ({role_arn}): {source}")]
    AssumeRoleFailed {
        account_id: String,
        role_arn: String,
        #[source]
        source: BoxError,
    },

    /// Organizations listing or describe failed
    #[error("Account discovery failed during {operation}: {source}")]
    Discovery {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// Configuration file could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuditError {
    pub fn discovery(operation: &'static str, source: impl Into<BoxError>) -> Self {
        AuditError::Discovery {
            operation,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assume_role_error_display() {
        let err = AuditError::AssumeRoleFailed {
            account_id: "111111111111".to_string(),
            role_arn: "arn:aws:iam::111111111111:role/Reader".to_string(),
            source: "AccessDenied".into(),
        };

        assert_eq!(
            err.to_string(),
            "AssumeRole failed for account 111111111111 (arn:aws:iam::111111111111:role/Reader): AccessDenied"
        );
    }

    #[test]
    fn test_discovery_error_names_operation() {
        let err = AuditError::discovery("ListAccounts", "throttled");
        assert_eq!(
            err.to_string(),
            "Account discovery failed during ListAccounts: throttled"
        );
    }
}
