//! Credential Broker
//!
//! Exchanges the entry identity (the default AWS credential chain of the
//! process) for short-lived credentials in a target account via STS
//! AssumeRole. Every account transition goes through [`CredentialBroker::assume`];
//! nothing is cached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

use crate::config::AuditConfig;
use crate::error::{AuditError, BoxError};

/// Provider name attached to SDK credentials built from an [`Identity`]
const CREDENTIALS_SOURCE: &str = "Auditor STS Credentials";

/// Parameters of a single AssumeRole call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_secs: Option<i32>,
}

/// Raw temporary credentials as returned by STS
#[derive(Clone)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

/// Seam over STS AssumeRole
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<TemporaryCredentials, BoxError>;
}

/// Scoped, time-limited credentials for one account
///
/// Only the broker builds these. Each work unit gets its own clone; the
/// value is immutable once issued.
#[derive(Clone)]
pub struct Identity {
    account_id: String,
    role_arn: String,
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    fn issue(account_id: &str, role_arn: String, creds: TemporaryCredentials) -> Self {
        Self {
            account_id: account_id.to_string(),
            role_arn,
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: creds.session_token,
            expires_at: creds.expiration,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Static SDK credentials for building service clients
    pub fn to_sdk_credentials(&self) -> aws_credential_types::Credentials {
        aws_credential_types::Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            Some(self.session_token.clone()),
            self.expires_at.map(SystemTime::from),
            CREDENTIALS_SOURCE,
        )
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("account_id", &self.account_id)
            .field("role_arn", &self.role_arn)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Issues [`Identity`] values by chaining AssumeRole through the entry identity
#[derive(Clone)]
pub struct CredentialBroker {
    assumer: Arc<dyn RoleAssumer>,
    partition: String,
    session_name: String,
    duration_secs: Option<i32>,
}

impl CredentialBroker {
    pub fn new(assumer: Arc<dyn RoleAssumer>, partition: &str, session_name: &str) -> Self {
        Self {
            assumer,
            partition: partition.to_string(),
            session_name: session_name.to_string(),
            duration_secs: None,
        }
    }

    pub fn from_config(assumer: Arc<dyn RoleAssumer>, config: &AuditConfig) -> Self {
        Self::new(assumer, &config.partition, &config.session_name)
            .with_session_duration(config.session_duration_secs)
    }

    /// Override the provider-default session duration
    pub fn with_session_duration(mut self, duration_secs: Option<i32>) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    pub fn role_arn(&self, account_id: &str, role_name: &str) -> String {
        format!("arn:{}:iam::{}:role/{}", self.partition, account_id, role_name)
    }

    /// Assume `role_name` in `account_id`
    pub async fn assume(&self, account_id: &str, role_name: &str) -> Result<Identity, AuditError> {
        validate_segment("account id", account_id)?;
        validate_segment("role name", role_name)?;

        let role_arn = self.role_arn(account_id, role_name);
        let request = AssumeRoleRequest {
            role_arn: role_arn.clone(),
            session_name: self.session_name.clone(),
            duration_secs: self.duration_secs,
        };

        debug!(account_id = %account_id, role_arn = %role_arn, "Assuming role");

        let creds = self
            .assumer
            .assume_role(&request)
            .await
            .map_err(|source| AuditError::AssumeRoleFailed {
                account_id: account_id.to_string(),
                role_arn: role_arn.clone(),
                source,
            })?;

        info!(account_id = %account_id, role_arn = %role_arn, "Assumed role");
        Ok(Identity::issue(account_id, role_arn, creds))
    }
}

fn validate_segment(what: &str, value: &str) -> Result<(), AuditError> {
    if value.trim().is_empty() {
        return Err(AuditError::InvalidInput(format!("{} must not be empty", what)));
    }
    if value.contains(':') || value.chars().any(char::is_whitespace) {
        return Err(AuditError::InvalidInput(format!("{} is malformed: {:?}", what, value)));
    }
    Ok(())
}
