//! STS AssumeRole adapter

use async_trait::async_trait;

use super::{sdk_error, to_chrono};
use crate::credentials::{AssumeRoleRequest, RoleAssumer, TemporaryCredentials};
use crate::error::BoxError;

/// [`RoleAssumer`] calling STS with the entry identity of the process
#[derive(Debug, Clone)]
pub struct StsRoleAssumer {
    client: aws_sdk_sts::Client,
}

impl StsRoleAssumer {
    pub fn new(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<TemporaryCredentials, BoxError> {
        let output = self
            .client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .set_duration_seconds(request.duration_secs)
            .send()
            .await
            .map_err(sdk_error)?;

        let creds = output
            .credentials()
            .ok_or("AssumeRole response contained no credentials")?;

        Ok(TemporaryCredentials {
            access_key_id: creds.access_key_id().to_string(),
            secret_access_key: creds.secret_access_key().to_string(),
            session_token: creds.session_token().to_string(),
            expiration: to_chrono(creds.expiration()),
        })
    }
}
