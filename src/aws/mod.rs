//! AWS SDK adapters
//!
//! Production implementations of the service seams. Clients are built per
//! identity and region from one shared base [`SdkConfig`], so credentials
//! never leak between accounts.

mod config_service;
mod iam;
mod organizations;
mod sts;

pub use config_service::SdkConfigService;
pub use iam::SdkIam;
pub use organizations::SdkOrganizations;
pub use sts::StsRoleAssumer;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_sts::config::Region;
use aws_sdk_sts::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::checks::config::ConfigServiceApi;
use crate::checks::iam::IamApi;
use crate::credentials::Identity;
use crate::error::BoxError;
use crate::organizations::OrganizationsApi;

/// Builds service clients for an identity in a region
pub trait ServiceFactory: Send + Sync {
    fn organizations(&self, identity: &Identity, region: &str) -> Arc<dyn OrganizationsApi>;

    fn iam(&self, identity: &Identity, region: &str) -> Arc<dyn IamApi>;

    fn config_service(&self, identity: &Identity, region: &str) -> Arc<dyn ConfigServiceApi>;
}

/// [`ServiceFactory`] backed by the AWS SDK
#[derive(Clone)]
pub struct AwsServiceFactory {
    base: SdkConfig,
}

impl AwsServiceFactory {
    /// Load the default credential and region chain of the process
    pub async fn load() -> Self {
        let base = aws_config::defaults(BehaviorVersion::latest()).load().await;
        debug!(region = ?base.region(), "Loaded AWS SDK configuration");
        Self { base }
    }

    /// STS client using the entry identity, pinned to `region`
    pub fn role_assumer(&self, region: &str) -> StsRoleAssumer {
        let conf = aws_sdk_sts::config::Builder::from(&self.base)
            .region(Region::new(region.to_string()))
            .build();
        StsRoleAssumer::new(aws_sdk_sts::Client::from_conf(conf))
    }
}

impl ServiceFactory for AwsServiceFactory {
    fn organizations(&self, identity: &Identity, region: &str) -> Arc<dyn OrganizationsApi> {
        let conf = aws_sdk_organizations::config::Builder::from(&self.base)
            .credentials_provider(identity.to_sdk_credentials())
            .region(Region::new(region.to_string()))
            .build();
        Arc::new(SdkOrganizations::new(aws_sdk_organizations::Client::from_conf(conf)))
    }

    fn iam(&self, identity: &Identity, region: &str) -> Arc<dyn IamApi> {
        let conf = aws_sdk_iam::config::Builder::from(&self.base)
            .credentials_provider(identity.to_sdk_credentials())
            .region(Region::new(region.to_string()))
            .build();
        Arc::new(SdkIam::new(aws_sdk_iam::Client::from_conf(conf)))
    }

    fn config_service(&self, identity: &Identity, region: &str) -> Arc<dyn ConfigServiceApi> {
        let conf = aws_sdk_config::config::Builder::from(&self.base)
            .credentials_provider(identity.to_sdk_credentials())
            .region(Region::new(region.to_string()))
            .build();
        Arc::new(SdkConfigService::new(aws_sdk_config::Client::from_conf(conf)))
    }
}

/// Flatten an SDK error and its source chain into one message
pub(crate) fn sdk_error<E: std::error::Error>(err: E) -> BoxError {
    DisplayErrorContext(err).to_string().into()
}

pub(crate) fn to_chrono(date: &aws_sdk_iam::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(date.secs(), date.subsec_nanos())
}
