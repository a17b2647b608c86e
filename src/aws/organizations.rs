//! Organizations adapter

use async_trait::async_trait;

use super::sdk_error;
use crate::error::BoxError;
use crate::organizations::{Account, AccountStatus, OrganizationsApi};
use crate::pagination::Page;

#[derive(Debug, Clone)]
pub struct SdkOrganizations {
    client: aws_sdk_organizations::Client,
}

impl SdkOrganizations {
    pub fn new(client: aws_sdk_organizations::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OrganizationsApi for SdkOrganizations {
    async fn list_accounts(&self, next_token: Option<String>) -> Result<Page<Account>, BoxError> {
        let output = self
            .client
            .list_accounts()
            .set_next_token(next_token)
            .send()
            .await
            .map_err(sdk_error)?;

        #[allow(deprecated)]
        let accounts = output
            .accounts()
            .iter()
            .map(|a| {
                let status = a
                    .status()
                    .map(|s| AccountStatus::parse(s.as_str()))
                    .unwrap_or_else(|| AccountStatus::Other(String::new()));
                Account::new(a.id().unwrap_or_default(), a.name().unwrap_or_default(), status)
            })
            .collect();

        Ok(Page::new(accounts, output.next_token().map(String::from)))
    }

    async fn management_account_id(&self) -> Result<Option<String>, BoxError> {
        let output = self
            .client
            .describe_organization()
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(output
            .organization()
            .and_then(|o| o.master_account_id())
            .map(String::from))
    }
}
