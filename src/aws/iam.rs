//! IAM adapter
//!
//! IAM pages with `Marker`/`IsTruncated` rather than `NextToken`; the marker
//! is only a continuation while the response is truncated.

use async_trait::async_trait;

use super::{sdk_error, to_chrono};
use crate::checks::iam::{IamApi, IamRoleInfo, IamUserInfo};
use crate::error::BoxError;
use crate::pagination::Page;

#[derive(Debug, Clone)]
pub struct SdkIam {
    client: aws_sdk_iam::Client,
}

impl SdkIam {
    pub fn new(client: aws_sdk_iam::Client) -> Self {
        Self { client }
    }
}

fn continuation(is_truncated: bool, marker: Option<&str>) -> Option<String> {
    if is_truncated {
        marker.map(String::from)
    } else {
        None
    }
}

#[async_trait]
impl IamApi for SdkIam {
    async fn list_users(&self, marker: Option<String>) -> Result<Page<IamUserInfo>, BoxError> {
        let output = self
            .client
            .list_users()
            .set_marker(marker)
            .send()
            .await
            .map_err(sdk_error)?;

        let users = output
            .users()
            .iter()
            .map(|u| IamUserInfo {
                name: u.user_name().to_string(),
                arn: u.arn().to_string(),
                created: to_chrono(u.create_date()),
            })
            .collect();

        Ok(Page::new(users, continuation(output.is_truncated(), output.marker())))
    }

    async fn list_roles(&self, marker: Option<String>) -> Result<Page<IamRoleInfo>, BoxError> {
        let output = self
            .client
            .list_roles()
            .set_marker(marker)
            .send()
            .await
            .map_err(sdk_error)?;

        let roles = output
            .roles()
            .iter()
            .map(|r| IamRoleInfo {
                name: r.role_name().to_string(),
                arn: r.arn().to_string(),
                created: to_chrono(r.create_date()),
            })
            .collect();

        Ok(Page::new(roles, continuation(output.is_truncated(), output.marker())))
    }
}
