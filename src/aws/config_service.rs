//! AWS Config adapter

use async_trait::async_trait;

use super::sdk_error;
use crate::checks::config::{
    AggregatorInfo, ConfigServiceApi, DeliveryChannelInfo, RecorderInfo, RecorderStatus,
};
use crate::error::BoxError;
use crate::pagination::Page;

#[derive(Debug, Clone)]
pub struct SdkConfigService {
    client: aws_sdk_config::Client,
}

impl SdkConfigService {
    pub fn new(client: aws_sdk_config::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigServiceApi for SdkConfigService {
    async fn describe_recorders(&self) -> Result<Vec<RecorderInfo>, BoxError> {
        let output = self
            .client
            .describe_configuration_recorders()
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(output
            .configuration_recorders()
            .iter()
            .map(|r| {
                let group = r.recording_group();
                RecorderInfo {
                    name: r.name().unwrap_or_default().to_string(),
                    role_arn: r.role_arn().map(String::from),
                    all_supported: group.is_some_and(|g| g.all_supported()),
                    include_global_resource_types: group
                        .is_some_and(|g| g.include_global_resource_types()),
                }
            })
            .collect())
    }

    async fn describe_recorder_status(&self) -> Result<Vec<RecorderStatus>, BoxError> {
        let output = self
            .client
            .describe_configuration_recorder_status()
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(output
            .configuration_recorders_status()
            .iter()
            .map(|s| RecorderStatus {
                name: s.name().unwrap_or_default().to_string(),
                recording: s.recording(),
            })
            .collect())
    }

    async fn describe_delivery_channels(&self) -> Result<Vec<DeliveryChannelInfo>, BoxError> {
        let output = self
            .client
            .describe_delivery_channels()
            .send()
            .await
            .map_err(sdk_error)?;

        Ok(output
            .delivery_channels()
            .iter()
            .map(|c| DeliveryChannelInfo {
                name: c.name().unwrap_or_default().to_string(),
                s3_bucket_name: c.s3_bucket_name().map(String::from),
                sns_topic_arn: c.sns_topic_arn().map(String::from),
            })
            .collect())
    }

    async fn list_aggregators(&self, next_token: Option<String>) -> Result<Page<AggregatorInfo>, BoxError> {
        let output = self
            .client
            .describe_configuration_aggregators()
            .set_next_token(next_token)
            .send()
            .await
            .map_err(sdk_error)?;

        let aggregators = output
            .configuration_aggregators()
            .iter()
            .map(|a| AggregatorInfo {
                name: a.configuration_aggregator_name().unwrap_or_default().to_string(),
            })
            .collect();

        Ok(Page::new(aggregators, output.next_token().map(String::from)))
    }
}
