use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, HostedZone as Route53Zone, ResourceRecord, ResourceRecordSet, RrType,
};
use aws_sdk_route53::Client;

use super::{build_error, service_error};
use crate::certificate::{DnsApi, DnsRecord, HostedZone, HostedZonePage};
use crate::errors::ServiceResult;

const ZONE_ID_PREFIX: &str = "/hostedzone/";

#[derive(Debug, Clone)]
pub struct Route53Client {
    client: Client,
}

impl Route53Client {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl DnsApi for Route53Client {
    async fn list_hosted_zones(&self, marker: Option<String>) -> ServiceResult<HostedZonePage> {
        let output = self
            .client
            .list_hosted_zones()
            .set_marker(marker)
            .send()
            .await
            .map_err(service_error)?;
        let zones: Option<&[Route53Zone]> = output.hosted_zones().into();
        let truncated: Option<bool> = output.is_truncated().into();

        Ok(HostedZonePage {
            zones: zones
                .unwrap_or_default()
                .iter()
                .map(|zone| {
                    let id: Option<&str> = zone.id().into();
                    let name: Option<&str> = zone.name().into();
                    HostedZone {
                        id: id.unwrap_or_default().trim_start_matches(ZONE_ID_PREFIX).to_string(),
                        name: name.unwrap_or_default().to_string(),
                    }
                })
                .collect(),
            next_marker: output
                .next_marker()
                .filter(|_| truncated.unwrap_or(false))
                .map(str::to_string),
        })
    }

    async fn upsert_record(&self, hosted_zone_id: &str, record: &DnsRecord, ttl: i64) -> ServiceResult<()> {
        let record_set = ResourceRecordSet::builder()
            .name(&record.name)
            .r#type(RrType::from(record.record_type.as_str()))
            .ttl(ttl)
            .resource_records(ResourceRecord::builder().value(&record.value).build().map_err(build_error)?)
            .build()
            .map_err(build_error)?;
        let change = Change::builder()
            .action(ChangeAction::Upsert)
            .resource_record_set(record_set)
            .build()
            .map_err(build_error)?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(build_error)?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }
}
