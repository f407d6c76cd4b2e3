use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_acm::types::{
    CertificateSummary as AcmSummary, DomainStatus, DomainValidation as AcmDomainValidation,
    RecordType, ValidationMethod,
};
use aws_sdk_acm::Client;

use super::{missing, service_error};
use crate::certificate::{CertificateApi, CertificatePage, CertificateSummary, DnsRecord, DomainValidation};
use crate::errors::ServiceResult;

#[derive(Debug, Clone)]
pub struct AcmClient {
    client: Client,
}

impl AcmClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl CertificateApi for AcmClient {
    async fn list_certificates(&self, next_token: Option<String>) -> ServiceResult<CertificatePage> {
        let output = self
            .client
            .list_certificates()
            .set_next_token(next_token)
            .send()
            .await
            .map_err(service_error)?;
        let summaries: Option<&[AcmSummary]> = output.certificate_summary_list().into();

        Ok(CertificatePage {
            certificates: summaries
                .unwrap_or_default()
                .iter()
                .filter_map(|s| {
                    Some(CertificateSummary {
                        domain_name: s.domain_name()?.to_string(),
                        certificate_arn: s.certificate_arn()?.to_string(),
                    })
                })
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn request_certificate(&self, domain_name: &str) -> ServiceResult<String> {
        let output = self
            .client
            .request_certificate()
            .domain_name(domain_name)
            .validation_method(ValidationMethod::Dns)
            .send()
            .await
            .map_err(service_error)?;
        output
            .certificate_arn()
            .map(str::to_string)
            .ok_or_else(|| missing("CertificateArn"))
    }

    async fn domain_validation(&self, certificate_arn: &str) -> ServiceResult<Option<DomainValidation>> {
        let output = self
            .client
            .describe_certificate()
            .certificate_arn(certificate_arn)
            .send()
            .await
            .map_err(service_error)?;
        let Some(certificate) = output.certificate() else {
            return Ok(None);
        };
        let options: Option<&[AcmDomainValidation]> = certificate.domain_validation_options().into();
        let Some(first) = options.unwrap_or_default().first() else {
            return Ok(None);
        };

        let status: Option<&DomainStatus> = first.validation_status().into();
        let record = first.resource_record().map(|r| {
            let name: Option<&str> = r.name().into();
            let record_type: Option<&RecordType> = r.r#type().into();
            let value: Option<&str> = r.value().into();
            DnsRecord {
                name: name.unwrap_or_default().to_string(),
                record_type: record_type.map(|t| t.as_str().to_string()).unwrap_or_default(),
                value: value.unwrap_or_default().to_string(),
            }
        });

        Ok(Some(DomainValidation {
            status: status.map(|s| s.as_str().to_string()).unwrap_or_default(),
            record,
        }))
    }
}
