//! Certificate lookup and issuance with DNS validation.
//!
//! An existing certificate for the domain is reused. Otherwise a new one is
//! requested, its validation record is upserted into the hosted zone and the
//! call returns once the provider reports the domain as validated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::Level;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::{DeployError, Result, ServiceResult};
use crate::logging::log_event;
use crate::poll::PollSettings;

const MODULE: &str = "deckhand::certificate";
const PENDING_VALIDATION: &str = "PENDING_VALIDATION";
const SUCCESS: &str = "SUCCESS";
const FAILED: &str = "FAILED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub domain_name: String,
    pub certificate_arn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificatePage {
    pub certificates: Vec<CertificateSummary>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: String,
    pub value: String,
}

/// State of the first domain validation option of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainValidation {
    pub status: String,
    pub record: Option<DnsRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostedZonePage {
    pub zones: Vec<HostedZone>,
    pub next_marker: Option<String>,
}

#[async_trait]
pub trait CertificateApi: Send + Sync {
    async fn list_certificates(&self, next_token: Option<String>) -> ServiceResult<CertificatePage>;

    /// Request a DNS-validated certificate and return its ARN.
    async fn request_certificate(&self, domain_name: &str) -> ServiceResult<String>;

    async fn domain_validation(&self, certificate_arn: &str) -> ServiceResult<Option<DomainValidation>>;
}

#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn list_hosted_zones(&self, marker: Option<String>) -> ServiceResult<HostedZonePage>;

    async fn upsert_record(&self, hosted_zone_id: &str, record: &DnsRecord, ttl: i64) -> ServiceResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateOptions {
    pub poll: PollSettings,
    pub validation_record_ttl: i64,
}

impl Default for CertificateOptions {
    fn default() -> Self {
        Self {
            poll: PollSettings::new(Duration::from_secs(10), Duration::from_secs(1800)),
            validation_record_ttl: 300,
        }
    }
}

pub struct CertificateClient {
    acm: Arc<dyn CertificateApi>,
    dns: Arc<dyn DnsApi>,
    options: CertificateOptions,
}

impl CertificateClient {
    pub fn new(acm: Arc<dyn CertificateApi>, dns: Arc<dyn DnsApi>) -> Self {
        Self::with_options(acm, dns, CertificateOptions::default())
    }

    pub fn with_options(acm: Arc<dyn CertificateApi>, dns: Arc<dyn DnsApi>, options: CertificateOptions) -> Self {
        Self { acm, dns, options }
    }

    /// ARN of a certificate for `domain_name`, requesting and validating a
    /// new one in `hosted_zone_name` when none exists yet.
    pub async fn retrieve_or_request_certificate(&self, hosted_zone_name: &str, domain_name: &str) -> Result<String> {
        if let Some(arn) = self.retrieve_existing_certificate(domain_name).await? {
            log::info!(target: MODULE, "Found existing certificate {arn} for {domain_name}");
            return Ok(arn);
        }
        self.request_and_validate_new_certificate(domain_name, hosted_zone_name)
            .await
    }

    async fn retrieve_existing_certificate(&self, domain_name: &str) -> Result<Option<String>> {
        let mut next_token = None;
        loop {
            let page = self.acm.list_certificates(next_token).await?;
            if let Some(existing) = page
                .certificates
                .into_iter()
                .find(|c| c.domain_name == domain_name)
            {
                return Ok(Some(existing.certificate_arn));
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(None),
            }
        }
    }

    async fn request_and_validate_new_certificate(&self, domain_name: &str, hosted_zone_name: &str) -> Result<String> {
        let arn = self.acm.request_certificate(domain_name).await?;
        log_event(
            Level::Info,
            Some("ACM-0100"),
            MODULE,
            "certificate requested",
            Some(json!({ "domain": domain_name, "arn": arn })),
        );

        let record = self.wait_for_validation_record(&arn).await?;
        let hosted_zone_id = self.hosted_zone_id(hosted_zone_name).await?;
        self.dns
            .upsert_record(&hosted_zone_id, &record, self.options.validation_record_ttl)
            .await?;
        log_event(
            Level::Info,
            Some("ACM-0200"),
            MODULE,
            "validation record upserted",
            Some(json!({ "zone": hosted_zone_id, "record": record.name, "type": record.record_type })),
        );

        self.wait_for_validation(&arn).await?;
        Ok(arn)
    }

    /// The validation record only appears once the certificate is pending
    /// validation.
    async fn wait_for_validation_record(&self, arn: &str) -> Result<DnsRecord> {
        let poll = &self.options.poll;
        let deadline = poll.deadline(format!("validation record of {arn}"));
        loop {
            deadline.check()?;
            match self.acm.domain_validation(arn).await? {
                Some(DomainValidation {
                    status,
                    record: Some(record),
                }) if status == PENDING_VALIDATION => return Ok(record),
                Some(DomainValidation { status, .. }) if status == FAILED => {
                    return Err(DeployError::CertificateValidationFailed {
                        arn: arn.to_string(),
                        status,
                    });
                }
                _ => poll.pause().await,
            }
        }
    }

    async fn wait_for_validation(&self, arn: &str) -> Result<()> {
        let poll = &self.options.poll;
        let deadline = poll.deadline(format!("validation of {arn}"));
        loop {
            deadline.check()?;
            let status = self
                .acm
                .domain_validation(arn)
                .await?
                .map(|v| v.status)
                .unwrap_or_default();
            log::info!(target: MODULE, "Waiting for certificate to be validated. Current status: {status}");
            match status.as_str() {
                SUCCESS => return Ok(()),
                FAILED => {
                    return Err(DeployError::CertificateValidationFailed {
                        arn: arn.to_string(),
                        status: status.clone(),
                    })
                }
                _ => poll.pause().await,
            }
        }
    }

    async fn hosted_zone_id(&self, hosted_zone_name: &str) -> Result<String> {
        let wanted = format!("{}.", hosted_zone_name.trim_end_matches('.'));
        let mut marker = None;
        loop {
            let page = self.dns.list_hosted_zones(marker).await?;
            if let Some(zone) = page.zones.into_iter().find(|z| z.name == wanted) {
                return Ok(zone.id);
            }
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => return Err(DeployError::HostedZoneNotFound(wanted)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    const WANTED_DOMAIN: &str = "the-domain";
    const WANTED_ARN: &str = "the-arn";
    const RECORD_NAME: &str = "validation-resource-record-name";

    struct FakeAcm {
        pages: Vec<CertificatePage>,
        validated: Arc<AtomicBool>,
        requests: AtomicUsize,
        failed: bool,
        publishes_record: bool,
    }

    impl FakeAcm {
        fn new(pages: Vec<CertificatePage>, validated: Arc<AtomicBool>) -> Self {
            Self {
                pages,
                validated,
                requests: AtomicUsize::new(0),
                failed: false,
                publishes_record: true,
            }
        }
    }

    #[async_trait]
    impl CertificateApi for FakeAcm {
        async fn list_certificates(&self, next_token: Option<String>) -> ServiceResult<CertificatePage> {
            let index = next_token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
            Ok(self.pages[index].clone())
        }

        async fn request_certificate(&self, domain_name: &str) -> ServiceResult<String> {
            assert_eq!(domain_name, WANTED_DOMAIN);
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(WANTED_ARN.to_string())
        }

        async fn domain_validation(&self, certificate_arn: &str) -> ServiceResult<Option<DomainValidation>> {
            assert_eq!(certificate_arn, WANTED_ARN);
            if self.failed {
                return Ok(Some(DomainValidation {
                    status: FAILED.to_string(),
                    record: None,
                }));
            }
            if self.validated.load(Ordering::SeqCst) {
                return Ok(Some(DomainValidation {
                    status: SUCCESS.to_string(),
                    record: None,
                }));
            }
            Ok(Some(DomainValidation {
                status: PENDING_VALIDATION.to_string(),
                record: self.publishes_record.then(|| DnsRecord {
                    name: RECORD_NAME.to_string(),
                    record_type: "CNAME".to_string(),
                    value: "_x.acm-validations.aws.".to_string(),
                }),
            }))
        }
    }

    struct FakeDns {
        zones: Vec<HostedZonePage>,
        validated: Arc<AtomicBool>,
        upserts: Mutex<Vec<(String, DnsRecord, i64)>>,
    }

    #[async_trait]
    impl DnsApi for FakeDns {
        async fn list_hosted_zones(&self, marker: Option<String>) -> ServiceResult<HostedZonePage> {
            let index = marker.map(|m| m.parse::<usize>().unwrap()).unwrap_or(0);
            Ok(self.zones[index].clone())
        }

        async fn upsert_record(&self, hosted_zone_id: &str, record: &DnsRecord, ttl: i64) -> ServiceResult<()> {
            self.upserts
                .lock()
                .unwrap()
                .push((hosted_zone_id.to_string(), record.clone(), ttl));
            self.validated.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn summary(domain: &str, arn: &str) -> CertificateSummary {
        CertificateSummary {
            domain_name: domain.to_string(),
            certificate_arn: arn.to_string(),
        }
    }

    fn zone_pages() -> Vec<HostedZonePage> {
        vec![
            HostedZonePage {
                zones: vec![HostedZone {
                    id: "hz999".to_string(),
                    name: "other-zone.".to_string(),
                }],
                next_marker: Some("1".to_string()),
            },
            HostedZonePage {
                zones: vec![HostedZone {
                    id: "hz123".to_string(),
                    name: "the-hosted-zone.".to_string(),
                }],
                next_marker: None,
            },
        ]
    }

    fn client(acm: &Arc<FakeAcm>, dns: &Arc<FakeDns>) -> CertificateClient {
        CertificateClient::with_options(
            acm.clone(),
            dns.clone(),
            CertificateOptions {
                poll: PollSettings::new(Duration::from_millis(1), Duration::from_secs(60)),
                ..CertificateOptions::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn returns_the_arn_of_an_existing_certificate() {
        let validated = Arc::new(AtomicBool::new(false));
        let acm = Arc::new(FakeAcm::new(
            vec![
                CertificatePage {
                    certificates: vec![summary("another-domain", "another-arn")],
                    next_token: Some("1".to_string()),
                },
                CertificatePage {
                    certificates: vec![summary(WANTED_DOMAIN, WANTED_ARN)],
                    next_token: None,
                },
            ],
            validated.clone(),
        ));
        let dns = Arc::new(FakeDns {
            zones: zone_pages(),
            validated,
            upserts: Mutex::new(Vec::new()),
        });

        let arn = client(&acm, &dns)
            .retrieve_or_request_certificate("the-hosted-zone.", WANTED_DOMAIN)
            .await
            .unwrap();

        assert_eq!(arn, WANTED_ARN);
        assert_eq!(acm.requests.load(Ordering::SeqCst), 0);
        assert!(dns.upserts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn requests_and_validates_a_new_certificate() {
        let validated = Arc::new(AtomicBool::new(false));
        let acm = Arc::new(FakeAcm::new(
            vec![CertificatePage {
                certificates: vec![summary("another-domain", "another-arn")],
                next_token: None,
            }],
            validated.clone(),
        ));
        let dns = Arc::new(FakeDns {
            zones: zone_pages(),
            validated,
            upserts: Mutex::new(Vec::new()),
        });

        let arn = client(&acm, &dns)
            .retrieve_or_request_certificate("the-hosted-zone", WANTED_DOMAIN)
            .await
            .unwrap();

        assert_eq!(arn, WANTED_ARN);
        assert_eq!(acm.requests.load(Ordering::SeqCst), 1);
        let upserts = dns.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1);
        let (zone, record, ttl) = &upserts[0];
        assert_eq!(zone, "hz123");
        assert_eq!(record.name, RECORD_NAME);
        assert_eq!(*ttl, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn fails_when_the_hosted_zone_is_unknown() {
        let validated = Arc::new(AtomicBool::new(false));
        let acm = Arc::new(FakeAcm::new(vec![CertificatePage::default()], validated.clone()));
        let dns = Arc::new(FakeDns {
            zones: vec![HostedZonePage::default()],
            validated,
            upserts: Mutex::new(Vec::new()),
        });

        let err = client(&acm, &dns)
            .retrieve_or_request_certificate("missing-zone", WANTED_DOMAIN)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::HostedZoneNotFound(ref zone) if zone == "missing-zone."));
    }

    #[tokio::test(start_paused = true)]
    async fn surfaces_a_failed_validation() {
        let validated = Arc::new(AtomicBool::new(false));
        let acm = Arc::new(FakeAcm {
            failed: true,
            ..FakeAcm::new(vec![CertificatePage::default()], validated.clone())
        });
        let dns = Arc::new(FakeDns {
            zones: zone_pages(),
            validated,
            upserts: Mutex::new(Vec::new()),
        });

        let err = client(&acm, &dns)
            .retrieve_or_request_certificate("the-hosted-zone", WANTED_DOMAIN)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::CertificateValidationFailed { .. }));
    }

    fn impatient_client(acm: &Arc<FakeAcm>, dns: &Arc<FakeDns>) -> CertificateClient {
        CertificateClient::with_options(
            acm.clone(),
            dns.clone(),
            CertificateOptions {
                poll: PollSettings::new(Duration::from_secs(10), Duration::from_secs(60)),
                ..CertificateOptions::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_no_validation_record_appears() {
        let validated = Arc::new(AtomicBool::new(false));
        let acm = Arc::new(FakeAcm {
            publishes_record: false,
            ..FakeAcm::new(vec![CertificatePage::default()], validated.clone())
        });
        let dns = Arc::new(FakeDns {
            zones: zone_pages(),
            validated,
            upserts: Mutex::new(Vec::new()),
        });

        let err = impatient_client(&acm, &dns)
            .retrieve_or_request_certificate("the-hosted-zone", WANTED_DOMAIN)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Timeout waiting for validation record of the-arn after 60 secs"
        );
        assert!(dns.upserts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_validation_never_succeeds() {
        let acm = Arc::new(FakeAcm::new(
            vec![CertificatePage::default()],
            Arc::new(AtomicBool::new(false)),
        ));
        // The record is written, but the certificate stays pending.
        let dns = Arc::new(FakeDns {
            zones: zone_pages(),
            validated: Arc::new(AtomicBool::new(false)),
            upserts: Mutex::new(Vec::new()),
        });

        let err = impatient_client(&acm, &dns)
            .retrieve_or_request_certificate("the-hosted-zone", WANTED_DOMAIN)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Timeout waiting for validation of the-arn after 60 secs");
        assert_eq!(err.code(), "GEN-1001");
        assert_eq!(dns.upserts.lock().unwrap().len(), 1);
    }
}
