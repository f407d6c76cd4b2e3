use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, ConfigLoader};
use aws_credential_types::provider::error::CredentialsError;
use aws_credential_types::provider::{self, future, ProvideCredentials};
use aws_credential_types::Credentials;
use aws_runtime::env_config::file::EnvConfigFiles;
use aws_sdk_sts::primitives::DateTime;
use aws_types::region::Region;
use time::OffsetDateTime;

use super::{missing, service_error};
use crate::credentials::{AssumeRoleRequest, CachedSession, MfaCredentialsProvider, RoleAssumer};
use crate::errors::{ServiceError, ServiceResult};

const PROVIDER_NAME: &str = "DeckhandMfa";

/// Assumes roles with the long-lived keys of the request's source profile.
#[derive(Debug, Clone, Default)]
pub struct StsRoleAssumer {
    profile_files: EnvConfigFiles,
}

impl StsRoleAssumer {
    /// Looks the source profile up in `profile_files`.
    pub fn new(profile_files: EnvConfigFiles) -> Self {
        Self { profile_files }
    }

    fn source_config(&self, request: &AssumeRoleRequest) -> ConfigLoader {
        let loader = aws_config::defaults(BehaviorVersion::latest())
            .profile_files(self.profile_files.clone())
            .profile_name(&request.source_profile);
        match &request.region {
            Some(region) => loader.region(Region::new(region.clone())),
            None => loader,
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> ServiceResult<CachedSession> {
        let client = aws_sdk_sts::Client::new(&self.source_config(request).load().await);

        let duration = i32::try_from(request.duration.as_secs())
            .map_err(|_| ServiceError::new(format!("session duration {:?} is too long", request.duration)))?;
        let output = client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .serial_number(&request.mfa_serial)
            .token_code(&request.token_code)
            .duration_seconds(duration)
            .send()
            .await
            .map_err(service_error)?;
        let credentials = output.credentials().ok_or_else(|| missing("Credentials"))?;

        let access_key_id: Option<&str> = credentials.access_key_id().into();
        let secret_access_key: Option<&str> = credentials.secret_access_key().into();
        let session_token: Option<&str> = credentials.session_token().into();
        let expiration: Option<&DateTime> = credentials.expiration().into();
        let expiration = expiration.ok_or_else(|| missing("Credentials.Expiration"))?;

        Ok(CachedSession {
            access_key_id: access_key_id.ok_or_else(|| missing("Credentials.AccessKeyId"))?.to_string(),
            secret_access_key: secret_access_key
                .ok_or_else(|| missing("Credentials.SecretAccessKey"))?
                .to_string(),
            session_token: session_token.ok_or_else(|| missing("Credentials.SessionToken"))?.to_string(),
            expiration: OffsetDateTime::from_unix_timestamp(expiration.secs())
                .map_err(|err| ServiceError::new(err.to_string()))?,
        })
    }
}

/// Hands MFA sessions to SDK clients.
#[derive(Debug, Clone)]
pub struct MfaCredentials {
    provider: Arc<MfaCredentialsProvider>,
}

impl MfaCredentials {
    pub fn new(provider: Arc<MfaCredentialsProvider>) -> Self {
        Self { provider }
    }

    /// Resolves the session now, prompting if neither memory nor the cache
    /// file holds one.
    pub async fn prime(&self) -> crate::errors::Result<()> {
        self.provider.session().await.map(|_| ())
    }

    async fn load(&self) -> provider::Result {
        let session = self
            .provider
            .session()
            .await
            .map_err(CredentialsError::provider_error)?;
        Ok(Credentials::new(
            session.access_key_id,
            session.secret_access_key,
            Some(session.session_token),
            Some(SystemTime::from(session.expiration)),
            PROVIDER_NAME,
        ))
    }
}

impl ProvideCredentials for MfaCredentials {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.load())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use aws_runtime::env_config::file::EnvConfigFileKind;
    use aws_types::os_shim_internal::{Env, Fs};

    use super::*;
    use crate::aws::CREDENTIALS_LOAD_TIMEOUT;
    use crate::credentials::{MfaPrompt, ProfileSettings, SessionCache};
    use crate::errors::Result;

    struct SlowPrompt {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MfaPrompt for SlowPrompt {
        async fn mfa_code(&self, _profile: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok("123456".to_string())
        }
    }

    struct FakeSts;

    #[async_trait]
    impl RoleAssumer for FakeSts {
        async fn assume_role(&self, _request: &AssumeRoleRequest) -> ServiceResult<CachedSession> {
            Ok(CachedSession {
                access_key_id: "ASIAEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: "token".to_string(),
                expiration: OffsetDateTime::now_utc() + time::Duration::hours(1),
            })
        }
    }

    fn slow_credentials(dir: &tempfile::TempDir, delay: Duration) -> (MfaCredentials, Arc<SlowPrompt>) {
        let settings = ProfileSettings {
            name: "deploy".to_string(),
            role_arn: "arn:aws:iam::123456789012:role/deployer".to_string(),
            mfa_serial: "arn:aws:iam::210987654321:mfa/jane".to_string(),
            source_profile: "default".to_string(),
            region: None,
        };
        let prompt = Arc::new(SlowPrompt {
            delay,
            calls: AtomicUsize::new(0),
        });
        let provider = MfaCredentialsProvider::new(
            settings,
            SessionCache::new(dir.path().join("aws-session-credentials-deploy")),
            prompt.clone(),
            Arc::new(FakeSts),
        );
        (MfaCredentials::new(Arc::new(provider)), prompt)
    }

    #[tokio::test(start_paused = true)]
    async fn priming_waits_for_a_slow_prompt_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let (credentials, prompt) = slow_credentials(&dir, Duration::from_secs(90));

        let started = tokio::time::Instant::now();
        credentials.prime().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(90));

        let provided = credentials.provide_credentials().await.unwrap();
        assert_eq!(provided.access_key_id(), "ASIAEXAMPLE");
        assert_eq!(provided.session_token(), Some("token"));
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_renewal_prompt_fits_in_the_credentials_load_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let (credentials, prompt) = slow_credentials(&dir, Duration::from_secs(120));

        let provided = tokio::time::timeout(CREDENTIALS_LOAD_TIMEOUT, credentials.provide_credentials())
            .await
            .expect("prompt outlasted the load timeout")
            .unwrap();

        assert_eq!(provided.access_key_id(), "ASIAEXAMPLE");
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn source_profile_comes_from_the_configured_files() {
        let files = EnvConfigFiles::builder()
            .with_file(EnvConfigFileKind::Config, "/etc/deckhand/aws-config")
            .build();
        let request = AssumeRoleRequest {
            role_arn: "arn:aws:iam::123456789012:role/deployer".to_string(),
            mfa_serial: "arn:aws:iam::210987654321:mfa/jane".to_string(),
            token_code: "123456".to_string(),
            session_name: "session".to_string(),
            duration: Duration::from_secs(900),
            source_profile: "source".to_string(),
            region: None,
        };

        let sdk = StsRoleAssumer::new(files)
            .source_config(&request)
            .env(Env::from_slice(&[]))
            .fs(Fs::from_slice(&[(
                "/etc/deckhand/aws-config",
                "[profile source]\nregion = ap-south-1\n",
            )]))
            .load()
            .await;

        assert_eq!(sdk.region().map(|r| r.as_ref()), Some("ap-south-1"));
    }
}
