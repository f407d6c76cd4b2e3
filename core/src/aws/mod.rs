//! Service seams backed by the AWS SDK.
//!
//! Every client here is a thin translation layer: SDK request builders in,
//! plain crate types out, SDK failures reduced to [`ServiceError`].

pub mod acm;
pub mod cloudformation;
pub mod codepipeline;
pub mod ecr;
pub mod kms;
pub mod route53;
pub mod s3;
pub mod ssm;
pub mod sts;

use std::sync::Arc;
use std::time::Duration;

use aws_config::identity::IdentityCache;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use aws_types::region::Region;

use crate::config::DeployConfig;
use crate::credentials::{self, MfaCredentialsProvider, ProfileSettings, SessionCache, TerminalPrompt};
use crate::errors::{DeployError, Result, ServiceError};

pub use sts::{MfaCredentials, StsRoleAssumer};

/// Keep the provider's code and message so callers can match on them.
pub(crate) fn service_error<E>(err: E) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code = err.code().map(str::to_string);
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    ServiceError { code, message }
}

/// A required request member could not be set.
pub(crate) fn build_error(err: aws_smithy_types::error::operation::BuildError) -> ServiceError {
    ServiceError::with_code("BuildError", err.to_string())
}

pub(crate) fn missing(field: &'static str) -> ServiceError {
    ServiceError::with_code("MissingField", format!("response is missing {field}"))
}

/// Upper bound for one credentials load, including a renewal that waits on
/// the MFA prompt.
pub const CREDENTIALS_LOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared SDK configuration for `config`, using the MFA provider when the
/// configured profile requires it.
pub async fn load_sdk_config(config: &DeployConfig) -> Result<SdkConfig> {
    let files = credentials::profile_files(config.aws_config_file.as_deref());
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).profile_files(files.clone());
    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    match (config.profile.as_deref(), config.mfa) {
        (Some(profile), true) => {
            let settings = ProfileSettings::load(profile, config.aws_config_file.as_deref()).await?;
            if config.region.is_none() {
                if let Some(region) = &settings.region {
                    loader = loader.region(Region::new(region.clone()));
                }
            }
            let provider = MfaCredentialsProvider::new(
                settings,
                SessionCache::for_profile(profile),
                Arc::new(TerminalPrompt),
                Arc::new(StsRoleAssumer::new(files)),
            )
            .with_session_duration(config.session_duration());
            let credentials = MfaCredentials::new(Arc::new(provider));
            // The first prompt happens here, outside any SDK request.
            credentials.prime().await?;
            loader = loader
                .identity_cache(IdentityCache::lazy().load_timeout(CREDENTIALS_LOAD_TIMEOUT).build())
                .credentials_provider(credentials);
        }
        (Some(profile), false) => loader = loader.profile_name(profile),
        (None, true) => {
            return Err(DeployError::Config(
                "MFA role assumption needs a profile".to_string(),
            ))
        }
        (None, false) => {}
    }

    let sdk_config = loader.load().await;
    log::debug!(
        target: "deckhand::aws",
        "Loaded SDK config for region {:?}",
        sdk_config.region().map(|r| r.as_ref().to_string())
    );
    Ok(sdk_config)
}
