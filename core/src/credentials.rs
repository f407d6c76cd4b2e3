//! Assumed-role credentials that require an MFA code.
//!
//! A profile in the shared AWS config file names the role, the MFA device
//! and the profile whose long-lived keys are used to assume the role:
//!
//! ```text
//! [profile deploy]
//! role_arn = arn:aws:iam::123456789012:role/deployer
//! mfa_serial = arn:aws:iam::210987654321:mfa/jane
//! source_profile = default
//! region = eu-west-1
//! ```
//!
//! Sessions are served from memory, then from a per-profile cache file, and
//! only then renewed by prompting for a code. A renewed session is written
//! back to the cache file so that later processes can reuse it.

use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::profile::ProfileSet;
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use aws_types::os_shim_internal::{Env, Fs};
use directories::ProjectDirs;
use log::Level;
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::errors::{DeployError, Result, ServiceResult};
use crate::logging::log_event;

const MODULE: &str = "deckhand::credentials";
const MIN_MFA_CODE_LEN: usize = 6;
const DEFAULT_CONFIG_FILE: &str = "~/.aws/config";

pub const DEFAULT_SESSION_DURATION: Duration = Duration::from_secs(3600);

/// Role assumption settings of one profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSettings {
    pub name: String,
    pub role_arn: String,
    pub mfa_serial: String,
    pub source_profile: String,
    pub region: Option<String>,
}

impl ProfileSettings {
    /// Reads `profile` from the shared config and credentials files, with
    /// `config_file` in place of `~/.aws/config` when given.
    pub async fn load(profile: &str, config_file: Option<&Path>) -> Result<Self> {
        Self::load_from(profile, config_file, &Fs::real(), &Env::real()).await
    }

    async fn load_from(profile: &str, config_file: Option<&Path>, fs: &Fs, env: &Env) -> Result<Self> {
        let profiles = aws_config::profile::load(fs, env, &profile_files(config_file), None).await?;
        let location = config_file.map_or_else(|| DEFAULT_CONFIG_FILE.to_string(), |p| p.display().to_string());
        Self::from_profile_set(profile, &profiles, &location)
    }

    pub fn from_profile_set(profile: &str, profiles: &ProfileSet, location: &str) -> Result<Self> {
        let section = profiles
            .get_profile(profile)
            .ok_or_else(|| DeployError::ProfileNotFound {
                profile: profile.to_string(),
                location: location.to_string(),
            })?;
        let required = |setting: &'static str| {
            section
                .get(setting)
                .map(str::to_string)
                .ok_or(DeployError::ProfileIncomplete {
                    profile: profile.to_string(),
                    setting,
                })
        };
        Ok(Self {
            name: profile.to_string(),
            role_arn: required("role_arn")?,
            mfa_serial: required("mfa_serial")?,
            source_profile: required("source_profile")?,
            region: section.get("region").map(str::to_string),
        })
    }
}

/// The default shared files, with `config_file` standing in for
/// `~/.aws/config` when given.
pub fn profile_files(config_file: Option<&Path>) -> EnvConfigFiles {
    match config_file {
        Some(path) => EnvConfigFiles::builder()
            .with_file(EnvConfigFileKind::Config, path)
            .include_default_credentials_file(true)
            .build(),
        None => EnvConfigFiles::default(),
    }
}

/// Temporary credentials of an assumed-role session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSession {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[serde(with = "time::serde::timestamp")]
    pub expiration: OffsetDateTime,
}

impl CachedSession {
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expiration
    }
}

impl fmt::Debug for CachedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedSession")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// JSON file holding the last session of one profile.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
}

impl SessionCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `aws-session-credentials-<profile>` in the user cache directory.
    pub fn for_profile(profile: &str) -> Self {
        let dir = ProjectDirs::from("com", "Deckhand", "deckhand")
            .map(|dirs| dirs.cache_dir().to_path_buf())
            .unwrap_or_else(std::env::temp_dir);
        Self::new(dir.join(format!("aws-session-credentials-{profile}")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unreadable or corrupt cache files count as empty.
    pub async fn read(&self) -> Option<CachedSession> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                log::warn!(target: MODULE, "Reading {} failed: {err}", self.path.display());
                return None;
            }
        };
        match serde_json::from_slice(&contents) {
            Ok(session) => Some(session),
            Err(err) => {
                log::warn!(target: MODULE, "Ignoring corrupt session cache {}: {err}", self.path.display());
                None
            }
        }
    }

    pub async fn write(&self, session: &CachedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, serde_json::to_vec(session)?).await?;
        Ok(())
    }
}

#[async_trait]
pub trait MfaPrompt: Send + Sync {
    async fn mfa_code(&self, profile: &str) -> Result<String>;
}

/// Reads the code from standard input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

#[async_trait]
impl MfaPrompt for TerminalPrompt {
    async fn mfa_code(&self, profile: &str) -> Result<String> {
        let prompt = format!("Please enter MFA Code for {profile}: ");
        let line = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let mut stderr = std::io::stderr();
            stderr.write_all(prompt.as_bytes())?;
            stderr.flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))??;
        Ok(line.trim().to_string())
    }
}

pub fn validate_mfa_code(code: &str) -> Result<&str> {
    if code.chars().count() < MIN_MFA_CODE_LEN {
        return Err(DeployError::InvalidMfaCode);
    }
    Ok(code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub mfa_serial: String,
    pub token_code: String,
    pub session_name: String,
    pub duration: Duration,
    /// Profile whose keys sign the request.
    pub source_profile: String,
    pub region: Option<String>,
}

#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> ServiceResult<CachedSession>;
}

pub struct MfaCredentialsProvider {
    settings: ProfileSettings,
    cache: SessionCache,
    prompt: Arc<dyn MfaPrompt>,
    assumer: Arc<dyn RoleAssumer>,
    session_duration: Duration,
    current: Mutex<Option<CachedSession>>,
}

impl MfaCredentialsProvider {
    pub fn new(
        settings: ProfileSettings,
        cache: SessionCache,
        prompt: Arc<dyn MfaPrompt>,
        assumer: Arc<dyn RoleAssumer>,
    ) -> Self {
        Self {
            settings,
            cache,
            prompt,
            assumer,
            session_duration: DEFAULT_SESSION_DURATION,
            current: Mutex::new(None),
        }
    }

    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    pub fn settings(&self) -> &ProfileSettings {
        &self.settings
    }

    /// A valid session, renewing it only when neither memory nor the cache
    /// file holds an unexpired one.
    pub async fn session(&self) -> Result<CachedSession> {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref().filter(|s| !s.is_expired()) {
            return Ok(session.clone());
        }

        let session = match self.cache.read().await.filter(|s| !s.is_expired()) {
            Some(session) => {
                log::debug!(target: MODULE, "Using cached session from {}", self.cache.path().display());
                session
            }
            None => {
                let session = self.request_fresh_session().await?;
                if let Err(err) = self.cache.write(&session).await {
                    log::warn!(target: MODULE, "Persisting session to {} failed: {err}", self.cache.path().display());
                }
                session
            }
        };
        *current = Some(session.clone());
        Ok(session)
    }

    async fn request_fresh_session(&self) -> Result<CachedSession> {
        let code = self.prompt.mfa_code(&self.settings.name).await?;
        let code = validate_mfa_code(&code)?;

        let request = AssumeRoleRequest {
            role_arn: self.settings.role_arn.clone(),
            mfa_serial: self.settings.mfa_serial.clone(),
            token_code: code.to_string(),
            session_name: uuid::Uuid::new_v4().to_string(),
            duration: self.session_duration,
            source_profile: self.settings.source_profile.clone(),
            region: self.settings.region.clone(),
        };
        let session = self.assumer.assume_role(&request).await?;
        log_event(
            Level::Info,
            Some("MFA-0100"),
            MODULE,
            "role assumed",
            Some(json!({
                "profile": self.settings.name,
                "role_arn": request.role_arn,
                "session_name": request.session_name,
                "expiration": session.expiration.unix_timestamp(),
            })),
        );
        Ok(session)
    }
}

impl fmt::Debug for MfaCredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MfaCredentialsProvider")
            .field("settings", &self.settings)
            .field("cache", &self.cache)
            .field("session_duration", &self.session_duration)
            .finish_non_exhaustive()
    }
}
