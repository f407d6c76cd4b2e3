use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::certificate::CertificateOptions;
use crate::errors::{DeployError, Result};
use crate::stack::StackDeployOptions;

const CONFIG_FILE: &str = "config.json";

/// Settings shared by every command. Each field falls back to its default
/// when missing from the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    /// Assume the profile's role with an MFA code.
    pub mfa: bool,
    pub session_duration_secs: u64,
    /// Shared AWS config file holding the MFA profiles.
    pub aws_config_file: Option<PathBuf>,
    pub stack: StackDeployOptions,
    pub certificate: CertificateOptions,
    pub pipeline_interval_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            mfa: false,
            session_duration_secs: 3600,
            aws_config_file: None,
            stack: StackDeployOptions::default(),
            certificate: CertificateOptions::default(),
            pipeline_interval_secs: 10,
        }
    }
}

impl DeployConfig {
    /// Load `path`, or the default location when `None`. A missing file at
    /// the default location yields the defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|err| DeployError::Config(format!("cannot read {}: {err}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|err| DeployError::Config(format!("invalid {}: {err}", path.display())))
    }

    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_secs)
    }

    pub fn pipeline_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline_interval_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "Deckhand", "deckhand").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_the_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{
                "region": "eu-west-1",
                "mfa": true,
                "stack": { "on_failure": "ROLLBACK", "poll": { "interval": 5, "timeout": 600 } }
            }"#,
        )
        .unwrap();

        let config = DeployConfig::load(Some(&path)).unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert!(config.mfa);
        assert_eq!(config.session_duration(), Duration::from_secs(3600));
        assert_eq!(config.stack.on_failure, "ROLLBACK");
        assert_eq!(config.stack.capability, "CAPABILITY_NAMED_IAM");
        assert_eq!(config.stack.poll.interval, Duration::from_secs(5));
        assert_eq!(config.stack.poll.timeout, Duration::from_secs(600));
        assert_eq!(config.certificate, CertificateOptions::default());
        assert_eq!(config.pipeline_interval(), Duration::from_secs(10));
    }

    #[test]
    fn explicit_paths_must_exist_and_parse() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = DeployConfig::load(Some(&missing)).unwrap_err();
        assert_eq!(err.code(), "CFG-1001");

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ region: ").unwrap();
        assert!(matches!(DeployConfig::load(Some(&broken)), Err(DeployError::Config(_))));
    }
}
