//! Copy a managed parameter from one account's parameter store into another.

use std::sync::Arc;

use async_trait::async_trait;
use log::Level;
use serde_json::json;

use crate::errors::{DeployError, Result, ServiceResult};
use crate::logging::log_event;

const MODULE: &str = "deckhand::parameters";
const DEFAULT_KEY_NAME: &str = "aws/kms";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParameter {
    pub name: String,
    pub value: String,
    /// `String`, `StringList` or `SecureString`.
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterWrite {
    pub name: String,
    pub value: String,
    pub kind: String,
    pub key_id: Option<String>,
    pub overwrite: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAlias {
    pub alias_name: String,
    pub target_key_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasPage {
    pub aliases: Vec<KeyAlias>,
    pub next_marker: Option<String>,
    pub truncated: bool,
}

#[async_trait]
pub trait ParameterStoreApi: Send + Sync {
    /// Read a parameter, decrypting secure strings.
    async fn get_parameter(&self, name: &str) -> ServiceResult<StoredParameter>;

    /// Returns the version written.
    async fn put_parameter(&self, write: &ParameterWrite) -> ServiceResult<i64>;
}

#[async_trait]
pub trait KeyAliasApi: Send + Sync {
    async fn list_aliases(&self, marker: Option<String>) -> ServiceResult<AliasPage>;
}

/// Key used to encrypt the copied parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EncryptionKey {
    /// The account's default key; no key id is sent.
    #[default]
    Default,
    /// A key looked up by alias name, without the `alias/` prefix.
    Alias(String),
}

impl EncryptionKey {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim_start_matches("alias/");
        if name.is_empty() || name == DEFAULT_KEY_NAME {
            Self::Default
        } else {
            Self::Alias(name.to_string())
        }
    }
}

pub struct ParameterCopier {
    source: Arc<dyn ParameterStoreApi>,
    target: Arc<dyn ParameterStoreApi>,
    keys: Arc<dyn KeyAliasApi>,
}

impl ParameterCopier {
    /// `keys` must list the aliases of the target account.
    pub fn new(
        source: Arc<dyn ParameterStoreApi>,
        target: Arc<dyn ParameterStoreApi>,
        keys: Arc<dyn KeyAliasApi>,
    ) -> Self {
        Self {
            source,
            target,
            keys,
        }
    }

    /// Returns the version of the written target parameter.
    pub async fn copy_parameter(
        &self,
        source_name: &str,
        target_name: &str,
        key: &EncryptionKey,
    ) -> Result<i64> {
        let parameter = self.source.get_parameter(source_name).await?;
        log::info!(target: MODULE, "Successfully read parameter \"{source_name}\".");

        let key_id = match key {
            EncryptionKey::Default => None,
            EncryptionKey::Alias(name) => Some(self.key_id(name).await?),
        };

        let version = self
            .target
            .put_parameter(&ParameterWrite {
                name: target_name.to_string(),
                value: parameter.value,
                kind: parameter.kind,
                key_id,
                overwrite: true,
            })
            .await?;
        log_event(
            Level::Info,
            Some("SSM-0100"),
            MODULE,
            &format!("Successfully set version {version} of parameter \"{target_name}\"."),
            Some(json!({ "source": source_name, "target": target_name, "version": version })),
        );
        Ok(version)
    }

    async fn key_id(&self, key_name: &str) -> Result<String> {
        let alias = format!("alias/{key_name}");
        let mut marker = None;
        loop {
            let page = self.keys.list_aliases(marker).await?;
            let found = page
                .aliases
                .into_iter()
                .find(|entry| entry.alias_name == alias)
                .and_then(|entry| entry.target_key_id);
            if let Some(key_id) = found {
                log::info!(target: MODULE, "Found matching key for alias \"{alias}\" with id \"{key_id}\".");
                return Ok(key_id);
            }
            match page.next_marker {
                Some(next) if page.truncated => {
                    log::info!(target: MODULE, "No key with matching alias found yet, make another request...");
                    marker = Some(next);
                }
                _ => return Err(DeployError::NoEncryptionKeyFound(alias)),
            }
        }
    }
}
