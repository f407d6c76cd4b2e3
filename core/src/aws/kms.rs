use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_kms::types::AliasListEntry;
use aws_sdk_kms::Client;

use super::service_error;
use crate::errors::ServiceResult;
use crate::parameters::{AliasPage, KeyAlias, KeyAliasApi};

#[derive(Debug, Clone)]
pub struct KmsClient {
    client: Client,
}

impl KmsClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl KeyAliasApi for KmsClient {
    async fn list_aliases(&self, marker: Option<String>) -> ServiceResult<AliasPage> {
        let output = self
            .client
            .list_aliases()
            .set_marker(marker)
            .send()
            .await
            .map_err(service_error)?;
        let aliases: Option<&[AliasListEntry]> = output.aliases().into();
        let truncated: Option<bool> = output.truncated().into();

        Ok(AliasPage {
            aliases: aliases
                .unwrap_or_default()
                .iter()
                .filter_map(|entry| {
                    Some(KeyAlias {
                        alias_name: entry.alias_name()?.to_string(),
                        target_key_id: entry.target_key_id().map(str::to_string),
                    })
                })
                .collect(),
            next_marker: output.next_marker().map(str::to_string),
            truncated: truncated.unwrap_or(false),
        })
    }
}
