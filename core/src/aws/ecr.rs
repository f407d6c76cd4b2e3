use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ecr::Client;

use super::service_error;
use crate::errors::ServiceResult;
use crate::registry_auth::{AuthorizationData, RegistryApi};

#[derive(Debug, Clone)]
pub struct EcrClient {
    client: Client,
}

impl EcrClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl RegistryApi for EcrClient {
    async fn authorization_data(&self) -> ServiceResult<Vec<AuthorizationData>> {
        let output = self
            .client
            .get_authorization_token()
            .send()
            .await
            .map_err(service_error)?;
        let data: Option<&[aws_sdk_ecr::types::AuthorizationData]> = output.authorization_data().into();

        Ok(data
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| {
                Some(AuthorizationData {
                    authorization_token: entry.authorization_token()?.to_string(),
                    proxy_endpoint: entry.proxy_endpoint().map(str::to_string),
                })
            })
            .collect())
    }
}
