use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client;

use super::{missing, service_error};
use crate::errors::ServiceResult;
use crate::parameters::{ParameterStoreApi, ParameterWrite, StoredParameter};

#[derive(Debug, Clone)]
pub struct SsmClient {
    client: Client,
}

impl SsmClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ParameterStoreApi for SsmClient {
    async fn get_parameter(&self, name: &str) -> ServiceResult<StoredParameter> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(service_error)?;
        let parameter = output.parameter().ok_or_else(|| missing("Parameter"))?;

        Ok(StoredParameter {
            name: parameter.name().unwrap_or(name).to_string(),
            value: parameter.value().unwrap_or_default().to_string(),
            kind: parameter
                .r#type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| ParameterType::String.as_str().to_string()),
        })
    }

    async fn put_parameter(&self, write: &ParameterWrite) -> ServiceResult<i64> {
        let output = self
            .client
            .put_parameter()
            .name(&write.name)
            .value(&write.value)
            .r#type(ParameterType::from(write.kind.as_str()))
            .set_key_id(write.key_id.clone())
            .overwrite(write.overwrite)
            .send()
            .await
            .map_err(service_error)?;
        let version: Option<i64> = output.version().into();
        Ok(version.unwrap_or_default())
    }
}
