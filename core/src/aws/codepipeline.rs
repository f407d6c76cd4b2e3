use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_codepipeline::Client;

use super::{missing, service_error};
use crate::errors::ServiceResult;
use crate::pipeline::PipelineApi;

#[derive(Debug, Clone)]
pub struct CodePipelineClient {
    client: Client,
}

impl CodePipelineClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl PipelineApi for CodePipelineClient {
    async fn start_execution(&self, pipeline_name: &str) -> ServiceResult<String> {
        let output = self
            .client
            .start_pipeline_execution()
            .name(pipeline_name)
            .send()
            .await
            .map_err(service_error)?;
        output
            .pipeline_execution_id()
            .map(str::to_string)
            .ok_or_else(|| missing("PipelineExecutionId"))
    }

    async fn execution_status(&self, pipeline_name: &str, execution_id: &str) -> ServiceResult<String> {
        let output = self
            .client
            .get_pipeline_execution()
            .pipeline_name(pipeline_name)
            .pipeline_execution_id(execution_id)
            .send()
            .await
            .map_err(service_error)?;
        output
            .pipeline_execution()
            .and_then(|execution| execution.status())
            .map(|status| status.as_str().to_string())
            .ok_or_else(|| missing("PipelineExecution.Status"))
    }
}
