use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_cloudformation::primitives::DateTime;
use aws_sdk_cloudformation::types::{Capability, OnFailure, Output, Parameter, Stack, StackStatus, Tag};
use aws_sdk_cloudformation::Client;

use super::{missing, service_error};
use crate::errors::ServiceResult;
use crate::stack::{StackApi, StackDescription, StackEvent, StackOutput, StackRequest, TemplateSource};

#[derive(Debug, Clone)]
pub struct CloudFormationClient {
    client: Client,
}

impl CloudFormationClient {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }

    fn parameters(request: &StackRequest) -> Vec<Parameter> {
        request
            .parameters
            .iter()
            .map(|p| {
                Parameter::builder()
                    .parameter_key(&p.key)
                    .parameter_value(&p.value)
                    .build()
            })
            .collect()
    }

    fn tags(request: &StackRequest) -> ServiceResult<Vec<Tag>> {
        request
            .tags
            .iter()
            .map(|t| Ok(Tag::builder().key(&t.key).value(&t.value).build()))
            .collect()
    }

    fn capabilities(request: &StackRequest) -> Vec<Capability> {
        request
            .capabilities
            .iter()
            .map(|c| Capability::from(c.as_str()))
            .collect()
    }
}

fn describe(stack: &Stack) -> ServiceResult<StackDescription> {
    let stack_id: Option<&str> = stack.stack_id().into();
    let stack_name: Option<&str> = stack.stack_name().into();
    let status: Option<&StackStatus> = stack.stack_status().into();
    let outputs: Option<&[Output]> = stack.outputs().into();

    Ok(StackDescription {
        stack_id: stack_id.unwrap_or_default().to_string(),
        stack_name: stack_name.ok_or_else(|| missing("StackName"))?.to_string(),
        status: status.ok_or_else(|| missing("StackStatus"))?.as_str().to_string(),
        outputs: outputs
            .unwrap_or_default()
            .iter()
            .map(|o| StackOutput {
                key: o.output_key().unwrap_or_default().to_string(),
                value: o.output_value().unwrap_or_default().to_string(),
                description: o.description().map(str::to_string),
            })
            .collect(),
    })
}

#[async_trait]
impl StackApi for CloudFormationClient {
    async fn describe_stack(&self, stack_name: &str) -> ServiceResult<StackDescription> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(service_error)?;
        let stacks: Option<&[Stack]> = output.stacks().into();
        let stack = stacks
            .unwrap_or_default()
            .first()
            .ok_or_else(|| missing("Stacks"))?;
        describe(stack)
    }

    async fn create_stack(&self, request: &StackRequest) -> ServiceResult<String> {
        let mut builder = self
            .client
            .create_stack()
            .stack_name(&request.stack_name)
            .set_parameters(Some(Self::parameters(request)))
            .set_tags(Some(Self::tags(request)?))
            .set_capabilities(Some(Self::capabilities(request)));
        builder = match &request.template {
            TemplateSource::Url(url) => builder.template_url(url),
            TemplateSource::Body(body) => builder.template_body(body),
        };
        if let Some(on_failure) = &request.on_failure {
            builder = builder.on_failure(OnFailure::from(on_failure.as_str()));
        }

        let output = builder.send().await.map_err(service_error)?;
        output
            .stack_id()
            .map(str::to_string)
            .ok_or_else(|| missing("StackId"))
    }

    async fn update_stack(&self, request: &StackRequest) -> ServiceResult<String> {
        let mut builder = self
            .client
            .update_stack()
            .stack_name(&request.stack_name)
            .set_parameters(Some(Self::parameters(request)))
            .set_tags(Some(Self::tags(request)?))
            .set_capabilities(Some(Self::capabilities(request)));
        builder = match &request.template {
            TemplateSource::Url(url) => builder.template_url(url),
            TemplateSource::Body(body) => builder.template_body(body),
        };

        let output = builder.send().await.map_err(service_error)?;
        output
            .stack_id()
            .map(str::to_string)
            .ok_or_else(|| missing("StackId"))
    }

    async fn delete_stack(&self, stack_name: &str) -> ServiceResult<()> {
        self.client
            .delete_stack()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }

    async fn stack_events(&self, stack_id: &str) -> ServiceResult<Vec<StackEvent>> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(service_error)?;
        let events: Option<&[aws_sdk_cloudformation::types::StackEvent]> = output.stack_events().into();

        Ok(events
            .unwrap_or_default()
            .iter()
            .map(|event| {
                let timestamp: Option<&DateTime> = event.timestamp().into();
                StackEvent {
                    timestamp: timestamp.and_then(|t| t.to_millis().ok()).unwrap_or_default(),
                    resource_status: event
                        .resource_status()
                        .map(|s| s.as_str().to_string())
                        .unwrap_or_default(),
                    resource_status_reason: event.resource_status_reason().map(str::to_string),
                }
            })
            .collect())
    }

    async fn update_termination_protection(&self, stack_name: &str, enabled: bool) -> ServiceResult<()> {
        self.client
            .update_termination_protection()
            .stack_name(stack_name)
            .enable_termination_protection(enabled)
            .send()
            .await
            .map_err(service_error)?;
        Ok(())
    }
}
