use std::sync::Arc;
use std::time::Duration;

use log::Level;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::status::{self, DELETE_COMPLETE, DELETE_FAILED, UPDATE_IN_PROGRESS};
use super::{StackApi, StackDescription, StackEvent, StackRequest, StackTemplate};
use crate::errors::{DeployError, Result};
use crate::logging::log_event;
use crate::poll::PollSettings;

const MODULE: &str = "deckhand::stack";
const DOES_NOT_EXIST: &str = "does not exist";
const NO_UPDATES: &str = "No updates are to be performed.";

/// How a stack is deployed and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackDeployOptions {
    /// `CAPABILITY_NAMED_IAM` or `CAPABILITY_IAM`.
    pub capability: String,
    /// Action on a failed creation: `DELETE`, `ROLLBACK` or `DO_NOTHING`.
    pub on_failure: String,
    pub poll: PollSettings,
    pub termination_protection: bool,
}

impl Default for StackDeployOptions {
    fn default() -> Self {
        Self {
            capability: "CAPABILITY_NAMED_IAM".to_string(),
            on_failure: "DELETE".to_string(),
            poll: PollSettings::new(Duration::from_secs(10), Duration::from_secs(1800)),
            termination_protection: false,
        }
    }
}

pub struct StackDeployer {
    api: Arc<dyn StackApi>,
}

impl StackDeployer {
    pub fn new(api: Arc<dyn StackApi>) -> Self {
        Self { api }
    }

    /// Create the stack, update it, or delete and re-create it, depending on
    /// its current status, then wait until it reaches a terminal status.
    ///
    /// An update that changes nothing is not an error.
    pub async fn create_or_update_stack_and_wait(
        &self,
        template: &StackTemplate,
        options: &StackDeployOptions,
    ) -> Result<()> {
        match self.deploy(template, options).await {
            Err(DeployError::Service(err)) if err.mentions(NO_UPDATES) => {
                log::trace!(target: MODULE, "{}", err.message);
                Ok(())
            }
            other => other,
        }
    }

    pub async fn describe_stack(&self, stack_name: &str) -> Result<StackDescription> {
        Ok(self.api.describe_stack(stack_name).await?)
    }

    /// Delete the stack and wait until the provider no longer knows it.
    pub async fn delete_stack_and_wait(&self, stack_name: &str, poll: &PollSettings) -> Result<()> {
        self.api.delete_stack(stack_name).await?;
        let deadline = poll.deadline(format!("deletion of stack {stack_name}"));

        loop {
            deadline.check()?;
            match self.api.describe_stack(stack_name).await {
                Err(err) if err.mentions(DOES_NOT_EXIST) => break,
                Err(err) => {
                    log::warn!(target: MODULE, "Describing stack {stack_name} failed: {err}");
                }
                Ok(stack) if stack.status == DELETE_COMPLETE => break,
                Ok(stack) if stack.status == DELETE_FAILED => {
                    self.raise_first_failure(stack_name, &stack.stack_id).await?;
                    return Err(DeployError::StackFailed {
                        stack: stack_name.to_string(),
                        status: stack.status,
                    });
                }
                Ok(stack) => {
                    log::info!(target: MODULE, "Status of stack {stack_name} is {}...", stack.status);
                }
            }
            poll.pause().await;
        }

        log_event(
            Level::Info,
            Some("CFN-0300"),
            MODULE,
            "stack deleted",
            Some(json!({ "stack": stack_name })),
        );
        Ok(())
    }

    async fn deploy(&self, template: &StackTemplate, options: &StackDeployOptions) -> Result<()> {
        let existing = match self.api.describe_stack(template.name()).await {
            Ok(stack) => stack,
            Err(err) if err.mentions(DOES_NOT_EXIST) => {
                return self.create_stack_and_wait(template, options).await;
            }
            Err(err) => return Err(err.into()),
        };

        if existing.status == DELETE_COMPLETE {
            self.delete_and_create(template, options).await
        } else if status::is_stable(&existing.status) {
            self.update_stack_and_wait(template, options).await
        } else {
            Err(DeployError::InvalidStackStatus(existing.status))
        }
    }

    async fn delete_and_create(
        &self,
        template: &StackTemplate,
        options: &StackDeployOptions,
    ) -> Result<()> {
        log::info!(target: MODULE, "Deleting stack: {} before it can be created.", template.name());
        self.delete_stack_and_wait(template.name(), &options.poll).await?;
        self.create_stack_and_wait(template, options).await
    }

    async fn update_stack_and_wait(
        &self,
        template: &StackTemplate,
        options: &StackDeployOptions,
    ) -> Result<()> {
        log::info!(target: MODULE, "Update stack: {}", template.name());
        self.update_termination_protection(template.name(), options.termination_protection)
            .await?;
        let request = build_request(template, options, false).await?;
        let stack_id = self.api.update_stack(&request).await?;
        log_event(
            Level::Info,
            Some("CFN-0200"),
            MODULE,
            "update requested",
            Some(json!({ "stack": template.name(), "stack_id": stack_id })),
        );
        self.wait_for_stack(template.name(), &stack_id, &options.poll)
            .await
    }

    async fn create_stack_and_wait(
        &self,
        template: &StackTemplate,
        options: &StackDeployOptions,
    ) -> Result<()> {
        log::info!(target: MODULE, "Create stack: {}", template.name());
        let request = build_request(template, options, true).await?;
        let stack_id = self.api.create_stack(&request).await?;
        log_event(
            Level::Info,
            Some("CFN-0100"),
            MODULE,
            "create requested",
            Some(json!({ "stack": template.name(), "stack_id": stack_id })),
        );
        self.wait_for_stack(template.name(), &stack_id, &options.poll)
            .await?;
        self.update_termination_protection(template.name(), options.termination_protection)
            .await
    }

    async fn wait_for_stack(&self, stack_name: &str, stack_id: &str, poll: &PollSettings) -> Result<()> {
        let deadline = poll.deadline(format!("stack {stack_name}"));

        loop {
            deadline.check()?;
            match self.api.describe_stack(stack_name).await {
                Ok(stack) if status::is_success(&stack.status) => {
                    log::info!(target: MODULE, "Status of stack {stack_name} is {}.", stack.status);
                    log_outputs(&stack);
                    break;
                }
                Ok(stack) if status::is_in_progress(&stack.status) => {
                    log::info!(target: MODULE, "Status of stack {stack_name} is {}...", stack.status);
                    poll.pause().await;
                }
                Ok(stack) => {
                    self.raise_first_failure(stack_name, stack_id).await?;
                    return Err(DeployError::StackFailed {
                        stack: stack_name.to_string(),
                        status: stack.status,
                    });
                }
                Err(err) => {
                    self.raise_first_failure(stack_name, stack_id).await?;
                    return Err(DeployError::StackWaitFailed {
                        stack: stack_name.to_string(),
                        source: err,
                    });
                }
            }
        }

        // A creation rolled back with on-failure DELETE ends in DELETE_COMPLETE.
        self.raise_first_failure(stack_name, stack_id).await
    }

    async fn raise_first_failure(&self, stack_name: &str, stack_id: &str) -> Result<()> {
        let events = self.api.stack_events(stack_id).await?;
        match first_failure(&events) {
            Some(event) => {
                let err = DeployError::StackResourceFailed {
                    stack: stack_name.to_string(),
                    status: event.resource_status.clone(),
                    reason: event
                        .resource_status_reason
                        .clone()
                        .unwrap_or_else(|| "none given".to_string()),
                };
                log_event(Level::Error, Some(err.code()), MODULE, &err.to_string(), None);
                Err(err)
            }
            None => Ok(()),
        }
    }

    async fn update_termination_protection(&self, stack_name: &str, enabled: bool) -> Result<()> {
        self.api
            .update_termination_protection(stack_name, enabled)
            .await?;
        log::info!(target: MODULE, "Update termination protection for stack: {stack_name} to {enabled}");
        Ok(())
    }
}

async fn build_request(
    template: &StackTemplate,
    options: &StackDeployOptions,
    create: bool,
) -> Result<StackRequest> {
    Ok(StackRequest {
        stack_name: template.name().to_string(),
        template: template.load_source().await?,
        parameters: template.parameters().to_vec(),
        tags: template.tags().to_vec(),
        capabilities: vec![options.capability.clone()],
        on_failure: create.then(|| options.on_failure.clone()),
    })
}

/// Oldest failing resource event since the most recent `UPDATE_IN_PROGRESS`.
fn first_failure(events: &[StackEvent]) -> Option<&StackEvent> {
    let mut newest_first: Vec<&StackEvent> = events.iter().collect();
    newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    newest_first
        .into_iter()
        .take_while(|event| event.resource_status != UPDATE_IN_PROGRESS)
        .filter(|event| status::is_failing_resource(&event.resource_status))
        .last()
}

fn log_outputs(stack: &StackDescription) {
    log::info!(target: MODULE, "==== Outputs ====");
    if stack.outputs.is_empty() {
        log::info!(target: MODULE, "No outputs!");
    }
    for output in &stack.outputs {
        log::info!(
            target: MODULE,
            "{} ({}) = {}",
            output.key,
            output.description.as_deref().unwrap_or(""),
            output.value
        );
    }
}
