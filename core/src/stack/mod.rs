//! Stack orchestration: create, update or re-create a stack from a template
//! and wait until it settles.
//!
//! [`StackDeployer`] holds the decision logic; it reaches the provider only
//! through [`StackApi`], implemented for CloudFormation in
//! [`crate::aws::cloudformation`].

mod deployer;
pub mod status;
mod template;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceResult;

pub use deployer::{StackDeployOptions, StackDeployer};
pub use template::{
    stack, Entries, StackBuilder, StackParameter, StackTag, StackTemplate, TemplateSource,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDescription {
    pub stack_id: String,
    pub stack_name: String,
    pub status: String,
    pub outputs: Vec<StackOutput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
    pub resource_status: String,
    pub resource_status_reason: Option<String>,
}

/// Everything sent with a create or update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub stack_name: String,
    pub template: TemplateSource,
    pub parameters: Vec<StackParameter>,
    pub tags: Vec<StackTag>,
    pub capabilities: Vec<String>,
    /// Only used on create.
    pub on_failure: Option<String>,
}

#[async_trait]
pub trait StackApi: Send + Sync {
    /// Describe a stack by name or id. A missing stack is reported as an
    /// error whose message contains `does not exist`.
    async fn describe_stack(&self, stack_name: &str) -> ServiceResult<StackDescription>;

    /// Returns the id of the new stack.
    async fn create_stack(&self, request: &StackRequest) -> ServiceResult<String>;

    /// Returns the id of the updated stack.
    async fn update_stack(&self, request: &StackRequest) -> ServiceResult<String>;

    async fn delete_stack(&self, stack_name: &str) -> ServiceResult<()>;

    async fn stack_events(&self, stack_id: &str) -> ServiceResult<Vec<StackEvent>>;

    async fn update_termination_protection(
        &self,
        stack_name: &str,
        enabled: bool,
    ) -> ServiceResult<()>;
}
