use std::path::PathBuf;
use std::time::Duration;

use aws_config::profile::ProfileFileLoadError;
use thiserror::Error;

/// Failure reported by a provider API, reduced to its error code and message.
///
/// Wrappers decide what to do with a provider failure by inspecting the
/// message text or the code, so both are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub code: Option<String>,
    pub message: String,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// True when the provider message contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.message.contains(needle)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)] Service(#[from] ServiceError),
    #[error("Timeout waiting for {operation} after {} secs", .after.as_secs())]
    Timeout { operation: String, after: Duration },
    #[error("Invalid status for update: {0}")] InvalidStackStatus(String),
    #[error("Status of stack {stack} was {status}. Reason: {reason}")]
    StackResourceFailed {
        stack: String,
        status: String,
        reason: String,
    },
    #[error("Status of stack {stack} is {status}. It seems to be failed!")]
    StackFailed { stack: String, status: String },
    #[error("Waiting for stack {stack} failed!")]
    StackWaitFailed {
        stack: String,
        #[source]
        source: ServiceError,
    },
    #[error("Could not read TemplateFile.")]
    TemplateUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Hosted zone {0} not found")] HostedZoneNotFound(String),
    #[error("Validation of certificate {arn} ended with status {status}")]
    CertificateValidationFailed { arn: String, status: String },
    #[error("Registry returned no authorization data")] MissingAuthorizationData,
    #[error("Registry authorization token is malformed: {0}")] MalformedAuthorizationToken(String),
    #[error("No matching key found for alias \"{0}\"")] NoEncryptionKeyFound(String),
    #[error("Pipeline {pipeline} has final status {status}")]
    PipelineFailed { pipeline: String, status: String },
    #[error("Can't find execution id {execution_id} for pipeline {pipeline} after {secs} secs.")]
    PipelineExecutionNotFound {
        pipeline: String,
        execution_id: String,
        secs: u64,
    },
    #[error("Provider response is missing {0}")] MissingField(&'static str),
    #[error("Invalid request: {0}")] InvalidRequest(String),
    #[error("Download of {url} failed")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("No profile named {profile} found in {location}")]
    ProfileNotFound { profile: String, location: String },
    #[error("Profile {profile} has no {setting} setting")]
    ProfileIncomplete {
        profile: String,
        setting: &'static str,
    },
    #[error("Reading the shared AWS config failed: {0}")] ProfileFile(#[from] ProfileFileLoadError),
    #[error("You must enter a valid MFA Code!")] InvalidMfaCode,
    #[error("Configuration error: {0}")] Config(String),
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Json(#[from] serde_json::Error),
}

impl DeployError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Service(_) => "AWS-1000",
            Self::Timeout { .. } => "GEN-1001",
            Self::InvalidStackStatus(_) => "CFN-1001",
            Self::StackResourceFailed { .. } => "CFN-1002",
            Self::StackFailed { .. } => "CFN-1003",
            Self::StackWaitFailed { .. } => "CFN-1004",
            Self::TemplateUnreadable { .. } => "CFN-1005",
            Self::HostedZoneNotFound(_) => "ACM-1001",
            Self::CertificateValidationFailed { .. } => "ACM-1002",
            Self::MissingAuthorizationData => "ECR-1001",
            Self::MalformedAuthorizationToken(_) => "ECR-1002",
            Self::NoEncryptionKeyFound(_) => "SSM-1001",
            Self::PipelineFailed { .. } => "CPL-1001",
            Self::PipelineExecutionNotFound { .. } => "CPL-1002",
            Self::MissingField(_) => "AWS-1001",
            Self::InvalidRequest(_) => "GEN-1002",
            Self::Download { .. } => "S3-1001",
            Self::ProfileNotFound { .. } => "MFA-1001",
            Self::ProfileIncomplete { .. } => "MFA-1002",
            Self::InvalidMfaCode => "MFA-1003",
            Self::ProfileFile(_) => "MFA-1004",
            Self::Config(_) => "CFG-1001",
            Self::Io(_) => "GEN-1003",
            Self::Json(_) => "GEN-1004",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::Service(_) => "The provider rejected a request.",
            Self::Timeout { .. } => "The operation did not reach a terminal status in time.",
            Self::InvalidStackStatus(_) => "The stack is in a state that neither allows an update nor a re-create.",
            Self::StackResourceFailed { .. } => "A resource of the stack failed; the reason is taken from the stack events.",
            Self::StackFailed { .. } => "The stack ended in a failed status without a failing resource event.",
            Self::StackWaitFailed { .. } => "The stack status could not be read while waiting.",
            Self::TemplateUnreadable { .. } => "The local template file could not be read.",
            Self::HostedZoneNotFound(_) => "No hosted zone with the given name exists in the account.",
            Self::CertificateValidationFailed { .. } => "DNS validation of the requested certificate failed.",
            Self::MissingAuthorizationData => "The registry did not hand out an authorization token.",
            Self::MalformedAuthorizationToken(_) => "The registry token is not a base64 encoded user:password pair.",
            Self::NoEncryptionKeyFound(_) => "No KMS key alias with the requested name exists in the target account.",
            Self::PipelineFailed { .. } => "The pipeline execution finished unsuccessfully.",
            Self::PipelineExecutionNotFound { .. } => "The started pipeline execution never became visible.",
            Self::MissingField(_) => "The provider response lacked a field that is always expected.",
            Self::InvalidRequest(_) => "A request value could not be sent to the provider.",
            Self::Download { .. } => "The artifact could not be downloaded from its URL.",
            Self::ProfileNotFound { .. } => "The named profile is not present in the AWS config file.",
            Self::ProfileIncomplete { .. } => "The profile lacks a setting required for MFA role assumption.",
            Self::InvalidMfaCode => "MFA codes have at least six characters.",
            Self::ProfileFile(_) => "The shared AWS config or credentials file could not be read or parsed.",
            Self::Config(_) => "The deckhand configuration could not be loaded.",
            Self::Io(_) => "A local file operation failed.",
            Self::Json(_) => "A JSON document could not be read or written.",
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;

/// Outcome of one call through a service seam.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_matches_on_message_and_code() {
        let err = ServiceError::with_code("ValidationError", "Stack with id x does not exist");
        assert!(err.mentions("does not exist"));
        assert!(err.has_code("ValidationError"));
        assert!(!ServiceError::new("boom").has_code("ValidationError"));
    }

    #[test]
    fn messages_keep_their_wording() {
        let err = DeployError::PipelineFailed {
            pipeline: "pipeline".into(),
            status: "Failed".into(),
        };
        assert_eq!(err.to_string(), "Pipeline pipeline has final status Failed");
        assert_eq!(err.code(), "CPL-1001");

        let err = DeployError::timeout("stack TestStack", Duration::from_secs(1800));
        assert_eq!(err.to_string(), "Timeout waiting for stack TestStack after 1800 secs");
    }
}
