use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Subcommand;
use deckhand_core::artifacts::{ArtifactLoader, HttpFetcher, LoadOutcome};
use deckhand_core::aws::acm::AcmClient;
use deckhand_core::aws::cloudformation::CloudFormationClient;
use deckhand_core::aws::codepipeline::CodePipelineClient;
use deckhand_core::aws::ecr::EcrClient;
use deckhand_core::aws::kms::KmsClient;
use deckhand_core::aws::route53::Route53Client;
use deckhand_core::aws::s3::S3Client;
use deckhand_core::aws::ssm::SsmClient;
use deckhand_core::aws::load_sdk_config;
use deckhand_core::certificate::CertificateClient;
use deckhand_core::config::DeployConfig;
use deckhand_core::parameters::{EncryptionKey, ParameterCopier};
use deckhand_core::pipeline::PipelineRunner;
use deckhand_core::registry_auth::RegistryAuthorizer;
use deckhand_core::stack::{StackDeployer, StackTemplate};
use serde_json::json;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Subcommand)]
pub enum StackCommands {
    /// Create, update or re-create a stack and wait for it
    Deploy {
        #[arg(long)]
        name: String,
        /// Template URL (http/https) or local file
        #[arg(long)]
        template: String,
        /// Stack parameter, repeatable
        #[arg(long = "param", value_parser = parse_key_val)]
        parameters: Vec<(String, String)>,
        /// Stack tag, repeatable
        #[arg(long = "tag", value_parser = parse_key_val)]
        tags: Vec<(String, String)>,
        #[arg(long)]
        capability: Option<String>,
        /// DELETE, ROLLBACK or DO_NOTHING
        #[arg(long)]
        on_failure: Option<String>,
        #[arg(long)]
        termination_protection: bool,
        /// Seconds between status checks
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Delete a stack and wait until it is gone
    Delete {
        #[arg(long)]
        name: String,
    },
}

pub async fn stack(command: StackCommands, config: &DeployConfig) -> Result<()> {
    let sdk = load_sdk_config(config).await?;
    let deployer = StackDeployer::new(Arc::new(CloudFormationClient::new(&sdk)));

    match command {
        StackCommands::Deploy {
            name,
            template,
            parameters,
            tags,
            capability,
            on_failure,
            termination_protection,
            interval,
        } => {
            let mut options = config.stack.clone();
            if let Some(capability) = capability {
                options.capability = capability;
            }
            if let Some(on_failure) = on_failure {
                options.on_failure = on_failure;
            }
            if let Some(interval) = interval {
                options.poll = options.poll.with_interval(Duration::from_secs(interval));
            }
            options.termination_protection |= termination_protection;

            let template = StackTemplate::new(&name, &template)
                .with_parameters(parameters)
                .with_tags(tags);
            deployer
                .create_or_update_stack_and_wait(&template, &options)
                .await
                .with_context(|| format!("deploying stack {name} failed"))?;

            let stack = deployer.describe_stack(&name).await?;
            print_json(&json!({
                "stack_id": stack.stack_id,
                "status": stack.status,
                "outputs": stack.outputs,
            }))
        }
        StackCommands::Delete { name } => {
            deployer
                .delete_stack_and_wait(&name, &config.stack.poll)
                .await
                .with_context(|| format!("deleting stack {name} failed"))?;
            print_json(&json!({ "stack": name, "deleted": true }))
        }
    }
}

pub async fn certificate(hosted_zone: &str, domain: &str, config: &DeployConfig) -> Result<()> {
    let sdk = load_sdk_config(config).await?;
    let client = CertificateClient::with_options(
        Arc::new(AcmClient::new(&sdk)),
        Arc::new(Route53Client::new(&sdk)),
        config.certificate.clone(),
    );
    let arn = client
        .retrieve_or_request_certificate(hosted_zone, domain)
        .await
        .with_context(|| format!("no certificate for {domain}"))?;
    print_json(&json!({ "domain": domain, "certificate_arn": arn }))
}

pub async fn ecr_login(config: &DeployConfig) -> Result<()> {
    let sdk = load_sdk_config(config).await?;
    let credentials = RegistryAuthorizer::new(Arc::new(EcrClient::new(&sdk)))
        .docker_credentials()
        .await?;
    print_json(&serde_json::to_value(credentials)?)
}

pub async fn copy_parameter(
    source: &str,
    target: &str,
    key_alias: &str,
    source_profile: Option<&str>,
    target_profile: Option<&str>,
    config: &DeployConfig,
) -> Result<()> {
    let source_sdk = load_sdk_config(&with_profile(config, source_profile)).await?;
    let target_sdk = load_sdk_config(&with_profile(config, target_profile)).await?;
    let copier = ParameterCopier::new(
        Arc::new(SsmClient::new(&source_sdk)),
        Arc::new(SsmClient::new(&target_sdk)),
        Arc::new(KmsClient::new(&target_sdk)),
    );

    let version = copier
        .copy_parameter(source, target, &EncryptionKey::from_name(key_alias))
        .await
        .with_context(|| format!("copying parameter {source} to {target} failed"))?;
    print_json(&json!({ "source": source, "target": target, "version": version }))
}

pub async fn pipeline(name: &str, interval: Option<u64>, config: &DeployConfig) -> Result<()> {
    let sdk = load_sdk_config(config).await?;
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.pipeline_interval());
    let status = PipelineRunner::new(Arc::new(CodePipelineClient::new(&sdk)))
        .start_pipeline_and_wait_for_success(name, interval)
        .await?;
    print_json(&json!({ "pipeline": name, "status": status }))
}

pub async fn artifact(url: &str, md5: &str, bucket: &str, key: &str, config: &DeployConfig) -> Result<()> {
    let sdk = load_sdk_config(config).await?;
    let loader = ArtifactLoader::new(
        Arc::new(S3Client::new(&sdk)),
        Arc::new(HttpFetcher::with_timeout(DOWNLOAD_TIMEOUT)?),
    );
    let outcome = loader
        .load_if_not_present(url, md5, bucket, key)
        .await
        .with_context(|| format!("mirroring {url} to s3://{bucket}/{key} failed"))?;
    print_json(&json!({
        "bucket": bucket,
        "key": key,
        "uploaded": outcome == LoadOutcome::Uploaded,
    }))
}

/// A copy of `config` that uses `profile` when one is given.
fn with_profile(config: &DeployConfig, profile: Option<&str>) -> DeployConfig {
    let mut config = config.clone();
    if let Some(profile) = profile {
        config.profile = Some(profile.to_string());
    }
    config
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}
