//! deckhand - scripted deployment helpers for AWS
//!
//! Each subcommand runs one wrapper from `deckhand_core` and prints its
//! result as JSON, so deployment scripts can chain the steps:
//! - deploy or delete a stack
//! - find or issue a DNS-validated certificate
//! - print registry login data
//! - copy a managed parameter between accounts
//! - run a delivery pipeline to completion
//! - mirror an artifact into a bucket

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use deckhand_core::config::DeployConfig;
use deckhand_core::errors::DeployError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::StackCommands;

#[derive(Parser)]
#[command(name = "deckhand")]
#[command(about = "Deployment helpers for stacks, certificates, registries, parameters and pipelines", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DECKHAND_CONFIG")]
    config: Option<PathBuf>,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Named profile from the shared AWS config
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Assume the profile's role with an MFA code
    #[arg(long)]
    mfa: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy or delete a stack
    Stack {
        #[command(subcommand)]
        command: StackCommands,
    },

    /// Find or request a certificate validated through the hosted zone
    Certificate {
        #[arg(long)]
        hosted_zone: String,
        #[arg(long)]
        domain: String,
    },

    /// Print docker login credentials for the registry
    EcrLogin,

    /// Copy a parameter into another account's parameter store
    CopyParameter {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// KMS alias (without `alias/`) used to encrypt the copy
        #[arg(long, default_value = "aws/kms")]
        key_alias: String,
        /// Profile to read the parameter with
        #[arg(long)]
        source_profile: Option<String>,
        /// Profile to write the parameter with
        #[arg(long)]
        target_profile: Option<String>,
    },

    /// Start a pipeline and wait for it to succeed
    Pipeline {
        #[arg(long)]
        name: String,
        /// Seconds between status checks
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Upload an artifact unless the bucket already holds it
    Artifact {
        #[arg(long)]
        url: String,
        #[arg(long)]
        md5: String,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        key: String,
    },
}

impl Cli {
    /// Command line flags win over the configuration file.
    fn apply_overrides(&self, config: &mut DeployConfig) {
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(profile) = &self.profile {
            config.profile = Some(profile.clone());
        }
        if self.mfa {
            config.mfa = true;
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).without_time())
        .init();

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<DeployError>() {
            Some(deploy) => eprintln!("[{}] {err:#}\n  {}", deploy.code(), deploy.explain()),
            None => eprintln!("{err:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = DeployConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    log::debug!("Effective configuration: {config:?}");

    match cli.command {
        Commands::Stack { command } => commands::stack(command, &config).await,
        Commands::Certificate { hosted_zone, domain } => {
            commands::certificate(&hosted_zone, &domain, &config).await
        }
        Commands::EcrLogin => commands::ecr_login(&config).await,
        Commands::CopyParameter {
            source,
            target,
            key_alias,
            source_profile,
            target_profile,
        } => {
            commands::copy_parameter(
                &source,
                &target,
                &key_alias,
                source_profile.as_deref(),
                target_profile.as_deref(),
                &config,
            )
            .await
        }
        Commands::Pipeline { name, interval } => commands::pipeline(&name, interval, &config).await,
        Commands::Artifact { url, md5, bucket, key } => {
            commands::artifact(&url, &md5, &bucket, &key, &config).await
        }
    }
}
