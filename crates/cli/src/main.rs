use anyhow::{Result, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

use slsboot_bootstrap::BootstrapStack;
use slsboot_core::{ServiceName, STACK_NAME_SUFFIX};
use slsboot_policy::Policy;
use slsboot_cfn as cfn;

/// Env var consulted when the config file names no service or stack.
const STACK_NAME_ENV: &str = "SLSBOOT_STACK_NAME";

#[derive(Parser, Debug)]
#[command(author, version, about="slsboot — deploy-bootstrap stack builder for serverless apps")]
struct Cli {
    /// Config file (YAML)
    #[arg(short, long, global = true, default_value = "slsboot.yml")]
    file: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "out", global = true)]
    out: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)] enum Cmd {
    /// Render the bootstrap template to the output directory
    Synth,
    /// Run the template checks without writing anything
    Check,
    /// Render, check, and deploy the bootstrap stack
    Deploy {
        #[arg(long)] stack: Option<String>,
    },
    /// Delete the bootstrap stack
    Delete {
        #[arg(long)] stack: Option<String>,
    },
}

#[derive(Deserialize)]
struct Config {
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    stack_name: Option<String>,
    account_id: String,
    region: String,
}

fn resolve_service_name(cfg: &Config) -> Result<ServiceName> {
    if let Some(name) = &cfg.service_name {
        return Ok(ServiceName::new(name.clone())?);
    }
    if let Some(stack) = &cfg.stack_name {
        return Ok(ServiceName::from_stack_name(stack)?);
    }
    // env lookup lives here and nowhere below the CLI
    let stack = std::env::var(STACK_NAME_ENV)
        .with_context(|| format!("config names no service_name or stack_name and {STACK_NAME_ENV} is unset"))?;
    Ok(ServiceName::from_stack_name(&stack)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().json().with_span_events(FmtSpan::CLOSE).init();
    let cli = Cli::parse();

    let cfg: Config = serde_yaml::from_slice(
        &std::fs::read(&cli.file).with_context(|| format!("read config {}", cli.file.display()))?,
    )
    .with_context(|| format!("parse config {}", cli.file.display()))?;

    let service = resolve_service_name(&cfg)?;
    let bootstrap = BootstrapStack::new(service.clone(), cfg.account_id.clone(), cfg.region.clone());
    let template = bootstrap.build();
    let template_json = serde_json::to_value(&template)?;

    // never hand CloudFormation a template that failed the checks
    Policy::new(service.as_str()).check_template(&template_json)?;

    let default_stack = || format!("{}{}", service, STACK_NAME_SUFFIX);
    match cli.cmd {
        Cmd::Synth => {
            let path = template.write_json(&cli.out)?;
            info!(template = %path.display(), "bootstrap template written");
        }
        Cmd::Check => {
            info!(service = %service, "bootstrap template passed all checks");
        }
        Cmd::Deploy { stack } => {
            let stack_name = stack.unwrap_or_else(default_stack);
            let path = template.write_json(&cli.out)?;
            cfn::deploy_stack(&stack_name, &path, Some(&cfg.region))?;
            info!(stack = %stack_name, "bootstrap stack deployed");
        }
        Cmd::Delete { stack } => {
            let stack_name = stack.unwrap_or_else(default_stack);
            cfn::delete_stack(&stack_name, Some(&cfg.region))?;
            info!(stack = %stack_name, "bootstrap stack deletion requested");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn explicit_service_name_wins() {
        let cfg = config("service_name: orders-api\naccount_id: '111111111111'\nregion: us-east-1\n");
        assert_eq!(resolve_service_name(&cfg).unwrap().as_str(), "orders-api");
    }

    #[test]
    fn stack_name_is_stripped() {
        let cfg = config(
            "stack_name: orders-api-deploy-bootstrap\naccount_id: '111111111111'\nregion: us-east-1\n",
        );
        assert_eq!(resolve_service_name(&cfg).unwrap().as_str(), "orders-api");
    }

    #[test]
    fn unsuffixed_stack_name_is_an_error() {
        let cfg = config("stack_name: orders-api\naccount_id: '111111111111'\nregion: us-east-1\n");
        assert!(resolve_service_name(&cfg).is_err());
    }
}
