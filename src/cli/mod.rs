pub mod commands;
pub mod utils;

use crate::assembler::Variant;
use crate::config::{config, AppConfig};
use crate::preflight::OnboardingType;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "onboard-preflight")]
#[command(about = "Permission preflight and parameter assembly for Azure onboarding deployments")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Parameter file with KEY=value definitions")]
    pub params: Option<PathBuf>,

    #[arg(long, global = true, help = "File holding the temporary grant record")]
    pub state_file: Option<PathBuf>,

    #[arg(long, global = true, help = "ARM template (JSON) whose declared parameters gate optional outputs")]
    pub template: Option<PathBuf>,

    #[arg(long, global = true, help = "Azure CLI executable")]
    pub az: Option<String>,

    #[arg(long, global = true, help = "Pretty-print JSON output")]
    pub pretty: bool,

    #[arg(long, global = true, help = "Output status commands in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Check permissions with direct az queries, optionally self-granting a temporary role")]
    Local {
        #[arg(default_value = "", help = "Target management group id")]
        management_group_id: String,
        #[arg(default_value = "", help = "Subscription id")]
        subscription_id: String,
        #[arg(default_value = "true", value_parser = parse_flag, action = clap::ArgAction::Set, help = "Run preflight checks (true/false)")]
        preflight_enabled: bool,
        #[arg(default_value = "false", value_parser = parse_flag, action = clap::ArgAction::Set, help = "Self-grant the role when missing (true/false)")]
        self_grant: bool,
    },

    #[command(about = "Delegate permission checks to the pinned external preflight tool")]
    Delegated {
        #[arg(default_value = "", help = "Target scope id (tenant root or management group id)")]
        scope_id: String,
        #[arg(default_value = "", help = "Subscription id")]
        subscription_id: String,
        #[arg(default_value = "true", value_parser = parse_flag, action = clap::ArgAction::Set, help = "Run preflight checks (true/false)")]
        preflight_enabled: bool,
        #[arg(default_value = "management-group", value_parser = parse_onboarding_type, help = "tenant or management-group")]
        onboarding_type: OnboardingType,
    },

    #[command(about = "Revoke the temporary role assignment and clear the grant record")]
    Revoke {
        #[arg(long, help = "Role assignment id (defaults to the persisted grant record)")]
        assignment_id: Option<String>,
        #[arg(long, help = "Management group the grant record must belong to")]
        management_group_id: Option<String>,
    },

    #[command(about = "Show the persisted grant record")]
    Status {
        #[arg(long, help = "Management group the grant record must belong to")]
        management_group_id: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Ok(true),
        "false" | "0" | "no" | "n" | "off" | "" => Ok(false),
        other => Err(format!("expected true or false, got '{}'", other)),
    }
}

fn parse_onboarding_type(value: &str) -> Result<OnboardingType, String> {
    value.parse()
}

/// Global flags that take a separate value argument.
const GLOBAL_VALUE_FLAGS: &[&str] = &["--params", "--state-file", "--template", "--az"];

/// Preflight variant named by the subcommand in `args` (program name
/// excluded), or None when the subcommand is something else.
pub fn invoked_variant<S: AsRef<str>>(args: &[S]) -> Option<Variant> {
    let mut iter = args.iter().map(AsRef::as_ref);
    while let Some(arg) = iter.next() {
        if GLOBAL_VALUE_FLAGS.contains(&arg) {
            iter.next();
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return match arg {
            "local" => Some(Variant::Local),
            "delegated" => Some(Variant::Delegated),
            _ => None,
        };
    }
    None
}

/// Global config with CLI flag overrides applied.
pub fn resolve_config(cli: &Cli, base: &AppConfig) -> AppConfig {
    let mut resolved = base.clone();
    if let Some(path) = &cli.params {
        resolved.paths.params_file = path.clone();
    }
    if let Some(path) = &cli.state_file {
        resolved.paths.state_file = path.clone();
    }
    if let Some(path) = &cli.template {
        resolved.paths.template_file = Some(path.clone());
    }
    if let Some(az) = &cli.az {
        resolved.azure.az_binary = az.clone();
    }
    resolved
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let settings = resolve_config(&cli, config());
    let pretty = cli.pretty;

    match cli.command {
        Commands::Local {
            management_group_id,
            subscription_id,
            preflight_enabled,
            self_grant,
        } => commands::local::handle(
            commands::local::LocalArgs {
                management_group_id,
                subscription_id,
                preflight_enabled,
                self_grant,
            },
            &settings,
            pretty,
        ),
        Commands::Delegated {
            scope_id,
            subscription_id,
            preflight_enabled,
            onboarding_type,
        } => commands::delegated::handle(
            commands::delegated::DelegatedArgs {
                scope_id,
                subscription_id,
                preflight_enabled,
                onboarding_type,
            },
            &settings,
            pretty,
        ),
        Commands::Revoke {
            assignment_id,
            management_group_id,
        } => commands::revoke::handle(assignment_id, management_group_id, &settings, output_format),
        Commands::Status { management_group_id } => {
            commands::status::handle(management_group_id, &settings, output_format)
        }
    }
}
