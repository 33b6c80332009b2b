//! # Command Line Interface
//!
//! `vaultsync list|copy|mirror` run one action and print a summary;
//! `vaultsync serve` starts the HTTP control surface. Server addresses and
//! tokens fall back to `VAULTSYNC_SRC_VAULT_*` / `VAULTSYNC_DST_VAULT_*`.

pub mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use crate::config::{
    ObservabilityConfig, SourceConfig, SyncAction, SyncSettings, VaultConfig,
    DEFAULT_LIST_OUTPUT_FILE, DEFAULT_MAX_DEPTH, DEFAULT_WORKERS,
};
use crate::control::{start_control_server, ControlState};
use crate::observability::init_logging;
use crate::pipeline::Pipeline;
use crate::planner::DiffPolicy;

#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(about = "Copy, mirror and snapshot Vault KV trees")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub sync: SyncArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Summary format (table or json)
    #[arg(long, global = true, default_value = "table")]
    pub output: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Number of parallel workers
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// Source Vault address
    #[arg(long, global = true)]
    pub src_addr: Option<String>,

    /// Source Vault token
    #[arg(long, global = true)]
    pub src_token: Option<String>,

    /// Read the source tree from a snapshot file instead of a Vault server
    #[arg(long, global = true)]
    pub src_input_file: Option<PathBuf>,

    /// Destination Vault address
    #[arg(long, global = true)]
    pub dst_addr: Option<String>,

    /// Destination Vault token
    #[arg(long, global = true)]
    pub dst_token: Option<String>,

    /// KV mount root, skips mount discovery
    #[arg(long, global = true)]
    pub kv_root: Option<String>,

    /// File written by the list action
    #[arg(long, global = true)]
    pub list_output_file: Option<PathBuf>,

    /// How existing destination keys are compared (presence or value)
    #[arg(long, global = true)]
    pub diff_policy: Option<String>,

    /// Maximum namespace depth
    #[arg(long, global = true)]
    pub max_depth: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Dump the source tree to a snapshot file
    List,

    /// Write source keys missing from the destination
    Copy,

    /// Copy, and report keys that only exist in the destination
    Mirror,

    /// Start the HTTP control server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    initialise_logging(cli.verbose, cli.json_logs)?;
    let format = output::OutputFormat::from_str(&cli.output)?;

    match cli.command {
        Commands::List => run_action(&cli.sync, SyncAction::List, format).await,
        Commands::Copy => run_action(&cli.sync, SyncAction::Copy, format).await,
        Commands::Mirror => run_action(&cli.sync, SyncAction::Mirror, format).await,
        Commands::Serve { bind } => {
            let defaults = server_defaults(&cli.sync)?;
            start_control_server(&bind, ControlState::new(defaults))
                .await
                .context("Control server failed")
        }
    }
}

async fn run_action(
    args: &SyncArgs,
    action: SyncAction,
    format: output::OutputFormat,
) -> anyhow::Result<()> {
    let settings = build_settings(args, action)?;
    let summary = Pipeline::from_settings(settings)?
        .run()
        .await
        .with_context(|| format!("{} failed", action))?;

    output::print_summary(&summary, format)?;

    if !summary.is_success() {
        anyhow::bail!("{} of {} keys failed", summary.report.failed(), summary.planned);
    }
    Ok(())
}

fn vault_config(
    role: &str,
    address: Option<&String>,
    token: Option<&String>,
) -> Option<VaultConfig> {
    let from_env = VaultConfig::from_env(role);
    let address = address.cloned().or_else(|| from_env.as_ref().map(|c| c.address.clone()))?;
    let token = token
        .cloned()
        .or_else(|| from_env.as_ref().map(|c| c.token.clone()))
        .unwrap_or_default();

    let mut config = VaultConfig::new(address, token);
    config.namespace = from_env.and_then(|c| c.namespace);
    Some(config)
}

/// Translate command line arguments into validated-ready settings.
pub fn build_settings(args: &SyncArgs, action: SyncAction) -> anyhow::Result<SyncSettings> {
    let workers = match args.workers {
        Some(value) => SyncSettings::workers_from(value)?,
        None => DEFAULT_WORKERS,
    };

    let source = match (&args.src_input_file, &args.src_addr) {
        (Some(_), Some(_)) => {
            anyhow::bail!("--src-input-file and --src-addr are mutually exclusive")
        }
        (Some(file), None) => SourceConfig::File(file.clone()),
        (None, _) => SourceConfig::Vault(
            vault_config("SRC", args.src_addr.as_ref(), args.src_token.as_ref())
                .context("Unspecified source Vault address (--src-addr)")?,
        ),
    };

    let destination = vault_config("DST", args.dst_addr.as_ref(), args.dst_token.as_ref());

    let diff_policy = match &args.diff_policy {
        Some(policy) => policy.parse::<DiffPolicy>()?,
        None => DiffPolicy::default(),
    };

    Ok(SyncSettings {
        workers,
        action,
        source,
        destination,
        kv_root: args.kv_root.clone(),
        diff_policy,
        list_output_file: args
            .list_output_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIST_OUTPUT_FILE)),
        max_depth: args.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
    })
}

/// Defaults applied to HTTP requests that leave fields out.
fn server_defaults(args: &SyncArgs) -> anyhow::Result<SyncSettings> {
    let workers = match args.workers {
        Some(value) => SyncSettings::workers_from(value)?,
        None => DEFAULT_WORKERS,
    };
    let diff_policy = match &args.diff_policy {
        Some(policy) => policy.parse::<DiffPolicy>()?,
        None => DiffPolicy::default(),
    };

    Ok(SyncSettings {
        workers,
        kv_root: args.kv_root.clone(),
        diff_policy,
        list_output_file: args
            .list_output_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIST_OUTPUT_FILE)),
        max_depth: args.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
        ..Default::default()
    })
}

fn initialise_logging(verbose: bool, json_logs: bool) -> anyhow::Result<()> {
    let mut config = ObservabilityConfig::from_env();
    if verbose {
        config.log_level = "debug".to_string();
    }
    config.json_logging |= json_logs;

    init_logging(&config)?;
    Ok(())
}
