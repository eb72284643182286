//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use storage_reclaimer::core::cancel::CancelToken;
use storage_reclaimer::core::config::Config;
use storage_reclaimer::core::context::RunContext;
use storage_reclaimer::core::errors::ReclaimError;
use storage_reclaimer::inventory::client::InventoryClient;
use storage_reclaimer::inventory::kubectl::KubectlInventory;
use storage_reclaimer::inventory::memory::StaticInventory;
use storage_reclaimer::inventory::snapshot::InventorySnapshot;
use storage_reclaimer::logger::activity::ActivityLogger;
use storage_reclaimer::logger::audit::AuditLog;
use storage_reclaimer::logger::jsonl::JsonlConfig;
use storage_reclaimer::reclaim::orchestrator::{
    Action, PassReport, ReclaimOptions, Reclaimer, RunReport,
};
use storage_reclaimer::report::inventory::{
    collect_storage_class_inventory, collect_volume_inventory, persistent_volume_rows,
    persistent_volume_table, storage_class_rows, storage_class_table,
};

/// Storage Reclaimer: finds unused StorageClasses and orphaned PersistentVolumes.
#[derive(Debug, Parser)]
#[command(
    name = "sreclaim",
    author,
    version,
    about = "Storage Reclaimer - back up and delete unused cluster storage",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity (echo audit lines to stderr).
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Back up and delete unused StorageClasses and orphaned PersistentVolumes.
    Clean(CleanArgs),
    /// List StorageClasses with their namespace bindings.
    ListSc(ListArgs),
    /// List PersistentVolumes with their claim and node status.
    ListPv(ListArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version and optional build metadata.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct CleanArgs {
    /// Classify and log only; nothing is backed up or deleted.
    #[arg(long)]
    dry_run: bool,
    /// Skip interactive confirmation prompt.
    #[arg(long)]
    yes: bool,
    /// Do not reclaim StorageClasses.
    #[arg(long)]
    skip_storage_classes: bool,
    /// Do not reclaim PersistentVolumes.
    #[arg(long)]
    skip_volumes: bool,
    /// Plan against a saved `kubectl get ... -o json` list instead of the cluster.
    /// Implies --dry-run.
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct ListArgs {
    /// Read the inventory from a saved `kubectl get ... -o json` list.
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct ConfigArgs {
    /// Config operation to run.
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args, Default)]
struct VersionArgs {
    /// Include additional build metadata fields.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure, including inventory listing.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation stopped before finishing.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<ReclaimError> for CliError {
    fn from(err: ReclaimError) -> Self {
        match err {
            ReclaimError::InvalidConfig { .. }
            | ReclaimError::MissingConfig { .. }
            | ReclaimError::ConfigParse { .. } => Self::User(err.to_string()),
            ReclaimError::Cancelled { .. } => Self::Partial(err.to_string()),
            ReclaimError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Clean(args) => run_clean(cli, args),
        Command::ListSc(args) => run_list_sc(cli, args),
        Command::ListPv(args) => run_list_pv(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// clean
// ---------------------------------------------------------------------------

fn run_clean(cli: &Cli, args: &CleanArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let options = clean_options(&config, args);
    if !options.storage_classes && !options.persistent_volumes {
        return Err(CliError::User(
            "both passes are disabled; nothing to reclaim".to_string(),
        ));
    }

    let hash = config.stable_hash()?;
    let context = RunContext::new(&config);
    let cancel = CancelToken::with_signal_hooks();
    let client: Box<dyn InventoryClient> = match &args.snapshot {
        Some(path) => Box::new(StaticInventory::new(load_snapshot(path)?)),
        None => Box::new(KubectlInventory::new(&config.cluster, cancel.clone())),
    };
    let mode = output_mode(cli);

    // Interactive mode: show the plan and ask before deleting anything. The
    // real run re-lists, so it is held to the confirmed names.
    let mut confirmed = None;
    if !options.dry_run && !args.yes && mode == OutputMode::Human && io::stdout().is_terminal() {
        let mut silent = ActivityLogger::disabled();
        let plan_options = ReclaimOptions {
            dry_run: true,
            ..options
        };
        let plan = Reclaimer::new(&*client, &context, &mut silent, plan_options, cancel.clone())
            .run(&hash)?;
        if plan.cancelled_during.is_some() {
            return Err(CliError::Partial("cancelled while planning".to_string()));
        }
        if plan.reclaimed() == 0 {
            println!("Nothing to reclaim.");
            return Ok(());
        }
        println!(
            "The following resources will be backed up and deleted. Anything the \
             cluster flags after this listing is left alone:\n"
        );
        print_plan(&plan);
        if !confirm("\nProceed? [y/N] ")? {
            println!("Aborted; nothing was deleted.");
            return Ok(());
        }
        confirmed = Some(plan.planned());
    }

    let jsonl = context.layout.jsonl_log.clone().map(|path| JsonlConfig {
        path,
        fallback_path: None,
    });
    let mut logger = ActivityLogger::new(AuditLog::new(&context.layout.audit_log), jsonl)
        .with_echo(cli.verbose);
    let mut reclaimer = Reclaimer::new(&*client, &context, &mut logger, options, cancel);
    if let Some(set) = confirmed {
        reclaimer = reclaimer.with_confirmed(set);
    }
    let report = reclaimer.run(&hash)?;

    match mode {
        OutputMode::Human => {
            if !cli.quiet || report.is_partial() {
                print_run_report(&report, &context);
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "clean",
                "config_hash": hash,
                "audit_log": context.layout.audit_log.to_string_lossy(),
                "report": serde_json::to_value(&report)?,
            });
            write_json_line(&payload)?;
        }
    }

    match &report.cancelled_during {
        Some(stage) => Err(CliError::Partial(format!("run cancelled during {stage}"))),
        None => Ok(()),
    }
}

fn clean_options(config: &Config, args: &CleanArgs) -> ReclaimOptions {
    let mut options = ReclaimOptions::from(&config.reclaim);
    options.dry_run |= args.dry_run || args.snapshot.is_some();
    if args.skip_storage_classes {
        options.storage_classes = false;
    }
    if args.skip_volumes {
        options.persistent_volumes = false;
    }
    options
}

fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_plan(plan: &RunReport) {
    for pass in [&plan.storage_classes, &plan.persistent_volumes]
        .into_iter()
        .flatten()
    {
        for outcome in pass.outcomes.iter().filter(|o| o.action == Action::Planned) {
            let reason = outcome
                .disposition
                .as_ref()
                .map_or_else(|| "unused".to_string(), ToString::to_string);
            println!("  {} {} ({reason})", outcome.kind, outcome.name.bold());
        }
    }
}

fn print_run_report(report: &RunReport, context: &RunContext) {
    if report.dry_run {
        println!("{}", "Dry run: nothing was backed up or deleted.".yellow());
    } else {
        println!("{}", "Storage reclamation complete:".bold());
    }
    println!("  Run: {}", report.run_timestamp);
    if let Some(pass) = &report.storage_classes {
        print_pass_summary("StorageClasses", pass, report.dry_run);
    }
    if let Some(pass) = &report.persistent_volumes {
        print_pass_summary("PersistentVolumes", pass, report.dry_run);
    }
    if !report.dry_run && report.reclaimed() > 0 {
        println!("  Backups: {}", context.layout.root.display());
    }
    println!("  Audit log: {}", context.layout.audit_log.display());
    if let Some(stage) = &report.cancelled_during {
        println!("  {}", format!("Cancelled during {stage}.").red());
    }
}

fn print_pass_summary(label: &str, pass: &PassReport, dry_run: bool) {
    let acted = if dry_run {
        format!("{} would be deleted", pass.flagged)
    } else {
        format!("{} deleted", pass.deleted)
    };
    println!(
        "  {label}: {} inspected, {} flagged, {acted}, {} retained, {} skipped",
        pass.inspected, pass.flagged, pass.retained, pass.skipped
    );
    if let Some(usage) = &pass.usage_error {
        eprintln!("    {} {}", "usage unavailable:".yellow(), usage.error);
    }
    for outcome in &pass.outcomes {
        for failure in &outcome.failures {
            eprintln!(
                "    {} {} {}: {}",
                failure.error_code.red(),
                outcome.kind,
                outcome.name,
                failure.error
            );
        }
    }
}

// ---------------------------------------------------------------------------
// list-sc / list-pv
// ---------------------------------------------------------------------------

fn run_list_sc(cli: &Cli, args: &ListArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let inventory = match &args.snapshot {
        Some(path) => load_snapshot(path)?,
        None => {
            let client = KubectlInventory::new(&config.cluster, CancelToken::with_signal_hooks());
            collect_storage_class_inventory(&client)?
        }
    };
    let rows = storage_class_rows(&inventory.storage_classes, &inventory.namespaces, &config.report);

    match output_mode(cli) {
        OutputMode::Human => print!("{}", storage_class_table(&rows).render()),
        OutputMode::Json => {
            let payload = json!({
                "command": "list-sc",
                "storage_classes": serde_json::to_value(&rows)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_list_pv(cli: &Cli, args: &ListArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let inventory = match &args.snapshot {
        Some(path) => load_snapshot(path)?,
        None => {
            let client = KubectlInventory::new(&config.cluster, CancelToken::with_signal_hooks());
            collect_volume_inventory(&client)?
        }
    };
    let rows = persistent_volume_rows(&inventory, &config.report, Utc::now());

    match output_mode(cli) {
        OutputMode::Human => print!("{}", persistent_volume_table(&rows).render()),
        OutputMode::Json => {
            let payload = json!({
                "command": "list-pv",
                "persistent_volumes": serde_json::to_value(&rows)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

/// A snapshot the user named is user input; failing to read it is a user error.
fn load_snapshot(path: &std::path::Path) -> Result<InventorySnapshot, CliError> {
    InventorySnapshot::load(path).map_err(|e| CliError::User(format!("snapshot: {e}")))
}

// ---------------------------------------------------------------------------
// config / version
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.paths.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                            "error_code": e.code(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");
    let target = option_env!("TARGET").unwrap_or("unknown");
    let profile = option_env!("PROFILE").unwrap_or("unknown");
    let git_sha = option_env!("GIT_SHA").unwrap_or("unknown");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("sreclaim {version}");
            if args.verbose {
                println!("package: {package}");
                println!("target: {target}");
                println!("profile: {profile}");
                println!("git_sha: {git_sha}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "sreclaim",
                "version": version,
                "package": package,
                "build": {
                    "target": target,
                    "profile": profile,
                    "git_sha": git_sha,
                }
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("SR_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
