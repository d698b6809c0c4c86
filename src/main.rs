//! Halyard CLI entrypoint.
//!
//! This is the main entrypoint for the halyard command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use halyard::cli::{Cli, Commands, LogFormat, OutputFormatter};
use halyard::config::{
    find_config_file, ConfigParser, ConfigValidator, HalyardConfig, ResourceLoader,
};
use halyard::error::{ConfigError, Result};
use halyard::model::{ChangeSummary, Resource};
use halyard::planner::SpecChangeFactory;
use halyard::provider::{LocalResourceStore, ResourceCollector};
use halyard::reconciler::{
    DriftReport, ReconciliationContext, ReconciliationMode, Reconciler, ResourceController,
};
use halyard::selector::Selectors;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    // Validation reports every problem instead of stopping at the first one
    let strict = !matches!(cli.command, Commands::Validate { .. });
    let config = load_config(cli.config.as_ref(), strict)?;
    if let Commands::Validate { files, warnings } = &cli.command {
        return cmd_validate(&config, files, *warnings, &formatter);
    }
    let selectors = build_selectors(&config, &cli)?;

    match cli.command {
        Commands::Validate { .. } => Ok(ExitCode::SUCCESS),
        Commands::Get { kind } => cmd_get(&config, &kind, &selectors, &formatter).await,
        Commands::Plan {
            files,
            mode,
            delete_orphans,
            detailed,
        } => {
            let ctx = ReconciliationContext::new()
                .with_dry_run(true)
                .with_delete_orphans(delete_orphans || config.reconcile.delete_orphans)
                .with_selectors(selectors);
            let mode = mode.unwrap_or(config.reconcile.mode);
            cmd_plan(&config, &files, mode, &ctx, detailed, &formatter).await
        }
        Commands::Apply {
            files,
            mode,
            delete_orphans,
            yes,
        } => {
            let ctx = ReconciliationContext::new()
                .with_delete_orphans(delete_orphans || config.reconcile.delete_orphans)
                .with_selectors(selectors);
            let mode = mode.unwrap_or(config.reconcile.mode);
            cmd_apply(&config, &files, mode, &ctx, yes, &formatter).await
        }
    }
}

/// Validate configuration and desired resources.
fn cmd_validate(
    config: &HalyardConfig,
    files: &[PathBuf],
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let result = ConfigValidator::new().check(config);

    let paths = desired_paths(config, files);
    let resource_count = if paths.is_empty() {
        0
    } else {
        ResourceLoader::new().load_paths(paths)?.len()
    };

    emit(&formatter.format_validation(&result, resource_count, show_warnings))?;
    Ok(if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// List observed resources.
async fn cmd_get(
    config: &HalyardConfig,
    kind: &str,
    selectors: &Selectors,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let store = open_store(config);
    let resources = selectors.filter(store.list(kind).await?);
    emit(&formatter.format_resources(&resources))?;
    Ok(ExitCode::SUCCESS)
}

/// Show the changes a run would apply.
async fn cmd_plan(
    config: &HalyardConfig,
    files: &[PathBuf],
    mode: ReconciliationMode,
    ctx: &ReconciliationContext,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let desired = load_desired(config, files)?;
    let reconciler = build_reconciler(config, &desired)?;

    let results = reconciler.reconcile(desired, mode, ctx).await?;
    emit(&formatter.format_results(&results, detailed))?;
    Ok(ExitCode::SUCCESS)
}

/// Apply the changes.
async fn cmd_apply(
    config: &HalyardConfig,
    files: &[PathBuf],
    mode: ReconciliationMode,
    ctx: &ReconciliationContext,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let desired = load_desired(config, files)?;
    let reconciler = build_reconciler(config, &desired)?;

    let changes = reconciler.diff(desired.clone(), mode, ctx).await?;
    let report = DriftReport::from_changes(&changes);
    if report.is_converged() {
        emit(&formatter.format_drift(&report))?;
        return Ok(ExitCode::SUCCESS);
    }

    // Confirm
    if !auto_approve {
        eprint!("{}", formatter.format_drift(&report));
        eprint!("Do you want to apply these changes? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let results = reconciler.reconcile(desired, mode, ctx).await?;
    emit(&formatter.format_results(&results, false))?;

    let summary = ChangeSummary::of(&results);
    if summary.is_success() {
        info!("Apply completed: {summary}");
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Apply completed with {} failed change(s)", summary.failed);
        Ok(ExitCode::FAILURE)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads the configuration file, or the defaults when none is found.
fn load_config(config_path: Option<&PathBuf>, strict: bool) -> Result<HalyardConfig> {
    let config_file = match config_path {
        Some(path) => Some(path.clone()),
        None => find_config_file(".").ok(),
    };

    let base = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("."));
    let parser = ConfigParser::new().with_base_path(base);
    parser.load_dotenv()?;

    let config = if let Some(file) = &config_file {
        parser.load_with_env(file)?
    } else {
        debug!("No configuration file found, using defaults");
        let mut config = HalyardConfig::default();
        ConfigParser::apply_env_overrides(&mut config)?;
        config
    };

    if strict {
        ConfigValidator::new().validate(&config)?;
    }
    Ok(config)
}

/// Combines configured and command-line selectors.
fn build_selectors(config: &HalyardConfig, cli: &Cli) -> Result<Selectors> {
    let expressions: Vec<&str> = config
        .reconcile
        .selectors
        .iter()
        .chain(&cli.selectors)
        .map(String::as_str)
        .collect();
    let strategy = cli.matching.unwrap_or(config.reconcile.matching);
    Ok(Selectors::parse(expressions.as_slice())?.with_strategy(strategy))
}

/// Opens the configured resource store.
fn open_store(config: &HalyardConfig) -> Arc<LocalResourceStore> {
    Arc::new(LocalResourceStore::new(&config.store.path))
}

/// Files given on the command line, else those of the configuration.
fn desired_paths<'a>(config: &'a HalyardConfig, files: &'a [PathBuf]) -> &'a [PathBuf] {
    if files.is_empty() {
        &config.reconcile.resources
    } else {
        files
    }
}

/// Loads the desired resources.
fn load_desired(config: &HalyardConfig, files: &[PathBuf]) -> Result<Vec<Resource>> {
    let paths = desired_paths(config, files);
    if paths.is_empty() {
        return Err(ConfigError::validation(
            "no desired resource files given, use -f or reconcile.resources",
            "reconcile.resources",
        )
        .into());
    }
    ResourceLoader::new().load_paths(paths)
}

/// Registers a local controller for every managed kind.
///
/// Managed kinds come from the configuration, or from the desired resources
/// when none is configured.
fn build_reconciler(config: &HalyardConfig, desired: &[Resource]) -> Result<Reconciler> {
    let store = open_store(config);
    let timeout = config.reconcile.operation_timeout_secs.map(Duration::from_secs);
    let factory = SpecChangeFactory::new()
        .with_delete_orphan_entries(config.reconcile.delete_orphan_entries);

    let mut kinds: Vec<String> = if config.reconcile.kinds.is_empty() {
        desired.iter().map(|r| r.kind.clone()).collect()
    } else {
        config.reconcile.kinds.clone()
    };
    kinds.sort();
    kinds.dedup();

    let mut reconciler = Reconciler::new();
    for kind in kinds {
        let controller = ResourceController::local(&store, factory, timeout)?;
        reconciler = reconciler.with_controller(kind, controller);
    }
    debug!(
        "Managing kinds {:?} with {} store at {}",
        reconciler.kinds().collect::<Vec<_>>(),
        store.provider_type(),
        store.path().display()
    );
    Ok(reconciler)
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
