// ABOUTME: CLI entry point for site-pull-sync
// ABOUTME: Parses arguments, sets up logging and maps the pipeline outcome to an exit code

use anyhow::Result;
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use site_pull_sync::command::{DryRunRunner, SystemRunner};
use site_pull_sync::config::{self, Config, ConfigFile};
use site_pull_sync::lock::RunLock;
use site_pull_sync::remote::RemoteClient;
use site_pull_sync::{logging, preflight, Pipeline, PipelineFailure, RunSummary};

#[derive(Parser)]
#[command(
    name = "site-pull-sync",
    version,
    about = "Pull a site's database and files from a source host onto this host"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "/etc/site-pull-sync/config.toml")]
    config: PathBuf,
    /// Log at debug level (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full sync: export, pull, replace the database, mirror files
    Sync {
        /// Log every command without running it or touching local files
        #[arg(long)]
        dry_run: bool,
        /// Do not ask for confirmation before overwriting the destination
        #[arg(short, long)]
        yes: bool,
    },
    /// Validate the configuration, look for required programs and probe ssh
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = match ConfigFile::read(&cli.config) {
        Ok(file) => file,
        Err(err) => {
            let _ = logging::init(None, config::utc(), cli.verbose);
            tracing::error!("{:#}", err);
            return ExitCode::FAILURE;
        }
    };

    let (log_file, offset) = file.log_target();
    if let Err(err) = logging::init(Some(&log_file), offset, cli.verbose) {
        eprintln!("Error: {:#}", err);
        return ExitCode::FAILURE;
    }

    let config = match Config::from_file(file) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Invalid config file {}: {:#}", cli.config.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let outcome = match cli.command {
        Commands::Sync { dry_run, yes } => sync(&config, dry_run, yes).await,
        Commands::Check => check(&config).await,
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn sync(config: &Config, dry_run: bool, yes: bool) -> Result<ExitCode> {
    let started = logging::now_in(config.timezone);
    tracing::info!(
        "Sync started at {}: {} ({}) -> {} ({})",
        logging::format_timestamp(&started),
        config.source.domain,
        config.ssh.host,
        config.destination.domain,
        config.run.database_policy
    );

    let _lock = if dry_run {
        tracing::info!("Dry run: commands are logged, nothing is executed");
        if let Err(err) = preflight::check_programs(config) {
            tracing::warn!("{:#}", err);
        }
        None
    } else {
        preflight::check_programs(config)?;
        let lock = RunLock::acquire(&config.lock_file())?;
        tracing::debug!("Holding run lock {}", lock.path().display());
        Some(lock)
    };

    if !dry_run && !yes && std::io::stdin().is_terminal() {
        let prompt = format!(
            "Overwrite database {} and files in {} with data from {}?",
            config.destination.database_name,
            config.destination.web_root.display(),
            config.source.domain
        );
        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            tracing::info!("Sync cancelled, nothing was changed");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let result = if dry_run {
        Pipeline::new(config, &DryRunRunner).dry_run(true).run().await
    } else {
        Pipeline::new(config, &SystemRunner).run().await
    };

    Ok(report(config, result))
}

fn report(config: &Config, result: Result<RunSummary, PipelineFailure>) -> ExitCode {
    let finished = logging::format_timestamp(&logging::now_in(config.timezone));
    match result {
        Ok(summary) => {
            for (stage, warning) in &summary.warnings {
                tracing::warn!("{} finished with a warning: {}", stage, warning);
            }
            tracing::info!(
                "Sync completed at {}: {} stages done, {} skipped, {} warnings",
                finished,
                summary.completed.len(),
                summary.skipped.len(),
                summary.warnings.len()
            );
            ExitCode::SUCCESS
        }
        Err(failure) => {
            tracing::error!("Sync aborted at {}: {}", finished, failure);
            ExitCode::FAILURE
        }
    }
}

async fn check(config: &Config) -> Result<ExitCode> {
    tracing::info!("Configuration is valid");
    preflight::check_programs(config)?;
    tracing::info!("Required programs found: {}", preflight::required_programs(config).join(", "));

    let remote = RemoteClient::new(&config.tools.ssh, &config.ssh);
    remote.probe(&SystemRunner).await?;
    tracing::info!(
        "Ready to pull {} from {} into {}",
        config.source.database_name,
        remote.destination(),
        config.destination.database_name
    );
    Ok(ExitCode::SUCCESS)
}
