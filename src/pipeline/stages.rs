// ABOUTME: Individual pipeline stage implementations
// ABOUTME: Each stage returns Ok or a typed SyncError; gating is decided by the orchestrator

use anyhow::{Context, Result};
use std::path::Path;

use super::Pipeline;
use crate::command::{self, CommandOutput, CommandRunner, CommandSpec};
use crate::config::DatabasePolicy;
use crate::database::{self, DatabaseCli, DumpArtifact, SqlClient};
use crate::error::SyncError;
use crate::logging;
use crate::permissions::{self, Owner};
use crate::service;
use crate::transfer::{self, Rsync};

const MAX_LOGGED_PERMISSION_FAILURES: usize = 20;

fn require_success(
    command: &CommandSpec,
    output: &CommandOutput,
    error: fn(String) -> SyncError,
) -> Result<()> {
    if output.is_success() {
        return Ok(());
    }
    Err(error(format!(
        "`{}` failed with {}: {}",
        command,
        output.describe_status(),
        output.last_message().map(|m| command.redact_text(m)).unwrap_or_default()
    ))
    .into())
}

impl<R: CommandRunner> Pipeline<'_, R> {
    fn artifact(&self) -> DumpArtifact {
        DumpArtifact::for_database(&self.config.source.database_name)
    }

    fn db_cli(&self) -> DatabaseCli {
        DatabaseCli::new(&self.config.tools.db_cli)
    }

    async fn run_local(&self, spec: &CommandSpec, error: fn(String) -> SyncError) -> Result<()> {
        let output = command::execute(self.runner, spec)
            .await
            .map_err(|e| error(format!("could not start `{}`: {:#}", spec, e)))?;
        require_success(spec, &output, error)
    }

    async fn run_remote(&self, spec: &CommandSpec, error: fn(String) -> SyncError) -> Result<CommandOutput> {
        let output = self
            .remote
            .run(self.runner, spec)
            .await
            .map_err(|e| error(format!("could not start ssh for `{}`: {:#}", spec, e)))?;
        require_success(&self.remote.command(spec), &output, error)?;
        Ok(output)
    }

    async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))
    }

    pub(super) async fn probe(&self) -> Result<()> {
        self.remote.probe(self.runner).await
    }

    pub(super) async fn export(&self) -> Result<()> {
        let source = &self.config.source;
        let remote_file = self.artifact().path_in(&source.scratch_dir);
        tracing::info!(
            "Exporting {} on {} to {}",
            source.database_name,
            source.domain,
            remote_file.display()
        );
        let spec = self.db_cli().export(&source.database_name, &remote_file);
        self.run_remote(&spec, SyncError::RemoteCommand).await?;
        Ok(())
    }

    pub(super) async fn transport(&self) -> Result<()> {
        let artifact = self.artifact();
        let remote_file = artifact.path_in(&self.config.source.scratch_dir);
        let local_dir = &self.config.destination.scratch_dir;
        let local_file = artifact.path_in(local_dir);

        self.ensure_dir(local_dir)
            .await
            .map_err(|e| SyncError::Transport(format!("{:#}", e)))?;

        let rsync = Rsync::new(&self.config.tools.rsync, &self.remote);
        self.run_local(&rsync.pull_file(&remote_file, local_dir), SyncError::Transport)
            .await?;

        if !self.dry_run {
            if !local_file.is_file() {
                return Err(SyncError::Transport(format!(
                    "{} is missing after the pull",
                    local_file.display()
                ))
                .into());
            }
            if self.config.run.verify_checksum {
                self.verify_checksum(&remote_file, &local_file).await?;
            }
        }

        let cleanup = CommandSpec::new("rm").arg("-f").arg(remote_file.display().to_string());
        if let Err(e) = self.run_remote(&cleanup, SyncError::RemoteCommand).await {
            tracing::warn!("Could not remove {} on the source host: {:#}", remote_file.display(), e);
        }
        Ok(())
    }

    async fn verify_checksum(&self, remote_file: &Path, local_file: &Path) -> Result<()> {
        let output = self
            .run_remote(&transfer::remote_checksum(remote_file), SyncError::Transport)
            .await?;
        let expected = transfer::parse_checksum(&output.stdout).ok_or_else(|| {
            SyncError::Transport(format!(
                "could not read the source checksum of {}",
                remote_file.display()
            ))
        })?;

        let path = local_file.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || transfer::sha256_file(&path))
            .await
            .context("checksum task panicked")?
            .map_err(|e| SyncError::Transport(format!("{:#}", e)))?;

        if actual != expected {
            if let Err(e) = tokio::fs::remove_file(local_file).await {
                tracing::warn!("Could not remove corrupt dump {}: {}", local_file.display(), e);
            }
            return Err(SyncError::Transport(format!(
                "checksum mismatch for {}: source {} local {}",
                local_file.display(),
                expected,
                actual
            ))
            .into());
        }
        tracing::info!("Verified sha256 {} for {}", actual, local_file.display());
        Ok(())
    }

    pub(super) async fn backup(&self) -> Result<()> {
        let destination = &self.config.destination;
        self.ensure_dir(&destination.scratch_dir)
            .await
            .map_err(|e| SyncError::Database(format!("{:#}", e)))?;

        let now = logging::now_in(self.config.timezone);
        let file = destination
            .scratch_dir
            .join(database::backup_file_name(&destination.database_name, &now));
        tracing::info!("Backing up {} to {}", destination.database_name, file.display());
        self.run_local(
            &self.db_cli().export(&destination.database_name, &file),
            SyncError::Database,
        )
        .await
    }

    pub(super) async fn replace(&self) -> Result<()> {
        let destination = &self.config.destination;
        let cli = self.db_cli();
        let database = &destination.database_name;

        match self.config.run.database_policy {
            DatabasePolicy::Recreate => {
                let password = destination
                    .database_password
                    .as_ref()
                    .filter(|secret| !secret.is_empty())
                    .ok_or_else(|| {
                        SyncError::Configuration(
                            "destination database_password is required to recreate the database"
                                .to_string(),
                        )
                    })?;
                self.run_local(&cli.delete(database), SyncError::Database).await?;
                self.run_local(
                    &cli.add(
                        &destination.domain,
                        database,
                        &destination.database_user,
                        password,
                    ),
                    SyncError::Database,
                )
                .await?;
            }
            DatabasePolicy::Truncate => self.drop_all_tables(database).await?,
        }

        let local_file = self.artifact().path_in(&destination.scratch_dir);
        self.run_local(&cli.import(database, &local_file), SyncError::Database)
            .await?;

        if !self.dry_run {
            if let Err(e) = tokio::fs::remove_file(&local_file).await {
                tracing::warn!("Could not remove {}: {}", local_file.display(), e);
            }
        }
        Ok(())
    }

    async fn drop_all_tables(&self, database: &str) -> Result<()> {
        let sql = SqlClient::new(&self.config.tools.sql_client);
        let list = sql.list_tables(database);
        let output = command::execute(self.runner, &list)
            .await
            .map_err(|e| SyncError::Database(format!("could not start `{}`: {:#}", list, e)))?;
        require_success(&list, &output, SyncError::Database)?;

        let entries = database::parse_table_list(&output.stdout);
        if entries.is_empty() {
            tracing::info!("{} has no tables to drop", database);
            return Ok(());
        }
        tracing::info!("Dropping {} tables and views from {}", entries.len(), database);
        self.run_local(&sql.drop_tables(database, &entries), SyncError::Database)
            .await
    }

    pub(super) async fn mirror(&self) -> Result<()> {
        let source = &self.config.source;
        let destination = &self.config.destination;
        self.ensure_dir(&destination.web_root)
            .await
            .map_err(|e| SyncError::Mirror(format!("{:#}", e)))?;

        for pattern in &self.config.mirror.exclude {
            tracing::debug!("Excluding {}", pattern);
        }
        let rsync = Rsync::new(&self.config.tools.rsync, &self.remote);
        let spec = rsync.mirror_tree(
            &source.web_root,
            &destination.web_root,
            &self.config.mirror.exclude,
            self.config.mirror.delete_extraneous,
        );
        self.run_local(&spec, SyncError::Mirror).await
    }

    pub(super) async fn normalize_permissions(&self) -> Result<()> {
        let destination = &self.config.destination;
        if self.dry_run {
            tracing::info!(
                "Would normalize ownership and modes under {}",
                destination.web_root.display()
            );
            return Ok(());
        }

        let owner = if nix::unistd::geteuid().is_root() {
            Some(Owner::lookup(&destination.site_user)?)
        } else {
            tracing::warn!(
                "Not running as root, ownership of {} left unchanged",
                destination.web_root.display()
            );
            None
        };

        let root = destination.web_root.clone();
        let policy = self.config.permissions.clone();
        let report = tokio::task::spawn_blocking(move || permissions::normalize(&root, owner, &policy))
            .await
            .context("permission task panicked")??;

        tracing::info!(
            "Normalized {} directories, {} files ({} in writable dirs), skipped {} symlinks",
            report.directories,
            report.files,
            report.writable_entries,
            report.symlinks
        );
        if report.is_clean() {
            return Ok(());
        }
        for failure in report.failures.iter().take(MAX_LOGGED_PERMISSION_FAILURES) {
            tracing::warn!("  {}", failure);
        }
        Err(SyncError::Permission(format!(
            "{} entries could not be updated",
            report.failures.len()
        ))
        .into())
    }

    pub(super) async fn restart(&self) -> Result<()> {
        let commands = service::restart_commands(
            &self.config.tools.service_manager,
            &self.config.run.service_name,
            self.config.run.restart_policy,
        );
        // Start is attempted even when stop fails.
        let mut failures = Vec::new();
        for spec in &commands {
            match command::execute(self.runner, spec).await {
                Ok(output) if output.is_success() => {}
                Ok(output) => failures.push(format!(
                    "`{}` failed with {}: {}",
                    spec,
                    output.describe_status(),
                    output.last_message().unwrap_or_default()
                )),
                Err(e) => failures.push(format!("could not start `{}`: {:#}", spec, e)),
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        Err(SyncError::Service(failures.join("; ")).into())
    }
}
