// ABOUTME: Sequential sync orchestrator with an explicit fatal/best-effort gate per stage
// ABOUTME: Stages run strictly in order; a fatal failure stops everything after it

mod stages;

use std::fmt;

use crate::command::CommandRunner;
use crate::config::{Config, RestartPolicy};
use crate::remote::RemoteClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Export,
    Transport,
    Backup,
    Replace,
    Mirror,
    Permissions,
    Restart,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Probe,
        Stage::Export,
        Stage::Transport,
        Stage::Backup,
        Stage::Replace,
        Stage::Mirror,
        Stage::Permissions,
        Stage::Restart,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Probe => "connectivity probe",
            Stage::Export => "database export",
            Stage::Transport => "dump transport",
            Stage::Backup => "destination backup",
            Stage::Replace => "database replace",
            Stage::Mirror => "file mirror",
            Stage::Permissions => "permission normalization",
            Stage::Restart => "service restart",
        }
    }

    pub fn gate(&self, config: &Config) -> Gate {
        match self {
            Stage::Probe | Stage::Export | Stage::Transport | Stage::Replace | Stage::Mirror => {
                Gate::Fatal
            }
            Stage::Backup if config.run.backup_failure_fatal => Gate::Fatal,
            Stage::Backup | Stage::Permissions | Stage::Restart => Gate::BestEffort,
        }
    }

    pub fn is_enabled(&self, config: &Config) -> bool {
        match self {
            Stage::Backup => config.run.backup_before_overwrite,
            Stage::Restart => config.run.restart_policy != RestartPolicy::None,
            _ => true,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Failure aborts the run.
    Fatal,
    /// Failure is logged and the run continues.
    BestEffort,
}

#[derive(Debug)]
pub struct PipelineFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} failed: {:#}", self.stage, self.error)
    }
}

impl std::error::Error for PipelineFailure {}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: Vec<Stage>,
    pub skipped: Vec<Stage>,
    pub warnings: Vec<(Stage, String)>,
}

pub struct Pipeline<'a, R: CommandRunner> {
    config: &'a Config,
    runner: &'a R,
    remote: RemoteClient,
    dry_run: bool,
}

impl<'a, R: CommandRunner> Pipeline<'a, R> {
    pub fn new(config: &'a Config, runner: &'a R) -> Self {
        Self {
            config,
            runner,
            remote: RemoteClient::new(&config.tools.ssh, &config.ssh),
            dry_run: false,
        }
    }

    /// Skips local filesystem work so that only commands are reported.
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    pub async fn run(&self) -> Result<RunSummary, PipelineFailure> {
        let mut summary = RunSummary::default();
        let total = Stage::ALL.len();

        for (index, stage) in Stage::ALL.iter().copied().enumerate() {
            if !stage.is_enabled(self.config) {
                tracing::info!("[{}/{}] {}: skipped by configuration", index + 1, total, stage);
                summary.skipped.push(stage);
                continue;
            }

            tracing::info!("[{}/{}] {}", index + 1, total, stage);
            match self.run_stage(stage).await {
                Ok(()) => {
                    tracing::info!("[{}/{}] {}: done", index + 1, total, stage);
                    summary.completed.push(stage);
                }
                Err(error) => match stage.gate(self.config) {
                    Gate::Fatal => {
                        tracing::error!("[{}/{}] {} failed, aborting: {:#}", index + 1, total, stage, error);
                        return Err(PipelineFailure { stage, error });
                    }
                    Gate::BestEffort => {
                        tracing::warn!("[{}/{}] {} failed, continuing: {:#}", index + 1, total, stage, error);
                        summary.warnings.push((stage, format!("{:#}", error)));
                    }
                },
            }
        }

        Ok(summary)
    }

    async fn run_stage(&self, stage: Stage) -> anyhow::Result<()> {
        match stage {
            Stage::Probe => self.probe().await,
            Stage::Export => self.export().await,
            Stage::Transport => self.transport().await,
            Stage::Backup => self.backup().await,
            Stage::Replace => self.replace().await,
            Stage::Mirror => self.mirror().await,
            Stage::Permissions => self.normalize_permissions().await,
            Stage::Restart => self.restart().await,
        }
    }
}
