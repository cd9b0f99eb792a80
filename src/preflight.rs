// ABOUTME: Checks that every local program the run will invoke is installed
// ABOUTME: Runs before the connectivity probe so a missing tool never leaves a half-finished sync

use anyhow::Result;

use crate::config::{Config, DatabasePolicy, RestartPolicy};
use crate::error::SyncError;

/// Programs this configuration needs on the destination host, deduplicated.
pub fn required_programs(config: &Config) -> Vec<&str> {
    let tools = &config.tools;
    let mut programs = vec![tools.ssh.as_str(), tools.rsync.as_str(), tools.db_cli.as_str()];
    if config.run.database_policy == DatabasePolicy::Truncate {
        programs.push(tools.sql_client.as_str());
    }
    if config.run.restart_policy != RestartPolicy::None {
        programs.push(tools.service_manager.as_str());
    }
    programs.dedup();
    programs
}

pub fn check_programs(config: &Config) -> Result<()> {
    let missing: Vec<&str> = required_programs(config)
        .into_iter()
        .filter(|program| which::which(program).is_err())
        .collect();

    if !missing.is_empty() {
        return Err(SyncError::Configuration(format!(
            "required programs not found in PATH: {}",
            missing.join(", ")
        ))
        .into());
    }
    for program in required_programs(config) {
        tracing::debug!("Found {}", program);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;

    #[test]
    fn test_required_programs_follow_policy() {
        let mut config = sample_config();
        assert_eq!(
            required_programs(&config),
            vec!["ssh", "rsync", "clpctl", "systemctl"]
        );

        config.run.restart_policy = RestartPolicy::None;
        config.run.database_policy = DatabasePolicy::Truncate;
        assert_eq!(
            required_programs(&config),
            vec!["ssh", "rsync", "clpctl", "mysql"]
        );
    }

    #[test]
    fn test_missing_program_is_reported() {
        let mut config = sample_config();
        config.tools.db_cli = "no-such-db-cli-for-tests".to_string();
        let err = check_programs(&config).unwrap_err();
        assert!(err.to_string().contains("no-such-db-cli-for-tests"));
    }
}
