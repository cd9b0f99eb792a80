// ABOUTME: Client for running commands on the source host over ssh
// ABOUTME: Handles the connectivity probe, remote execution and rsync remote-shell rendering

use anyhow::Result;
use std::path::Path;

use crate::command::{self, CommandOutput, CommandRunner, CommandSpec};
use crate::config::SshConfig;
use crate::error::SyncError;

pub struct RemoteClient {
    ssh_program: String,
    config: SshConfig,
}

impl RemoteClient {
    pub fn new(ssh_program: &str, config: &SshConfig) -> Self {
        Self {
            ssh_program: ssh_program.to_string(),
            config: config.clone(),
        }
    }

    /// `user@host`, or just `host` when no login user is configured.
    pub fn destination(&self) -> String {
        match &self.config.user {
            Some(user) if !user.is_empty() => format!("{}@{}", user, self.config.host),
            _ => self.config.host.clone(),
        }
    }

    fn options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if self.config.batch_mode {
            options.push("-oBatchMode=yes".to_string());
        }
        options.push(format!(
            "-oConnectTimeout={}",
            self.config.connect_timeout_secs
        ));
        if self.config.port != 22 {
            options.push("-p".to_string());
            options.push(self.config.port.to_string());
        }
        options
    }

    /// Wraps `remote` into an ssh invocation; the remote side receives one shell line.
    pub fn command(&self, remote: &CommandSpec) -> CommandSpec {
        CommandSpec::new(&self.ssh_program)
            .args(self.options())
            .arg(self.destination())
            .arg(remote.shell_line())
            .redacting_from(remote)
    }

    /// The value rsync expects after `-e`.
    pub fn rsync_shell(&self) -> String {
        let mut shell = vec![self.ssh_program.clone()];
        shell.extend(self.options());
        shell.join(" ")
    }

    /// An rsync remote operand such as `root@[2001:db8::1]:/home/shop/scripts/`.
    pub fn remote_path(&self, path: &Path, trailing_slash: bool) -> String {
        let host = if self.config.host.contains(':') && !self.config.host.starts_with('[') {
            format!("[{}]", self.config.host)
        } else {
            self.config.host.clone()
        };
        let login = match &self.config.user {
            Some(user) if !user.is_empty() => format!("{}@{}", user, host),
            _ => host,
        };
        let mut rendered = format!("{}:{}", login, path.display());
        if trailing_slash && !rendered.ends_with('/') {
            rendered.push('/');
        }
        rendered
    }

    /// Runs a trivial command so that auth, reachability and host keys are checked
    /// before anything destructive happens.
    pub async fn probe<R: CommandRunner>(&self, runner: &R) -> Result<()> {
        let probe = self.command(&CommandSpec::new("true"));
        let output = command::execute(runner, &probe).await.map_err(|e| {
            SyncError::Connectivity(format!("could not start ssh: {:#}", e))
        })?;

        if !output.is_success() {
            let reason = output.last_message().unwrap_or("no output").to_string();
            return Err(SyncError::Connectivity(format!(
                "ssh to {} port {} failed with {}: {}",
                self.config.host,
                self.config.port,
                output.describe_status(),
                reason
            ))
            .into());
        }

        tracing::info!("Connected to {} on port {}", self.config.host, self.config.port);
        Ok(())
    }

    pub async fn run<R: CommandRunner>(
        &self,
        runner: &R,
        remote: &CommandSpec,
    ) -> Result<CommandOutput> {
        command::execute(runner, &self.command(remote)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::recording::RecordingRunner;

    fn ssh_config(port: u16) -> SshConfig {
        SshConfig {
            host: "203.0.113.10".to_string(),
            user: Some("root".to_string()),
            port,
            batch_mode: true,
            connect_timeout_secs: 10,
        }
    }

    #[test]
    fn test_command_includes_batch_mode_timeout_and_port() {
        let client = RemoteClient::new("ssh", &ssh_config(2222));
        let spec = client.command(&CommandSpec::new("rm").args(["-f", "/tmp/a b"]));

        assert_eq!(spec.program, "ssh");
        assert_eq!(
            spec.args,
            vec![
                "-oBatchMode=yes",
                "-oConnectTimeout=10",
                "-p",
                "2222",
                "root@203.0.113.10",
                "rm -f '/tmp/a b'",
            ]
        );
    }

    #[test]
    fn test_default_port_is_omitted() {
        let client = RemoteClient::new("ssh", &ssh_config(22));
        assert_eq!(client.rsync_shell(), "ssh -oBatchMode=yes -oConnectTimeout=10");
    }

    #[test]
    fn test_batch_mode_can_be_disabled() {
        let mut config = ssh_config(22);
        config.batch_mode = false;
        config.user = None;
        let client = RemoteClient::new("ssh", &config);
        let spec = client.command(&CommandSpec::new("true"));
        assert_eq!(spec.args, vec!["-oConnectTimeout=10", "203.0.113.10", "true"]);
    }

    #[test]
    fn test_remote_path_wraps_ipv6_hosts() {
        let mut config = ssh_config(22);
        config.host = "2001:db8::1".to_string();
        let client = RemoteClient::new("ssh", &config);
        assert_eq!(
            client.remote_path(Path::new("/home/shop/htdocs/shop.example.com"), true),
            "root@[2001:db8::1]:/home/shop/htdocs/shop.example.com/"
        );
    }

    #[test]
    fn test_wrapped_command_keeps_redactions() {
        let client = RemoteClient::new("ssh", &ssh_config(22));
        let inner = CommandSpec::new("tool")
            .arg("--password=hunter2")
            .redacting("hunter2");
        let spec = client.command(&inner);
        assert!(!spec.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_probe_failure_is_connectivity_error() {
        let runner = RecordingRunner::new().fail_when("true", 255);
        let client = RemoteClient::new("ssh", &ssh_config(22));
        let err = client.probe(&runner).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Connectivity(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_spawn_failure_is_connectivity_error() {
        let runner = RecordingRunner::new().unavailable_when("ssh");
        let client = RemoteClient::new("ssh", &ssh_config(22));
        let err = client.probe(&runner).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::Connectivity(_))
        ));
    }
}
