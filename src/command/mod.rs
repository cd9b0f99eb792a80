// ABOUTME: External command specification, execution and output capture
// ABOUTME: CommandRunner is the seam that lets tests replace real processes with a recorder

#[cfg(test)]
pub mod recording;

use anyhow::{Context, Result};
use std::fmt;
use std::process::Stdio;

/// An external program invocation, fully rendered before it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    redact: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            redact: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Marks a value that must be masked whenever this command is displayed.
    pub fn redacting(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.redact.push(secret);
        }
        self
    }

    /// Carries over the masked values of a command this one wraps.
    pub fn redacting_from(mut self, inner: &CommandSpec) -> Self {
        self.redact.extend(inner.redact.iter().cloned());
        self
    }

    /// The unmasked, shell-quoted command line.
    pub fn shell_line(&self) -> String {
        let mut rendered = shell_quote(&self.program);
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(&shell_quote(arg));
        }
        rendered
    }

    pub fn redact_text(&self, text: &str) -> String {
        self.redact
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.redact_text(&self.shell_line()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    pub fn with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn describe_status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Last non-empty stderr line, falling back to stdout.
    pub fn last_message(&self) -> Option<&str> {
        last_line(&self.stderr).or_else(|| last_line(&self.stdout))
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().filter(|line| !line.trim().is_empty()).last()
}

#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Runs the command to completion. `Err` means the process could not be started.
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput>;
}

/// Spawns real processes and captures their output.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let output = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to start {}", command.program))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Reports success for every command without running anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunRunner;

impl CommandRunner for DryRunRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("[dry-run] not executing {}", command.program);
        Ok(CommandOutput::success())
    }
}

/// Runs a command and writes the invocation, its output and exit status to the log.
pub async fn execute<R: CommandRunner>(runner: &R, command: &CommandSpec) -> Result<CommandOutput> {
    tracing::info!("$ {}", command);
    let output = runner.run(command).await?;

    for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
        tracing::info!("  | {}", command.redact_text(line));
    }
    for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
        tracing::warn!("  ! {}", command.redact_text(line));
    }

    if output.is_success() {
        tracing::debug!("  -> {}", output.describe_status());
    } else {
        tracing::error!("  -> {}", output.describe_status());
    }

    Ok(output)
}

/// Quotes a word for a POSIX shell. Plain words are returned unchanged.
pub fn shell_quote(word: &str) -> String {
    let is_plain = !word.is_empty()
        && word.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | '%' | '+' | ',')
        });
    if is_plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("db:export"), "db:export");
        assert_eq!(shell_quote("--file=/home/a/b.sql.gz"), "--file=/home/a/b.sql.gz");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_display_redacts_secrets() {
        let spec = CommandSpec::new("clpctl")
            .arg("db:add")
            .arg("--databaseUserPassword=hunter2")
            .redacting("hunter2");
        assert_eq!(spec.to_string(), "clpctl db:add --databaseUserPassword=***");
        assert_eq!(spec.args[1], "--databaseUserPassword=hunter2");
    }

    #[test]
    fn test_last_message_prefers_stderr() {
        let output = CommandOutput {
            code: Some(1),
            stdout: "progress\n".to_string(),
            stderr: "first\nAccess denied\n\n".to_string(),
        };
        assert_eq!(output.last_message(), Some("Access denied"));

        let only_stdout = CommandOutput {
            code: Some(1),
            stdout: "progress\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(only_stdout.last_message(), Some("progress"));
    }

    #[tokio::test]
    async fn test_system_runner_captures_exit_status() {
        let ok = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.stdout.trim(), "hello");

        let failed = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo nope >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(failed.code, Some(3));
        assert_eq!(failed.stderr.trim(), "nope");
    }

    #[tokio::test]
    async fn test_system_runner_reports_missing_program() {
        let result = SystemRunner
            .run(&CommandSpec::new("definitely-not-a-real-program-xyz"))
            .await;
        assert!(result.is_err());
    }
}
