// ABOUTME: Test double that records every command instead of running it
// ABOUTME: Scripted rules let tests make specific invocations fail or print output

use anyhow::Result;
use std::sync::Mutex;

use super::{CommandOutput, CommandRunner, CommandSpec};

struct Rule {
    needle: String,
    output: Option<CommandOutput>,
}

/// Matches rules against the full rendered command line, first match wins.
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    rules: Vec<Rule>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any command whose rendered line contains `needle` exits with `code`.
    pub fn fail_when(mut self, needle: &str, code: i32) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            output: Some(CommandOutput::failure(code, format!("simulated failure: {}", needle))),
        });
        self
    }

    /// Any command whose rendered line contains `needle` fails to start.
    pub fn unavailable_when(mut self, needle: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            output: None,
        });
        self
    }

    pub fn respond_when(mut self, needle: &str, stdout: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            output: Some(CommandOutput::with_stdout(stdout)),
        });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines in invocation order.
    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.to_string()).collect()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.lines().iter().position(|line| line.contains(needle))
    }

    pub fn invoked(&self, needle: &str) -> bool {
        self.position(needle).is_some()
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let line = format!("{} {}", command.program, command.args.join(" "));

        match self.rules.iter().find(|rule| line.contains(&rule.needle)) {
            Some(Rule { output: Some(output), .. }) => Ok(output.clone()),
            Some(Rule { output: None, needle }) => {
                anyhow::bail!("simulated spawn failure: {}", needle)
            }
            None => Ok(CommandOutput::success()),
        }
    }
}
