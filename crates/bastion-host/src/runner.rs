//! Command runner abstraction for invoking host tools
//!
//! `CommandRunner` is the trait every backend uses to run an external tool.
//! `TokioRunner` spawns the program directly (no shell).
//! `RecordingRunner` is the test double that records invocations and
//! returns scripted responses.

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use bastion_core::{Error, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Trait for running external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, returning stdout on success
    async fn run(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Like [`CommandRunner::run`], feeding `input` on stdin
    async fn run_with_input(&self, program: &str, args: &[&str], input: &str) -> Result<String>;

    /// Whether the command exits successfully
    async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        self.run(program, args).await.is_ok()
    }
}

/// Production runner built on `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;

impl TokioRunner {
    pub fn new() -> Self {
        Self
    }

    async fn execute(program: &str, args: &[&str], input: Option<&str>) -> Result<String> {
        tracing::debug!("exec: {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::backend(program, format!("failed to execute: {}", e)))?;

        if let Some(input) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                // Dropping stdin closes the pipe
            }
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("{} {} exited with {}", program, args.join(" "), output.status),
                detail => format!("{} {}: {}", program, args.join(" "), detail),
            };
            Err(Error::backend(program, message))
        }
    }
}

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        Self::execute(program, args, None).await
    }

    async fn run_with_input(&self, program: &str, args: &[&str], input: &str) -> Result<String> {
        Self::execute(program, args, Some(input)).await
    }
}

/// Test double that records command lines and returns scripted responses
///
/// Responses are matched by command-line prefix, first registered first.
/// Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    responses: Mutex<Vec<(String, std::result::Result<String, String>)>>,
    commands: Mutex<Vec<String>>,
    inputs: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`
    pub fn respond(self, prefix: &str, output: &str) -> Self {
        self.push(prefix, Ok(output.to_string()));
        self
    }

    /// Fail commands starting with `prefix`
    pub fn fail(self, prefix: &str, message: &str) -> Self {
        self.push(prefix, Err(message.to_string()));
        self
    }

    fn push(&self, prefix: &str, response: std::result::Result<String, String>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((prefix.to_string(), response));
    }

    /// Every command line run so far
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Everything written to stdin so far
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, program: &str, args: &[&str]) -> Result<String> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");

        self.commands
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.clone());

        let responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.iter().find(|(prefix, _)| line.starts_with(prefix.as_str())) {
            Some((_, Ok(output))) => Ok(output.clone()),
            Some((_, Err(message))) => Err(Error::backend(program, message.clone())),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        self.record(program, args)
    }

    async fn run_with_input(&self, program: &str, args: &[&str], input: &str) -> Result<String> {
        self.inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(input.to_string());
        self.record(program, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_runner_records_and_matches_prefixes() {
        let runner = RecordingRunner::new()
            .fail("systemctl is-active", "inactive")
            .respond("wg genkey", "KEY\n");

        assert_eq!(runner.run("wg", &["genkey"]).await.unwrap(), "KEY\n");
        assert!(!runner.succeeds("systemctl", &["is-active", "--quiet", "x"]).await);
        assert_eq!(runner.run("sysctl", &["-p"]).await.unwrap(), "");

        assert_eq!(
            runner.commands(),
            vec![
                "wg genkey",
                "systemctl is-active --quiet x",
                "sysctl -p"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tokio_runner_captures_output_and_failures() {
        let runner = TokioRunner::new();

        let out = runner.run_with_input("cat", &[], "piped").await.unwrap();
        assert_eq!(out, "piped");

        let err = runner.run("sh", &["-c", "echo boom >&2; exit 3"]).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        assert!(runner.run("definitely-not-a-real-tool-name", &[]).await.is_err());
    }
}
