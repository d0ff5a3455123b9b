//! Source tool invocation.
//!
//! A source's tool produces raw text on each poll; [`crate::transform::records`]
//! turns it into records. Local commands are run here. MCP tools need an
//! injected [`ToolInvoker`] that owns an MCP client.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info_span, Instrument};

use crate::models::source::{CommandSpec, ToolDescriptor, ToolKind};
use crate::transform::template::{self, Unresolved};
use crate::{AppError, Result};

/// Runs a source's tool and returns its raw output.
pub trait ToolInvoker: Send + Sync {
    /// Invoke `tool` on behalf of `source`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` when the tool cannot run, fails, or times out.
    fn invoke<'a>(
        &'a self,
        source: &'a str,
        tool: &'a ToolDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Runs command descriptors as child processes.
#[derive(Debug, Clone)]
pub struct CommandInvoker {
    timeout: Duration,
}

impl CommandInvoker {
    /// Invoker that kills commands running longer than `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, source: &str, command: &CommandSpec, tool: &ToolDescriptor) -> Result<String> {
        let args = Value::Object(tool.args.clone());
        let mut cmd = match command {
            CommandSpec::Argv(argv) => {
                let mut parts = argv
                    .iter()
                    .map(|part| template::expand(part, &args, Unresolved::Keep));
                let program = parts
                    .next()
                    .ok_or_else(|| AppError::Tool(format!("{source}: empty command")))?;
                let mut cmd = Command::new(program);
                cmd.args(parts);
                cmd
            }
            CommandSpec::Shell(line) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c")
                    .arg(template::expand(line, &args, Unresolved::Keep));
                cmd
            }
        };
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|err| AppError::Tool(format!("{source}: failed to spawn command: {err}")))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AppError::Tool(format!(
                    "{source}: command timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|err| AppError::Tool(format!("{source}: command failed: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Tool(format!(
                "{source}: command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!(source, bytes = output.stdout.len(), "command finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ToolInvoker for CommandInvoker {
    fn invoke<'a>(
        &'a self,
        source: &'a str,
        tool: &'a ToolDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(
            async move {
                match tool.kind()? {
                    ToolKind::Command(command) => self.run(source, command, tool).await,
                    ToolKind::Mcp { server, tool } => Err(AppError::Tool(format!(
                        "{source}: tool `{tool}` on `{server}` requires an MCP client"
                    ))),
                }
            }
            .instrument(info_span!("invoke_tool", source)),
        )
    }
}
