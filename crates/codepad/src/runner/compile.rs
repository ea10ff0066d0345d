//! Compilation step for code execution
//!
//! Runs a toolchain's compiler inside the job workspace and decides whether
//! the result is good enough to run.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::{Config, Placeholders, Toolchain};
use crate::executor::{self, CancelToken, ProcessCommand};
use crate::runner::CompileError;
use crate::types::ExecutionResult;

/// Result of a compilation
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Whether compilation succeeded
    pub success: bool,

    /// Execution result from the compilation process
    pub execution: ExecutionResult,

    /// Compiler output shown to the user when compilation fails
    pub output: String,
}

impl CompileResult {
    /// Judge a finished compiler process
    ///
    /// Anything on stderr counts as a diagnostic, even when the compiler
    /// exits with status 0. A cancelled compile is never a success.
    pub fn from_execution(execution: ExecutionResult, timeout: Duration) -> Self {
        let has_diagnostics = !execution.stderr.trim().is_empty();
        let success = execution.is_success() && !has_diagnostics;

        let mut output = execution.combined_output();
        if execution.timed_out {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!(
                "[compilation timed out after {} ms]",
                timeout.as_millis()
            ));
        } else if execution.cancelled {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str("[compilation cancelled]");
        } else if !success && output.trim().is_empty() {
            output = match (execution.exit_code, execution.signal) {
                (Some(code), _) => format!("compiler exited with code {code}"),
                (None, Some(signal)) => format!("compiler killed by signal {signal}"),
                (None, None) => "compiler failed".to_owned(),
            };
        }

        Self {
            success,
            execution,
            output,
        }
    }

    /// Check if compilation was successful
    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Compile the job's source in `workspace`
#[instrument(skip(config, toolchain, placeholders, workspace, cancel), fields(toolchain = %toolchain.name))]
pub async fn compile(
    config: &Config,
    toolchain: &Toolchain,
    placeholders: &Placeholders<'_>,
    workspace: &Path,
    cancel: Option<&CancelToken>,
) -> Result<CompileResult, CompileError> {
    let compile_config = toolchain
        .compile
        .as_ref()
        .ok_or_else(|| CompileError::NotCompiled(toolchain.name.clone()))?;

    let argv = Toolchain::expand_command(&compile_config.command, placeholders);
    let timeout = config.compile_timeout(toolchain);

    let command = ProcessCommand::new(argv)
        .working_dir(workspace)
        .env_inherit(config.inherit_env.iter().cloned())
        .envs(Toolchain::expand_env(&compile_config.env, placeholders))
        .timeout(timeout)
        .max_output_bytes(config.max_output_bytes);

    debug!(argv = ?command.argv(), "compiling");

    let execution = executor::compile(&command, cancel).await?;
    let result = CompileResult::from_execution(execution, timeout);

    debug!(
        success = result.success,
        exit_code = ?result.execution.exit_code,
        timed_out = result.execution.timed_out,
        "compilation complete"
    );

    Ok(result)
}
