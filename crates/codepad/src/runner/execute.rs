//! Execution step for code running
//!
//! Starts the compiled or interpreted program with the job's input.

use std::path::Path;

use tracing::{debug, instrument};

use crate::config::{Config, Placeholders, Toolchain};
use crate::executor::{self, CancelToken, ExecutorError, ProcessCommand};
use crate::types::ExecutionResult;

/// Run the job's program in `workspace`, feeding it `input`
#[instrument(skip(config, toolchain, placeholders, workspace, input, cancel), fields(toolchain = %toolchain.name))]
pub async fn execute(
    config: &Config,
    toolchain: &Toolchain,
    placeholders: &Placeholders<'_>,
    workspace: &Path,
    input: &[u8],
    cancel: Option<&CancelToken>,
) -> Result<ExecutionResult, ExecutorError> {
    let command = run_command(config, toolchain, placeholders, workspace);

    debug!(argv = ?command.argv(), input_len = input.len(), "executing program");

    let result = executor::run(&command, input, cancel).await?;

    debug!(
        exit_code = ?result.exit_code,
        signal = ?result.signal,
        timed_out = result.timed_out,
        duration_ms = result.duration.as_millis() as u64,
        "execution complete"
    );

    Ok(result)
}

/// Build the run command for a toolchain
pub(crate) fn run_command(
    config: &Config,
    toolchain: &Toolchain,
    placeholders: &Placeholders<'_>,
    workspace: &Path,
) -> ProcessCommand {
    ProcessCommand::new(toolchain.run_command(placeholders))
        .working_dir(workspace)
        .env_inherit(config.inherit_env.iter().cloned())
        .envs(Toolchain::expand_env(&toolchain.run.env, placeholders))
        .timeout(config.run_timeout(toolchain))
        .max_output_bytes(config.max_output_bytes)
}
