//! Host process execution
//!
//! Starts compilers and user programs as ordinary child processes with a
//! cleared environment, feeds their stdin, captures their output and makes
//! sure nothing they spawned outlives the call.

use thiserror::Error;

pub use crate::executor::cancel::CancelToken;
pub use crate::executor::command::ProcessCommand;
pub use crate::executor::process::{compile, run};

mod cancel;
mod command;
mod process;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("empty command")]
    EmptyCommand,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
