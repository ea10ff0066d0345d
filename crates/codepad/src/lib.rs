//! A library for compiling and running playground code.
//!
//! Codepad takes a language id, source text and optional stdin, compiles the
//! source if the language needs it, runs the program and hands back what it
//! printed. Every job gets a private workspace directory that is removed once
//! the job is finished.
//!
//! # Features
//!
//! - **Declarative toolchains**: each language is a TOML entry with argv templates.
//! - **Process tree control**: children run in their own process group and are killed with it.
//! - **Bounded concurrency**: admission control with a fixed backlog, overload fails fast.
//! - **Source transforms**: e.g. renaming a Java `public class` so it can be run as `Main`.
//! - **History**: optional JSON lines log of every finished job.

pub use admission::{AdmissionController, AdmissionError, AdmissionPermit};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Toolchain};
pub use executor::{CancelToken, ExecutorError, ProcessCommand};
pub use history::{HistoryError, HistoryRecord, HistoryStore, JsonlHistoryStore, NoopHistoryStore};
pub use registry::ToolchainRegistry;
pub use runner::{
    CompileError, CompileResult, JobError, JobObserver, JobReport, NO_OUTPUT, NoopObserver, Runner,
    ValidationError,
};
pub use types::{ExecutionResult, JobId, JobRequest, JobResponse, JobStatus};
pub use workspace::{ArtifactKind, Workspace, WorkspaceError, WorkspaceManager};

pub mod admission;
pub mod config;
pub mod executor;
pub mod history;
pub mod registry;
pub mod runner;
pub mod types;
pub mod workspace;
