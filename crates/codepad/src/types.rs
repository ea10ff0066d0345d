use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a job
///
/// Drawn from the UUID v4 space, so two live jobs never share an id (and
/// therefore never share a workspace directory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random job id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// A request to compile (if needed) and run a piece of source code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Toolchain id (e.g. "python", "cpp")
    pub language: String,

    /// Program source text
    pub code: String,

    /// Data piped to the program's standard input
    #[serde(default)]
    pub input: Option<String>,
}

impl JobRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            input: None,
        }
    }

    /// Set the standard input payload
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Transport-agnostic response body
///
/// Serializes to `{"output": ...}` on success and `{"error": ...}` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobResponse {
    Output { output: String },
    Error { error: String },
}

/// Result of a single compile or run invocation
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Captured standard output (lossily decoded as UTF-8)
    pub stdout: String,

    /// Captured standard error (lossily decoded as UTF-8)
    pub stderr: String,

    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,

    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,

    /// Wall clock limit was reached and the process tree was killed
    pub timed_out: bool,

    /// Execution was cancelled from outside and the process tree was killed
    pub cancelled: bool,

    /// At least one stream exceeded the capture limit
    pub truncated: bool,

    /// Wall clock time from spawn to exit
    pub duration: Duration,
}

impl ExecutionResult {
    /// Check if the process exited on its own with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && !self.cancelled && self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, as a user would see them in a terminal
    pub fn combined_output(&self) -> String {
        let mut output = self.stdout.clone();
        if !output.is_empty() && !self.stderr.is_empty() && !output.ends_with('\n') {
            output.push('\n');
        }
        output.push_str(&self.stderr);
        output
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Validated,
    CompileSkipped,
    Compiling,
    CompileSucceeded,
    Running,

    /// Request failed validation; no workspace was created
    Rejected,

    /// The source transform could not find the construct it rewrites
    SourceRejected,

    /// Compiler reported diagnostics or a non-zero exit
    CompileFailed,

    /// Program exited on its own (any exit code)
    Completed,

    /// Program exceeded the run timeout and was killed
    TimedOut,

    /// Program was killed because the caller cancelled the job
    Cancelled,

    /// The program could not be started at all
    RuntimeFailed,
}

impl JobStatus {
    /// Check if no further transitions are possible
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Rejected
                | JobStatus::SourceRejected
                | JobStatus::CompileFailed
                | JobStatus::Completed
                | JobStatus::TimedOut
                | JobStatus::Cancelled
                | JobStatus::RuntimeFailed
        )
    }

    /// Check if `next` is a legal successor of this state
    #[must_use]
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        match self {
            Created => matches!(next, Validated | Rejected),
            Validated => matches!(next, CompileSkipped | Compiling | RuntimeFailed),
            CompileSkipped => matches!(
                next,
                Running | SourceRejected | Cancelled | RuntimeFailed
            ),
            Compiling => matches!(
                next,
                CompileSucceeded | CompileFailed | SourceRejected | Cancelled | RuntimeFailed
            ),
            CompileSucceeded => matches!(next, Running | Cancelled),
            Running => matches!(next, Completed | TimedOut | Cancelled | RuntimeFailed),
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Created => "created",
            JobStatus::Validated => "validated",
            JobStatus::CompileSkipped => "compile_skipped",
            JobStatus::Compiling => "compiling",
            JobStatus::CompileSucceeded => "compile_succeeded",
            JobStatus::Running => "running",
            JobStatus::Rejected => "rejected",
            JobStatus::SourceRejected => "source_rejected",
            JobStatus::CompileFailed => "compile_failed",
            JobStatus::Completed => "completed",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Cancelled => "cancelled",
            JobStatus::RuntimeFailed => "runtime_failed",
        };
        f.write_str(name)
    }
}
