//! Job runner for Codepad
//!
//! Drives a request through validation, workspace setup, the optional
//! compile phase and the run phase, and always tears the workspace down.

use std::borrow::Cow;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, field, info, instrument, warn};

pub use crate::runner::compile::{CompileResult, compile};
pub use crate::runner::execute::execute;
pub use crate::runner::job::JobReport;

mod compile;
mod execute;
mod job;

use crate::{
    admission::{AdmissionController, AdmissionError},
    config::{Config, Placeholders, Toolchain},
    executor::{CancelToken, ExecutorError},
    history::{HistoryRecord, HistoryStore, JsonlHistoryStore, NoopHistoryStore},
    registry::ToolchainRegistry,
    runner::job::Job,
    types::{ExecutionResult, JobId, JobRequest, JobResponse, JobStatus},
    workspace::{ArtifactKind, Workspace, WorkspaceError, WorkspaceManager},
};

/// Output reported for a program that printed nothing
pub const NO_OUTPUT: &str = "No output";

const CANCELLED_NOTICE: &str = "[execution cancelled]";

/// Reasons a request is refused before any work is done
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing language or code")]
    MissingFields,

    #[error("Language not supported: '{0}'")]
    UnsupportedLanguage(String),

    #[error("source is {size} bytes, limit is {limit}")]
    SourceTooLarge { size: usize, limit: usize },

    #[error("input is {size} bytes, limit is {limit}")]
    InputTooLarge { size: usize, limit: usize },
}

/// Errors that occur during compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("language '{0}' does not support compilation")]
    NotCompiled(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Errors that keep a job from producing a report
///
/// Compile failures, timeouts and crashing programs are not errors; they end
/// up in [`JobReport::status`] with descriptive output.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

impl JobError {
    /// Check if the caller is at fault (or should simply retry later)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            JobError::Validation(_) | JobError::Admission(AdmissionError::Overloaded { .. })
        )
    }
}

impl JobResponse {
    /// Map a job outcome onto the transport response
    pub fn from_result(result: &Result<JobReport, JobError>) -> Self {
        match result {
            Ok(report) => JobResponse::Output {
                output: report.output.clone(),
            },
            Err(e) => JobResponse::Error {
                error: e.to_string(),
            },
        }
    }
}

/// Hook for watching jobs move through the pipeline
///
/// Every method defaults to doing nothing.
pub trait JobObserver: std::fmt::Debug + Send + Sync {
    fn on_transition(&self, _job_id: JobId, _from: JobStatus, _to: JobStatus) {}

    fn on_workspace_created(&self, _job_id: JobId, _path: &Path) {}

    /// Called right before the compiler is started
    fn on_compile(&self, _job_id: JobId) {}

    /// Called right before the program is started
    fn on_run(&self, _job_id: JobId) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

/// Owned absolute paths substituted into a toolchain's commands
struct JobPaths {
    source: String,
    binary: String,
    workspace: String,
    class: String,
}

impl JobPaths {
    fn placeholders(&self) -> Placeholders<'_> {
        Placeholders {
            source: &self.source,
            binary: &self.binary,
            workspace: &self.workspace,
            class: &self.class,
        }
    }
}

/// Compiles and runs submitted code
///
/// Cheap to clone; clones share the admission counters and history store.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    registry: ToolchainRegistry,
    workspaces: WorkspaceManager,
    admission: AdmissionController,
    history: Arc<dyn HistoryStore>,
    /// History writes that may still be in flight
    pending: Arc<Mutex<JoinSet<()>>>,
    observer: Arc<dyn JobObserver>,
}

impl Runner {
    /// Create a runner from configuration
    ///
    /// History goes to `history_path` when configured and is discarded
    /// otherwise.
    pub fn new(config: Config) -> Self {
        let history: Arc<dyn HistoryStore> = match config.history_path {
            Some(ref path) => Arc::new(JsonlHistoryStore::new(path)),
            None => Arc::new(NoopHistoryStore),
        };

        Self {
            registry: ToolchainRegistry::from_config(&config),
            workspaces: WorkspaceManager::new(config.workspace_root()),
            admission: AdmissionController::new(
                config.max_concurrent_jobs,
                config.max_queued_jobs,
            ),
            history,
            pending: Arc::new(Mutex::new(JoinSet::new())),
            observer: Arc::new(NoopObserver),
            config: Arc::new(config),
        }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Replace the history store
    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = history;
        self
    }

    /// Replace the job observer
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Wait for history records that are still being written
    pub async fn flush_history(&self) {
        let mut pending = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        while pending.join_next().await.is_some() {}
    }

    /// Run a job to a terminal state
    pub async fn submit(&self, request: JobRequest) -> Result<JobReport, JobError> {
        self.submit_with_cancel(request, None).await
    }

    /// Run a job and map the outcome onto a response body
    pub async fn respond(&self, request: JobRequest) -> JobResponse {
        JobResponse::from_result(&self.submit(request).await)
    }

    /// Run a job that can be cancelled through `cancel`
    ///
    /// The job waits for an admission slot first. Once it has a workspace,
    /// the workspace is destroyed before this returns, whatever the outcome.
    #[instrument(skip(self, request, cancel), fields(job_id = field::Empty, language = %request.language))]
    pub async fn submit_with_cancel(
        &self,
        request: JobRequest,
        cancel: Option<&CancelToken>,
    ) -> Result<JobReport, JobError> {
        let _permit = self.admission.admit().await?;

        let mut job = Job::new(request.language.as_str());
        Span::current().record("job_id", field::display(job.id()));

        let toolchain = match self.validate(&request) {
            Ok(toolchain) => toolchain,
            Err(e) => {
                info!(reason = %e, "job rejected");
                self.transition(&mut job, JobStatus::Rejected);
                return Err(e.into());
            }
        };
        self.transition(&mut job, JobStatus::Validated);

        let mut workspace = match self.workspaces.create(job.id()).await {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(error = %e, "failed to create workspace");
                self.transition(&mut job, JobStatus::RuntimeFailed);
                return Err(e.into());
            }
        };
        self.observer.on_workspace_created(job.id(), workspace.path());

        let processed = self
            .process(&mut job, toolchain, &request, &mut workspace, cancel)
            .await;
        workspace.destroy().await;

        if let Err(e) = processed {
            warn!(error = %e, "job aborted");
            return Err(e.into());
        }

        let report = job.into_report();
        self.persist(&request, &report.output);

        info!(
            status = %report.status,
            exit_code = ?report.exit_code,
            duration_ms = report.duration.as_millis() as u64,
            "job finished"
        );

        Ok(report)
    }

    fn validate(&self, request: &JobRequest) -> Result<&Toolchain, ValidationError> {
        if request.language.is_empty() || request.code.trim().is_empty() {
            return Err(ValidationError::MissingFields);
        }

        let toolchain = self
            .registry
            .lookup(&request.language)
            .ok_or_else(|| ValidationError::UnsupportedLanguage(request.language.clone()))?;

        if request.code.len() > self.config.max_source_bytes {
            return Err(ValidationError::SourceTooLarge {
                size: request.code.len(),
                limit: self.config.max_source_bytes,
            });
        }
        if let Some(ref input) = request.input
            && input.len() > self.config.max_input_bytes
        {
            return Err(ValidationError::InputTooLarge {
                size: input.len(),
                limit: self.config.max_input_bytes,
            });
        }

        Ok(toolchain)
    }

    /// Take a validated job with a fresh workspace to a terminal state
    ///
    /// Only workspace I/O failures are returned as errors; the job is marked
    /// `RuntimeFailed` before they are.
    async fn process(
        &self,
        job: &mut Job,
        toolchain: &Toolchain,
        request: &JobRequest,
        workspace: &mut Workspace,
        cancel: Option<&CancelToken>,
    ) -> Result<(), WorkspaceError> {
        let compiled = toolchain.needs_compile();
        self.transition(
            job,
            if compiled {
                JobStatus::Compiling
            } else {
                JobStatus::CompileSkipped
            },
        );

        let source = match toolchain.transform {
            Some(ref transform) => match transform.apply(&request.code) {
                Ok(source) => source,
                Err(e) => {
                    debug!(error = %e, "source transform failed");
                    job.set_output(e.to_string(), None);
                    self.transition(job, JobStatus::SourceRejected);
                    return Ok(());
                }
            },
            None => Cow::Borrowed(request.code.as_str()),
        };

        let paths = match prepare(workspace, toolchain, &source).await {
            Ok(paths) => paths,
            Err(e) => {
                job.set_output(e.to_string(), None);
                self.transition(job, JobStatus::RuntimeFailed);
                return Err(e);
            }
        };
        let placeholders = paths.placeholders();

        if compiled {
            if self.stop_if_cancelled(job, cancel) {
                return Ok(());
            }

            self.observer.on_compile(job.id());
            let outcome = compile::compile(
                &self.config,
                toolchain,
                &placeholders,
                workspace.path(),
                cancel,
            )
            .await;
            match outcome {
                Ok(result) if result.execution.cancelled => {
                    job.set_output(result.output, None);
                    self.transition(job, JobStatus::Cancelled);
                    return Ok(());
                }
                Ok(result) if result.is_success() => {
                    self.transition(job, JobStatus::CompileSucceeded);
                }
                Ok(result) => {
                    job.set_output(result.output, result.execution.exit_code);
                    self.transition(job, JobStatus::CompileFailed);
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "compiler could not be started");
                    job.set_output(e.to_string(), None);
                    self.transition(job, JobStatus::CompileFailed);
                    return Ok(());
                }
            }
        }

        if self.stop_if_cancelled(job, cancel) {
            return Ok(());
        }

        self.transition(job, JobStatus::Running);
        self.observer.on_run(job.id());

        let input = request.input.as_deref().unwrap_or_default();
        let executed = execute::execute(
            &self.config,
            toolchain,
            &placeholders,
            workspace.path(),
            input.as_bytes(),
            cancel,
        )
        .await;

        match executed {
            Ok(result) => {
                let status = if result.cancelled {
                    JobStatus::Cancelled
                } else if result.timed_out {
                    JobStatus::TimedOut
                } else {
                    JobStatus::Completed
                };
                let output = assemble_output(&result, self.config.run_timeout(toolchain));
                job.set_output(output, result.exit_code);
                self.transition(job, status);
            }
            Err(e) => {
                warn!(error = %e, "program could not be started");
                job.set_output(e.to_string(), None);
                self.transition(job, JobStatus::RuntimeFailed);
            }
        }

        Ok(())
    }

    /// End the job as cancelled if its token fired before the next phase
    fn stop_if_cancelled(&self, job: &mut Job, cancel: Option<&CancelToken>) -> bool {
        if !cancel.is_some_and(|token| token.is_cancelled()) {
            return false;
        }

        debug!(status = %job.status(), "job cancelled between phases");
        job.set_output(CANCELLED_NOTICE.to_owned(), None);
        self.transition(job, JobStatus::Cancelled);
        true
    }

    fn transition(&self, job: &mut Job, next: JobStatus) {
        let previous = job.advance(next);
        debug!(from = %previous, to = %next, "job transition");
        self.observer.on_transition(job.id(), previous, next);
    }

    /// Store a history record without holding up the caller
    fn persist(&self, request: &JobRequest, output: &str) {
        let record = HistoryRecord {
            language: request.language.clone(),
            code: request.code.clone(),
            input: request.input.clone().unwrap_or_default(),
            output: output.to_owned(),
            timestamp: Utc::now(),
        };
        let history = Arc::clone(&self.history);

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while pending.try_join_next().is_some() {}
        pending.spawn(
            async move {
                if let Err(e) = history.record(record).await {
                    warn!(error = %e, "failed to store history record");
                }
            }
            .in_current_span(),
        );
    }
}

/// Write the source and resolve every artifact path the toolchain may use
async fn prepare(
    workspace: &mut Workspace,
    toolchain: &Toolchain,
    source: &str,
) -> Result<JobPaths, WorkspaceError> {
    let source_path = workspace
        .write_source(&toolchain.source_name(), source)
        .await?;

    let binary = match toolchain.binary_name() {
        Some(name) => workspace
            .artifact_path(&ArtifactKind::Binary(name.to_owned()))?
            .to_string_lossy()
            .into_owned(),
        None => String::new(),
    };

    let class = match toolchain.entry_point() {
        Some(entry) => {
            workspace.artifact_path(&ArtifactKind::Class(entry.to_owned()))?;
            entry.to_owned()
        }
        None => String::new(),
    };

    Ok(JobPaths {
        source: source_path.to_string_lossy().into_owned(),
        binary,
        workspace: workspace.path().to_string_lossy().into_owned(),
        class,
    })
}

/// Combine a run's output with notices about how it ended
fn assemble_output(result: &ExecutionResult, timeout: Duration) -> String {
    let mut output = result.combined_output();

    if result.truncated {
        append_notice(&mut output, "[output truncated]");
    }
    if result.timed_out {
        append_notice(
            &mut output,
            &format!("[execution timed out after {} ms]", timeout.as_millis()),
        );
    } else if result.cancelled {
        append_notice(&mut output, CANCELLED_NOTICE);
    }

    if output.is_empty() {
        output.push_str(NO_OUTPUT);
    }
    output
}

fn append_notice(output: &mut String, notice: &str) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
    output.push_str(notice);
}
