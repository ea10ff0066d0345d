use std::time::{Duration, Instant};

use serde::Serialize;

use crate::types::{JobId, JobStatus};

/// In-flight job tracked by the runner
#[derive(Debug)]
pub(crate) struct Job {
    id: JobId,
    language: String,
    status: JobStatus,
    output: String,
    exit_code: Option<i32>,
    started: Instant,
}

/// Final state of a job as returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub language: String,
    pub status: JobStatus,

    /// What the user sees: program output, compiler diagnostics or a notice
    pub output: String,

    /// Exit code of the last process the job ran, if it exited normally
    pub exit_code: Option<i32>,

    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl JobReport {
    /// Check if the program ran to completion
    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

impl Job {
    pub(crate) fn new(language: impl Into<String>) -> Self {
        Self {
            id: JobId::new(),
            language: language.into(),
            status: JobStatus::Created,
            output: String::new(),
            exit_code: None,
            started: Instant::now(),
        }
    }

    pub(crate) fn id(&self) -> JobId {
        self.id
    }

    pub(crate) fn status(&self) -> JobStatus {
        self.status
    }

    /// Move to `next`, returning the previous state
    pub(crate) fn advance(&mut self, next: JobStatus) -> JobStatus {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal job transition {} -> {next}",
            self.status
        );
        std::mem::replace(&mut self.status, next)
    }

    pub(crate) fn set_output(&mut self, output: String, exit_code: Option<i32>) {
        self.output = output;
        self.exit_code = exit_code;
    }

    pub(crate) fn into_report(self) -> JobReport {
        JobReport {
            id: self.id,
            language: self.language,
            status: self.status,
            output: self.output,
            exit_code: self.exit_code,
            duration: self.started.elapsed(),
        }
    }
}
