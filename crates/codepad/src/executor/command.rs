//! Command builder for child processes
//!
//! Collects argv, environment and limits, then produces a ready-to-spawn
//! [`tokio::process::Command`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::executor::ExecutorError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Builder for a child process invocation
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    /// Program followed by its arguments, passed without a shell
    argv: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
    /// Host variables copied into the otherwise empty environment
    env_inherit: Vec<String>,
    timeout: Duration,
    /// Per stream
    max_output_bytes: usize,
}

impl ProcessCommand {
    pub fn new(argv: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: Vec::new(),
            env_inherit: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set several environment variables
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Inherit environment variables from the parent process
    pub fn env_inherit(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.env_inherit.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Set the wall clock limit
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the capture limit for each output stream
    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn working_dir_path(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    pub fn output_limit(&self) -> usize {
        self.max_output_bytes
    }

    /// Build the spawnable command
    ///
    /// The environment starts empty. Stdout and stderr are always piped, the
    /// child leads a new process group on unix, and it is killed if the
    /// returned command's child handle is dropped.
    pub fn build(&self, stdin: Stdio) -> Result<Command, ExecutorError> {
        let (program, args) = self.argv.split_first().ok_or(ExecutorError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for key in &self.env_inherit {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        cmd.process_group(0);

        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_settings() {
        let cmd = ProcessCommand::new(["python3", "/ws/main.py"])
            .working_dir("/ws")
            .env("PYTHONUNBUFFERED", "1")
            .env_inherit(["PATH"])
            .timeout(Duration::from_millis(2000))
            .max_output_bytes(128);

        assert_eq!(cmd.program(), Some("python3"));
        assert_eq!(cmd.argv(), &["python3", "/ws/main.py"]);
        assert_eq!(cmd.working_dir_path(), Some(Path::new("/ws")));
        assert_eq!(cmd.timeout_duration(), Duration::from_millis(2000));
        assert_eq!(cmd.output_limit(), 128);
    }

    #[test]
    fn defaults() {
        let cmd = ProcessCommand::new(["true"]);
        assert_eq!(cmd.timeout_duration(), DEFAULT_TIMEOUT);
        assert_eq!(cmd.output_limit(), DEFAULT_MAX_OUTPUT_BYTES);
        assert!(cmd.working_dir_path().is_none());
    }

    #[test]
    fn empty_argv_cannot_be_built() {
        let cmd = ProcessCommand::new(Vec::<String>::new());
        assert!(cmd.program().is_none());
        assert!(matches!(
            cmd.build(Stdio::null()),
            Err(ExecutorError::EmptyCommand)
        ));
    }

    #[test]
    fn arguments_are_not_split() {
        let cmd = ProcessCommand::new(["echo", "a b; c"]);
        assert_eq!(cmd.argv().len(), 2);
        assert!(cmd.build(Stdio::null()).is_ok());
    }
}
