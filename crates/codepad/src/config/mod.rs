use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::toolchain::{
    CompileConfig, FileExtension, Placeholders, RunConfig, Toolchain,
};
pub use crate::config::transform::{SourceTransform, TransformError};

mod loader;
pub mod toolchain;
pub mod transform;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../codepad.example.toml");

/// Prefix of environment variables that override configuration keys
pub const ENV_PREFIX: &str = "CODEPAD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Codepad
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding one workspace per job.
    ///
    /// Defaults to `codepad` under the system temp directory.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// JSON lines file receiving a record per finished job
    #[serde(default)]
    pub history_path: Option<PathBuf>,

    /// Number of jobs allowed to run at the same time
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Number of jobs allowed to wait for a free slot before new ones are
    /// turned away as overloaded
    #[serde(default = "default_max_queued_jobs")]
    pub max_queued_jobs: usize,

    /// Wall clock limit for the run phase in milliseconds
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,

    /// Wall clock limit for the compile phase in milliseconds
    #[serde(default = "default_compile_timeout_ms")]
    pub compile_timeout_ms: u64,

    /// Captured bytes per output stream; the rest is discarded
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Largest accepted source text in bytes
    #[serde(default = "default_request_limit")]
    pub max_source_bytes: usize,

    /// Largest accepted stdin payload in bytes
    #[serde(default = "default_request_limit")]
    pub max_input_bytes: usize,

    /// Host environment variables passed through to child processes
    #[serde(default = "default_inherit_env")]
    pub inherit_env: Vec<String>,

    /// Toolchains keyed by language id
    #[serde(default)]
    pub toolchains: HashMap<String, Toolchain>,
}

impl Config {
    /// Create a new config with the embedded default toolchains
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no toolchains
    pub fn empty() -> Self {
        Self {
            workspace_root: None,
            history_path: None,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_queued_jobs: default_max_queued_jobs(),
            run_timeout_ms: default_run_timeout_ms(),
            compile_timeout_ms: default_compile_timeout_ms(),
            max_output_bytes: default_max_output_bytes(),
            max_source_bytes: default_request_limit(),
            max_input_bytes: default_request_limit(),
            inherit_env: default_inherit_env(),
            toolchains: HashMap::new(),
        }
    }

    /// Directory under which job workspaces are created
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("codepad"))
    }

    /// Run timeout for a toolchain, honoring its override
    pub fn run_timeout(&self, toolchain: &Toolchain) -> Duration {
        Duration::from_millis(toolchain.run.timeout_ms.unwrap_or(self.run_timeout_ms))
    }

    /// Compile timeout for a toolchain, honoring its override
    pub fn compile_timeout(&self, toolchain: &Toolchain) -> Duration {
        let override_ms = toolchain
            .compile
            .as_ref()
            .and_then(|compile| compile.timeout_ms);
        Duration::from_millis(override_ms.unwrap_or(self.compile_timeout_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_max_queued_jobs() -> usize {
    16
}

fn default_run_timeout_ms() -> u64 {
    7000
}

fn default_compile_timeout_ms() -> u64 {
    30_000
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

fn default_request_limit() -> usize {
    10 * 1024
}

fn default_inherit_env() -> Vec<String> {
    ["PATH", "HOME", "LANG", "TMPDIR"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_new_has_playground_languages() {
        let config = Config::new();
        for id in [
            "javascript",
            "python",
            "c",
            "cpp",
            "java",
            "go",
            "php",
            "ruby",
        ] {
            assert!(config.toolchains.contains_key(id), "missing {id}");
        }
    }

    #[test]
    fn exactly_one_default_toolchain_transforms_source() {
        let config = Config::new();
        let transformed: Vec<_> = config
            .toolchains
            .iter()
            .filter(|(_, toolchain)| toolchain.transform.is_some())
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(transformed, vec!["java"]);
    }

    #[test]
    fn config_empty_has_no_toolchains() {
        let config = Config::empty();
        assert!(config.toolchains.is_empty());
        assert_eq!(config.run_timeout_ms, 7000);
    }

    #[test]
    fn workspace_root_defaults_to_temp_dir() {
        let config = Config::empty();
        assert_eq!(config.workspace_root(), std::env::temp_dir().join("codepad"));
    }

    #[test]
    fn workspace_root_custom() {
        let config = Config {
            workspace_root: Some(PathBuf::from("/srv/codepad")),
            ..Config::empty()
        };
        assert_eq!(config.workspace_root(), PathBuf::from("/srv/codepad"));
    }

    #[test]
    fn timeouts_prefer_toolchain_override() {
        let mut config = Config::new();
        config.run_timeout_ms = 1000;
        let mut python = config.toolchains["python"].clone();
        assert_eq!(config.run_timeout(&python), Duration::from_millis(1000));

        python.run.timeout_ms = Some(15_000);
        assert_eq!(config.run_timeout(&python), Duration::from_millis(15_000));
    }

    #[test]
    fn compile_timeout_for_interpreted_uses_default() {
        let config = Config::new();
        let python = &config.toolchains["python"];
        assert_eq!(
            config.compile_timeout(python),
            Duration::from_millis(config.compile_timeout_ms)
        );
    }
}
