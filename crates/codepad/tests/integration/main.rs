//! Integration tests for codepad
//!
//! These tests start real compilers and interpreters. A test whose toolchain
//! is not installed prints a note and returns early.
//! Run with: cargo test -p codepad --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;
use std::path::PathBuf;

use codepad::{Config, Runner};
use tempfile::TempDir;

mod config_loading;
mod languages;
mod pipeline;
mod process_tree;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Stdin shared by the greeting programs
pub(crate) const GREETING_INPUT: &str = "Owner\n20\n1.75";

/// What every greeting program prints for [`GREETING_INPUT`]
pub(crate) const GREETING_OUTPUT: &str =
    "Hello Owner, you are 20 years old and 1.75 meters tall.\n";

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Runner over the default toolchains with its workspaces in a temp dir
pub(crate) struct TestRunner {
    pub runner: Runner,
    root: TempDir,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let root = TempDir::new().expect("Failed to create workspace root");
        let mut config = Config::default();
        config.workspace_root = Some(root.path().join("workspaces"));
        adjust(&mut config);

        Self {
            runner: Runner::new(config),
            root,
        }
    }

    /// Check that no job left a workspace behind
    pub fn workspaces_left(&self) -> usize {
        fs::read_dir(self.root.path().join("workspaces"))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Check that every host program a language needs is on PATH
    pub fn installed(&self, language: &str) -> bool {
        let toolchain = self
            .runner
            .registry()
            .lookup(language)
            .unwrap_or_else(|| panic!("{language} not configured"));

        let missing: Vec<&str> = toolchain
            .programs()
            .into_iter()
            .filter(|program| find_on_path(program).is_none())
            .collect();

        if missing.is_empty() {
            true
        } else {
            eprintln!("skipping {language} test: {} not installed", missing.join(", "));
            false
        }
    }
}

fn find_on_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
