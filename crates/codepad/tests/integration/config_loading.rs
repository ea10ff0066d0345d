use std::path::Path;

use codepad::Config;

use super::FIXTURES_PATH;

fn load(name: &str) -> Result<Config, codepad::ConfigError> {
    Config::from_file(format!("{FIXTURES_PATH}/configs/{name}"))
}

#[test]
fn test_load_minimal_config() {
    let config = load("valid_minimal.toml").expect("Failed to load config");

    assert!(config.toolchains.contains_key("shell"));
    assert_eq!(config.toolchains.len(), 1);
    assert_eq!(config.run_timeout_ms, 7000);
}

#[test]
fn test_load_full_config() {
    let config = load("valid_full.toml").expect("Failed to load config");

    assert_eq!(config.workspace_root(), Path::new("/tmp/codepad-fixture"));
    assert_eq!(config.max_concurrent_jobs, 2);
    assert_eq!(config.max_queued_jobs, 3);
    assert_eq!(config.max_output_bytes, 4096);
    assert_eq!(config.inherit_env, vec!["PATH"]);

    let c = &config.toolchains["c"];
    assert_eq!(config.compile_timeout(c).as_millis(), 12_000);
    assert_eq!(config.run_timeout(c).as_millis(), 2500);
    assert_eq!(c.binary_name(), Some("main"));
}

#[test]
fn test_load_invalid_empty_run_command() {
    assert!(load("invalid_empty_run_command.toml").is_err());
}

#[test]
fn test_load_invalid_binary_without_compile() {
    assert!(load("invalid_binary_without_compile.toml").is_err());
}

#[test]
fn test_load_invalid_zero_concurrency() {
    assert!(load("invalid_zero_concurrency.toml").is_err());
}

#[test]
fn test_load_missing_file() {
    assert!(load("does_not_exist.toml").is_err());
}
