//! Configuration file loading for Codepad
//!
//! Handles loading and parsing configuration files using the config crate.
//! Values from `CODEPAD_*` environment variables take precedence over files.

use std::path::Path;

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config as RawConfig, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, Toolchain};

impl Config {
    /// Load configuration from a file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        Self::build(
            RawConfig::builder()
                .add_source(File::from(path))
                .add_source(environment()),
        )
    }

    /// Load the embedded default configuration, then apply environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::build(
            RawConfig::builder()
                .add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml))
                .add_source(environment()),
        )
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        Self::build(RawConfig::builder().add_source(File::from_str(content, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_jobs must be at least 1".to_owned(),
            ));
        }
        if self.run_timeout_ms == 0 || self.compile_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "timeouts must be greater than zero".to_owned(),
            ));
        }

        for (id, toolchain) in &self.toolchains {
            validate_toolchain(id, toolchain)?;
        }

        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("inherit_env")
}

fn validate_toolchain(id: &str, toolchain: &Toolchain) -> Result<(), ConfigError> {
    let invalid = |reason: &str| -> Result<(), ConfigError> {
        Err(ConfigError::Invalid(format!("toolchain '{id}' {reason}")))
    };

    if toolchain.name.is_empty() {
        return invalid("has empty name");
    }
    if toolchain.extension.is_empty() {
        return invalid("has empty extension");
    }
    if toolchain.run.command.is_empty() {
        return invalid("has empty run command");
    }

    let mut commands = vec![&toolchain.run.command];
    let mut env = vec![&toolchain.run.env];
    if let Some(ref compile) = toolchain.compile {
        if compile.command.is_empty() {
            return invalid("has empty compile command");
        }
        if compile.binary.as_deref().is_some_and(str::is_empty) {
            return invalid("has empty binary name");
        }
        commands.push(&compile.command);
        env.push(&compile.env);
    }

    let uses = |placeholder: &str| {
        commands
            .iter()
            .flat_map(|command| command.iter())
            .any(|arg| arg.contains(placeholder))
    };
    if uses("{binary}") && toolchain.binary_name().is_none() {
        return invalid("uses {binary} but its compile step declares no binary");
    }
    if uses("{class}") && toolchain.transform.is_none() {
        return invalid("uses {class} but declares no source transform");
    }

    let malformed = env
        .iter()
        .flat_map(|entries| entries.iter())
        .find(|entry| !matches!(entry.split_once('='), Some((key, _)) if !key.is_empty()));
    if let Some(entry) = malformed {
        return invalid(&format!("has malformed env entry '{entry}', expected KEY=VALUE"));
    }

    Ok(())
}
