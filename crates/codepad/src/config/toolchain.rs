use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;
use crate::config::transform::SourceTransform;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Declarative compile/run pipeline for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolchain {
    /// Human-readable name for the language (e.g., "C++ (G++)")
    pub name: String,

    /// File extension of the source file
    pub extension: FileExtension,

    /// Source rewrite applied before compilation
    #[serde(default)]
    pub transform: Option<SourceTransform>,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

/// Values substituted into command templates
#[derive(Debug, Clone, Copy)]
pub struct Placeholders<'a> {
    pub source: &'a str,
    pub binary: &'a str,
    pub workspace: &'a str,
    pub class: &'a str,
}

impl Toolchain {
    /// Check if the language has a compile phase
    pub fn needs_compile(&self) -> bool {
        self.compile.is_some()
    }

    /// Entry point name produced by the source transform
    pub fn entry_point(&self) -> Option<&str> {
        self.transform.as_ref().map(SourceTransform::entry_point)
    }

    /// Get the source file name for this language
    ///
    /// Toolchains with a transform name the file after the entry point, since
    /// compilers like javac require the file and public class to match.
    pub fn source_name(&self) -> String {
        match self.entry_point() {
            Some(entry) => format!("{entry}.{}", self.extension),
            None => format!("main.{}", self.extension),
        }
    }

    /// Name of the compiled binary, if the compile step produces one
    pub fn binary_name(&self) -> Option<&str> {
        self.compile
            .as_ref()
            .and_then(|compile| compile.binary.as_deref())
    }

    /// Expanded compile argv, or None for interpreted languages
    pub fn compile_command(&self, placeholders: &Placeholders<'_>) -> Option<Vec<String>> {
        self.compile
            .as_ref()
            .map(|compile| Self::expand_command(&compile.command, placeholders))
    }

    /// Expanded run argv
    pub fn run_command(&self, placeholders: &Placeholders<'_>) -> Vec<String> {
        Self::expand_command(&self.run.command, placeholders)
    }

    /// Programs this toolchain invokes, in pipeline order
    pub fn programs(&self) -> Vec<&str> {
        let compile = self
            .compile
            .as_ref()
            .and_then(|compile| compile.command.first());
        compile
            .into_iter()
            .chain(self.run.command.first())
            .map(String::as_str)
            .filter(|program| !program.contains('{'))
            .collect()
    }

    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], placeholders: &Placeholders<'_>) -> Vec<String> {
        command
            .iter()
            .map(|arg| expand(arg, placeholders))
            .collect()
    }

    /// Expand placeholders in `KEY=VALUE` environment entries
    pub fn expand_env(env: &[String], placeholders: &Placeholders<'_>) -> Vec<(String, String)> {
        env.iter()
            .filter_map(|entry| entry.split_once('='))
            .map(|(key, value)| (key.to_owned(), expand(value, placeholders)))
            .collect()
    }
}

fn expand(arg: &str, placeholders: &Placeholders<'_>) -> String {
    arg.replace("{source}", placeholders.source)
        .replace("{binary}", placeholders.binary)
        .replace("{workspace}", placeholders.workspace)
        .replace("{class}", placeholders.class)
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    pub command: Vec<String>,

    /// Output binary name (e.g., "main"); None when the compiler writes
    /// class files instead of an executable
    #[serde(default)]
    pub binary: Option<String>,

    /// Environment entries (`KEY=VALUE`) set during compilation
    #[serde(default)]
    pub env: Vec<String>,

    /// Wall clock limit in milliseconds (overrides `compile_timeout_ms`)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    pub command: Vec<String>,

    /// Environment entries (`KEY=VALUE`) set for the program
    #[serde(default)]
    pub env: Vec<String>,

    /// Wall clock limit in milliseconds (overrides `run_timeout_ms`)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}
