//! Codepad CLI
//!
//! A command-line front end for compiling and running playground code.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codepad::{
    CancelToken, Config, EXAMPLE_CONFIG, JobError, JobReport, JobRequest, JobResponse, JobStatus,
    Runner, ToolchainRegistry,
};
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

/// Job ran (whatever the program did)
const EXIT_OK: u8 = 0;
/// Request was refused: invalid or the runner is overloaded
const EXIT_CLIENT_ERROR: u8 = 1;
/// Internal failure or the program could not be started
const EXIT_INTERNAL_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "codepad")]
#[command(about = "Compile and run playground code in throwaway workspaces")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: codepad.toml)
        #[arg(short, long, default_value = "codepad.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., cpp, python)
        #[arg(short, long)]
        language: String,

        /// File whose contents are piped to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Run timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Read a JSON job request from stdin and write the JSON response to stdout
    Request,

    /// List available languages
    Languages,

    /// Check that every toolchain's programs can be found on PATH
    Check,

    /// Remove workspaces left behind by a crashed process
    Clean,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // Stdout carries program output only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::from_env().context("failed to load configuration")?
    };

    match cli.command {
        Commands::Init { output, force } => {
            init_config(&output, force).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            source,
            language,
            input,
            timeout_ms,
        } => run_file(config, &source, language, input.as_deref(), timeout_ms).await,
        Commands::Request => handle_request(config).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check => Ok(check_toolchains(&config)),
        Commands::Clean => {
            let runner = Runner::new(config);
            let removed = runner.workspaces().sweep().await;
            println!(
                "Removed {removed} stale workspace(s) from '{}'",
                runner.workspaces().root().display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_file(
    mut config: Config,
    source: &Path,
    language: String,
    input: Option<&Path>,
    timeout_ms: Option<u64>,
) -> Result<ExitCode> {
    if let Some(timeout_ms) = timeout_ms {
        anyhow::ensure!(timeout_ms > 0, "--timeout-ms must be greater than zero");
        config.run_timeout_ms = timeout_ms;
    }

    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))?;

    let mut request = JobRequest::new(language, code);
    if let Some(input_path) = input {
        let data = tokio::fs::read_to_string(input_path)
            .await
            .with_context(|| format!("failed to read input file '{}'", input_path.display()))?;
        request = request.with_input(data);
    }

    let runner = Runner::new(config);

    // Ctrl-C kills the compiler or program instead of leaving it behind
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    info!(language = %request.language, "running program");
    let result = runner.submit_with_cancel(request, Some(&cancel)).await;
    runner.flush_history().await;

    match result {
        Ok(report) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(report.output.as_bytes())?;
            if !report.output.ends_with('\n') {
                writeln!(stdout)?;
            }
            stdout.flush()?;

            info!(
                status = %report.status,
                exit_code = ?report.exit_code,
                duration_ms = report.duration.as_millis() as u64,
                "job result"
            );
            Ok(report_exit_code(&report))
        }
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(error_exit_code(&e))
        }
    }
}

async fn handle_request(config: Config) -> Result<ExitCode> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("failed to read request from stdin")?;

    let request: JobRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            let response = JobResponse::Error {
                error: format!("invalid request: {e}"),
            };
            println!("{}", serde_json::to_string(&response)?);
            return Ok(ExitCode::from(EXIT_CLIENT_ERROR));
        }
    };

    let runner = Runner::new(config);
    let result = runner.submit(request).await;
    runner.flush_history().await;

    let code = match result {
        Ok(ref report) => report_exit_code(report),
        Err(ref e) => error_exit_code(e),
    };
    let response = JobResponse::from_result(&result);
    println!("{}", serde_json::to_string(&response)?);

    Ok(code)
}

fn report_exit_code(report: &JobReport) -> ExitCode {
    match report.status {
        JobStatus::RuntimeFailed => ExitCode::from(EXIT_INTERNAL_ERROR),
        _ => ExitCode::from(EXIT_OK),
    }
}

fn error_exit_code(error: &JobError) -> ExitCode {
    if error.is_client_error() {
        ExitCode::from(EXIT_CLIENT_ERROR)
    } else {
        ExitCode::from(EXIT_INTERNAL_ERROR)
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    let registry = ToolchainRegistry::from_config(config);
    for (id, toolchain) in registry.iter() {
        let kind = if toolchain.needs_compile() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, toolchain.name, kind);
    }
}

fn check_toolchains(config: &Config) -> ExitCode {
    let registry = ToolchainRegistry::from_config(config);
    let mut missing = 0;

    for (id, toolchain) in registry.iter() {
        for program in toolchain.programs() {
            match find_program(program) {
                Some(path) => println!("  {:<15} {:<10} {}", id, program, path.display()),
                None => {
                    missing += 1;
                    println!("  {:<15} {:<10} NOT FOUND", id, program);
                }
            }
        }
    }

    if missing == 0 {
        println!("\nAll toolchain programs found");
        ExitCode::SUCCESS
    } else {
        println!("\n{missing} program(s) missing");
        ExitCode::from(EXIT_CLIENT_ERROR)
    }
}

/// Resolve a program the way the executor will, through PATH
fn find_program(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return path.is_file().then_some(path);
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn show_config(config: &Config) {
    println!("Limits:");
    println!("  Max concurrent jobs: {}", config.max_concurrent_jobs);
    println!("  Max queued jobs: {}", config.max_queued_jobs);
    println!("  Run timeout: {} ms", config.run_timeout_ms);
    println!("  Compile timeout: {} ms", config.compile_timeout_ms);
    println!("  Max output: {} bytes per stream", config.max_output_bytes);
    println!("  Max source: {} bytes", config.max_source_bytes);
    println!("  Max input: {} bytes", config.max_input_bytes);
    println!();
    println!("Workspace root: {}", config.workspace_root().display());
    match config.history_path {
        Some(ref path) => println!("History file: {}", path.display()),
        None => println!("History file: (disabled)"),
    }
    println!("Inherited environment: {}", config.inherit_env.join(", "));
    println!();
    println!("Languages configured: {}", config.toolchains.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
