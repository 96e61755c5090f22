//! command-gate CLI
//!
//! `hook` is the agent-facing entry point: one tool invocation as JSON on
//! stdin, one response as JSON on stdout. The other subcommands are for
//! inspecting the gate by hand.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use command_gate::gate::{hook, CommandGate, GateConfig, GateResult, HookResponse};
use command_gate::platform_dirs;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "command-gate",
    about = "Pre-execution security gate for agent shell commands",
    version
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a single command
    Check {
        /// Command to validate; multiple words are joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Project directory (defaults to the current directory)
        #[arg(long)]
        project_dir: Option<PathBuf>,
    },

    /// List the permitted commands for a project
    List {
        /// Project directory (defaults to the current directory)
        dir: Option<PathBuf>,
    },

    /// Answer one pre-tool-use hook invocation read from stdin
    Hook,

    /// Print the effective configuration as TOML
    Config,
}

/// Install the subscriber; hook mode logs to a daily file because stdout
/// carries the response
fn initialize_tracing(config: &GateConfig, to_file: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if to_file {
        let log_dir = platform_dirs::logs_dir().ok()?;
        platform_dirs::ensure_dir(&log_dir).ok()?;

        let appender = tracing_appender::rolling::daily(log_dir, "command-gate.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(false)
            .init();
        None
    }
}

fn current_dir_or(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("Unable to determine current directory"),
    }
}

/// Hook mode always prints a response; every failure becomes a block
async fn run_hook(loaded: GateResult<GateConfig>) -> Result<()> {
    let mut input = String::new();
    let response = match io::stdin().read_to_string(&mut input) {
        Ok(_) => hook::answer(loaded, &input).await,
        Err(e) => {
            error!(error = %e, "failed to read hook input");
            HookResponse::block(format!("Failed to read hook input: {}", e))
        }
    };

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = GateConfig::load_or_default(cli.config.as_deref());

    let command = match cli.command {
        Command::Hook => {
            let fallback = GateConfig::default();
            let logging = loaded.as_ref().unwrap_or(&fallback);
            let _guard = initialize_tracing(logging, true);
            return run_hook(loaded).await;
        }
        command => command,
    };

    let config = loaded.context("Failed to load configuration")?;
    let _guard = initialize_tracing(&config, false);

    match command {
        Command::Check {
            command,
            project_dir,
        } => {
            let command = command.join(" ");
            let project_dir = current_dir_or(project_dir)?;
            let gate = CommandGate::from_config(&config);

            let (allowed, reason) = gate.validate_command(&command, Some(&project_dir));
            if allowed {
                println!("ALLOWED: {}", command);
            } else {
                println!("BLOCKED: {}", command);
                println!("  Reason: {}", reason);
                std::process::exit(1);
            }
        }
        Command::List { dir } => {
            let project_dir = current_dir_or(dir)?;
            let gate = CommandGate::from_config(&config);
            let allowed = gate
                .allowed_commands(&project_dir)
                .with_context(|| format!("Failed to analyze {}", project_dir.display()))?;

            println!("\nAllowed commands:");
            for command in &allowed {
                println!("  {}", command);
            }
            println!("\nTotal: {} commands", allowed.len());
        }
        Command::Hook => {}
        Command::Config => print!("{}", config.to_toml()?),
    }

    Ok(())
}
