//! TaskMesh - component runtime with distributed connection management.
//!
//! Main entry point for TaskMesh processes, the stand-alone global
//! manager and the management shell.

mod classes;
mod cli;
mod runtime;
mod shell;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use taskmesh_config::{Config, ConfigLoader, ConfigValidator, GlobalMode, LoggingConfig};
use taskmesh_manager::{DEFAULT_GLOBAL_PROCESS, WaitTimeout};
use taskmesh_protocols::LocalManagerInterface;

use crate::cli::{Cli, Commands};
use crate::runtime::ProcessRuntime;
use crate::shell::{SHELL_COMPONENT, Shell, ShellError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.logging)?;

    for warning in ConfigValidator::validate(&config)?.into_result()? {
        warn!("{}: {}", warning.path, warning.message);
    }

    let runtime = ProcessRuntime::launch(&config).await?;
    let startup_timeout = runtime.lcm().config().management_timeout();
    let result = match cli.command {
        Commands::Gcm { .. } | Commands::Process => run_process(&runtime, startup_timeout).await,
        Commands::Shell {
            file,
            execute,
            wait,
        } => {
            let input = match (execute, file) {
                (Some(commands), _) => ShellInput::Commands(commands),
                (None, Some(path)) => ShellInput::File(path),
                (None, None) => ShellInput::Interactive,
            };
            run_shell(&runtime, startup_timeout, input, WaitTimeout::from_secs_f64(wait)).await
        }
    };

    runtime.shutdown().await;
    result
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".taskmesh").join("config.toml"))
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let path = cli
        .config
        .clone()
        .or_else(|| default_config_path().filter(|path| path.exists()));
    let mut config = match path {
        Some(path) => ConfigLoader::load(&path)?,
        None => Config::default(),
    };

    if let Some(name) = &cli.name {
        config.process.name = name.clone();
    }
    if let Commands::Gcm {
        listen,
        local_listen,
    } = &cli.command
    {
        config.global.mode = GlobalMode::Local;
        config.global.listen = Some(listen.clone());
        config.process.listen = Some(local_listen.clone());
        if cli.name.is_none() {
            config.process.name = DEFAULT_GLOBAL_PROCESS.to_string();
        }
    }
    Ok(config)
}

/// Console logging, plus daily rolling files when `logging.dir` is set.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let file_layer = match &logging.dir {
        Some(dir) => {
            let log_dir = PathBuf::from(ConfigLoader::expand_path(dir));
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&logging.file_prefix)
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // the guard flushes the writer on drop
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(file_layer)
        .init();

    Ok(())
}

async fn run_process(
    runtime: &ProcessRuntime,
    startup_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    runtime.start_all(startup_timeout).await?;
    info!(
        "Process {} running{}, press Ctrl+C to stop",
        runtime.lcm().process(),
        if runtime.hosts_global() { " with the global manager" } else { "" }
    );
    tokio::signal::ctrl_c().await?;
    Ok(())
}

enum ShellInput {
    Commands(String),
    File(PathBuf),
    Interactive,
}

async fn run_shell(
    runtime: &ProcessRuntime,
    startup_timeout: Duration,
    input: ShellInput,
    wait: WaitTimeout,
) -> Result<(), Box<dyn std::error::Error>> {
    runtime.start_all(startup_timeout).await?;

    let lcm = runtime.lcm();
    let shell = Shell::new(lcm.config())?.with_wait_timeout(wait);
    lcm.add_component(shell.component().clone()).await?;
    lcm.connect_services(SHELL_COMPONENT).await?;
    lcm.start_component(SHELL_COMPONENT, 0.0).await?;

    let shell = Arc::new(shell);
    tokio::task::spawn_blocking(move || drive_shell(&shell, input)).await??;
    Ok(())
}

fn drive_shell(shell: &Shell, input: ShellInput) -> std::io::Result<()> {
    match input {
        ShellInput::Commands(commands) => report(shell.execute_line(&commands)),
        ShellInput::File(path) => {
            for line in std::fs::read_to_string(&path)?.lines() {
                report(shell.execute_line(line));
                if shell.is_finished() {
                    break;
                }
            }
        }
        ShellInput::Interactive => {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            loop {
                write!(stdout, "{}", shell.prompt())?;
                stdout.flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                report(shell.execute_line(&line));
                if shell.is_finished() {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn report(outcome: Result<String, ShellError>) {
    match outcome {
        Ok(output) if output.is_empty() => {}
        Ok(output) => println!("{}", output),
        Err(e) => eprintln!("{}", e),
    }
}
