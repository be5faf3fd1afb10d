//! coderun CLI
//!
//! Command-line interface for running programs, checking modules and
//! inspecting the local setup.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use coderun::config::{config_path, save_config, validate_config, Config, LogConfig};
use coderun::runner::{
    ExecutionMode, ExecutionRequest, InterpreterLocator, RunnerService, StreamEvent,
};
use coderun::VERSION;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "coderun",
    version = VERSION,
    about = "coderun - run submitted programs under a local interpreter",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Address to bind to
        #[arg(long, env = "CODERUN_BIND")]
        bind: Option<String>,
        /// Port to listen on
        #[arg(long, short, env = "CODERUN_PORT")]
        port: Option<u16>,
    },

    /// Run a source file
    Run {
        /// File to execute
        file: PathBuf,
        /// Session id (minted when omitted)
        #[arg(long, short)]
        session: Option<String>,
        /// Stream output and forward terminal input to the program
        #[arg(long, short)]
        interactive: bool,
    },

    /// Check whether modules can be imported
    Check {
        /// Module names
        #[arg(required = true)]
        modules: Vec<String>,
    },

    /// Probe interpreters and validate the configuration
    Doctor,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command {
        Commands::Serve { bind, port } => serve(config, bind, port).await,
        Commands::Run {
            file,
            session,
            interactive,
        } => {
            quiet_logging();
            run_file(config, &file, session, interactive).await
        }
        Commands::Check { modules } => {
            quiet_logging();
            check_modules(config, &modules).await
        }
        Commands::Doctor => {
            quiet_logging();
            doctor(config).await
        }
        Commands::InitConfig { force } => init_config(force),
    }
}

fn quiet_logging() {
    coderun::logging::init(&LogConfig {
        level: "warn".to_string(),
        ..LogConfig::default()
    });
}

// ============================================================================
// Serve
// ============================================================================

async fn serve(mut config: Config, bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(bind) = bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    coderun::logging::init(&config.log);

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        tracing::warn!("{}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            eprintln!("{} {}", style("✗").red(), issue);
        }
        bail!("invalid configuration");
    }

    coderun::gateway::serve(config).await?;
    Ok(())
}

// ============================================================================
// Run
// ============================================================================

async fn run_file(
    config: Config,
    file: &Path,
    session: Option<String>,
    interactive: bool,
) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mode = if interactive {
        ExecutionMode::Interactive
    } else {
        ExecutionMode::OneShot
    };
    let mut request = ExecutionRequest::new(source, mode);
    request.session_id = session;

    let service = RunnerService::new(config.runner);
    let code = match mode {
        ExecutionMode::OneShot => run_one_shot(&service, request).await?,
        ExecutionMode::Interactive => run_interactive(&service, request).await?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run_one_shot(service: &RunnerService, request: ExecutionRequest) -> anyhow::Result<i32> {
    let result = service.run_once(request).await?;

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    if !result.success && !result.error.is_empty() {
        eprintln!("{}", style(result.error.trim_end()).red());
    }
    for module in &result.missing_modules {
        eprintln!("{} missing module: {}", style("⚠").yellow(), module);
    }
    if let Some(hint) = &result.hint {
        eprintln!("{} {}", style("hint:").yellow().bold(), hint);
    }
    eprintln!(
        "{}",
        style(format!("session {} · exit code {}", result.session_id, result.exit_code)).dim()
    );

    Ok(result.exit_code)
}

async fn run_interactive(service: &RunnerService, request: ExecutionRequest) -> anyhow::Result<i32> {
    let mut events = service.run_interactive(request).await?;
    let session_id = events.session_id().to_string();

    let forwarder = {
        let service = service.clone();
        let session_id = session_id.clone();
        let mut lines = spawn_line_reader(BufReader::new(std::io::stdin()));
        tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                if let Err(e) = service.deliver_input(&session_id, &line).await {
                    eprintln!("{} {}", style("✗").red(), e);
                    break;
                }
            }
        })
    };

    let mut code = -1;
    while let Some(event) = events.recv().await {
        match event {
            StreamEvent::Start { session_id } => {
                eprintln!("{}", style(format!("session {}", session_id)).dim());
            }
            StreamEvent::Output { data } => {
                print!("{}", data);
                std::io::stdout().flush().ok();
            }
            StreamEvent::Error { data } => {
                eprint!("{}", style(data).red());
            }
            StreamEvent::InputRequest { .. } => {}
            StreamEvent::Exit { code: exit } => {
                code = exit;
                eprintln!("{}", style(format!("exit code {}", exit)).dim());
            }
        }
    }

    forwarder.abort();
    Ok(code)
}

/// Read lines from `reader` on a plain thread
///
/// A blocked terminal read cannot be cancelled. Runtime shutdown does not
/// wait for this thread, so the CLI exits as soon as the program does.
fn spawn_line_reader<R: BufRead + Send + 'static>(reader: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

// ============================================================================
// Check and doctor
// ============================================================================

async fn check_modules(config: Config, modules: &[String]) -> anyhow::Result<()> {
    let service = RunnerService::new(config.runner);
    let results = service.check_modules(modules).await;

    let width = results.keys().map(|name| name.len()).max().unwrap_or(0);
    let mut missing = 0;
    for (name, status) in &results {
        if status.installed {
            println!("  {} {:width$}", style("✓").green(), name, width = width);
        } else {
            missing += 1;
            println!(
                "  {} {:width$}  {}",
                style("✗").red(),
                name,
                style(status.error.as_deref().unwrap_or("not installed")).dim(),
                width = width
            );
        }
    }

    if missing > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn doctor(config: Config) -> anyhow::Result<()> {
    println!("\n{}", style("Interpreters").cyan().bold());
    let locator = InterpreterLocator::new(&config.runner);
    let mut any = false;
    for candidate in locator.candidates() {
        if locator.probe(candidate).await {
            any = true;
            println!("  {} {}", style("✓").green(), candidate);
        } else {
            println!("  {} {}", style("✗").red(), candidate);
        }
    }
    if !any {
        println!(
            "  {} no candidate works; runs will fall back to '{}'",
            style("⚠").yellow(),
            config.runner.fallback_interpreter
        );
    }

    println!("\n{}", style("Configuration").cyan().bold());
    let path = config_path();
    if path.exists() {
        println!("  file: {}", path.display());
    } else {
        println!("  file: {} {}", path.display(), style("(not found, using defaults)").dim());
    }
    println!("  artifacts: {}", config.runner.artifact_dir.display());
    println!("  gateway: {}:{}", config.gateway.bind, config.gateway.port);

    let validation = validate_config(&config);
    for issue in &validation.errors {
        println!("  {} {}", style("✗").red(), issue);
    }
    for issue in &validation.warnings {
        println!("  {} {}", style("⚠").yellow(), issue);
    }
    if validation.valid && validation.warnings.is_empty() {
        println!("  {} configuration is valid", style("✓").green());
    }
    println!();

    if !any || !validation.valid {
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Init config
// ============================================================================

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = config_path();
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    save_config(&Config::default(), &path)?;
    println!("{} Wrote default configuration to {}", style("✓").green(), path.display());
    Ok(())
}
