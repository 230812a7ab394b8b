mod config;
mod http_server;
mod mcp_server;
mod wiring;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rmcp::{transport::stdio, ServiceExt};

#[derive(Parser)]
#[command(name = "memsys", about = "Persistent memory service for agent conversations")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "memsys.toml")]
    config: PathBuf,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio transport
    Serve,

    /// Start the HTTP API server
    Http,

    /// Run the background orphan sweep once and exit
    Sweep,

    /// Print component health and lifetime counters
    Status,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = config::Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let orchestrator = Arc::new(
        wiring::build_orchestrator(&config)
            .await
            .context("wiring orchestrator")?,
    );
    orchestrator.start().await;

    let result = match cli.command {
        Commands::Serve => cmd_serve(orchestrator.clone()).await,
        Commands::Http => cmd_http(orchestrator.clone(), &config).await,
        Commands::Sweep => cmd_sweep(orchestrator.clone()).await,
        Commands::Status => cmd_status(orchestrator.clone()).await,
    };

    orchestrator.stop().await;
    result
}

// ---------------------------------------------------------------------------
// Advisory pidfile for observability
// ---------------------------------------------------------------------------

fn pidfile_path() -> PathBuf {
    std::env::var("MEMSYS_DATA_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("memsys-serve.pid")
}

/// Check for an existing pidfile and log accordingly, then write our own.
fn acquire_pidfile() -> Option<PathBuf> {
    let path = pidfile_path();
    if let Ok(content) = std::fs::read_to_string(&path)
        && let Ok(pid) = content.trim().parse::<u32>()
    {
        if is_process_alive(pid) {
            tracing::warn!("another memsys serve (PID {pid}) is running — coexisting with the pool's busy_timeout");
        } else {
            tracing::info!("cleaned up stale pidfile (PID {pid} is dead)");
            let _ = std::fs::remove_file(&path);
        }
    }

    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::File::create(&path) {
        Ok(mut f) => {
            let _ = write!(f, "{}", std::process::id());
            tracing::info!("wrote pidfile: {}", path.display());
            Some(path)
        }
        Err(e) => {
            tracing::warn!("failed to write pidfile: {e}");
            None
        }
    }
}

fn release_pidfile(path: &std::path::Path) {
    let _ = std::fs::remove_file(path);
    tracing::info!("removed pidfile: {}", path.display());
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // kill(pid, 0) checks existence without sending a signal
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    false // conservative: assume dead on non-unix
}

async fn cmd_serve(orchestrator: Arc<memsys_core::Orchestrator>) -> Result<()> {
    tracing::info!("starting MCP server on stdio");
    let pidfile = acquire_pidfile();

    let server = mcp_server::MemoryServer::new(orchestrator);
    let service = server
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;
    service.waiting().await?;

    if let Some(path) = pidfile {
        release_pidfile(&path);
    }
    Ok(())
}

async fn cmd_http(orchestrator: Arc<memsys_core::Orchestrator>, config: &config::Config) -> Result<()> {
    tracing::info!("starting HTTP server on {}", config.http.bind);
    let pidfile = acquire_pidfile();

    http_server::serve(orchestrator, &config.http.bind)
        .await
        .context("HTTP server exited with an error")?;

    if let Some(path) = pidfile {
        release_pidfile(&path);
    }
    Ok(())
}

async fn cmd_sweep(orchestrator: Arc<memsys_core::Orchestrator>) -> Result<()> {
    let fixed = orchestrator.sweep_orphans().await?;
    println!("re-indexed {fixed} orphaned memory unit(s)");
    Ok(())
}

async fn cmd_status(orchestrator: Arc<memsys_core::Orchestrator>) -> Result<()> {
    let status = orchestrator.status().await;
    println!("uptime_s:               {}", status.uptime_s);
    println!("conversations_processed: {}", status.conversations_processed);
    println!("memories_created:        {}", status.memories_created);
    println!("searches:                {}", status.searches);
    println!("injections:              {}", status.injections);
    for (name, health) in status.component_health {
        println!(
            "component {name}: {:?}{}",
            health.state,
            health
                .detail
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}
