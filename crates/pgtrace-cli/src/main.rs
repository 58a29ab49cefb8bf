use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use pgtrace_core::PgTraceConfig;
use pgtrace_proxy::TraceProxy;

#[derive(Parser, Debug)]
#[command(
    name = "pgtrace",
    version,
    about = "Transparent PostgreSQL wire protocol tracing proxy"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy until interrupted.
    Serve {
        /// Path to the configuration file.
        #[arg(long, short, default_value = "pgtrace.yaml")]
        config: PathBuf,
    },

    /// Validate a configuration file and print the effective settings.
    Check {
        /// Path to the configuration file.
        #[arg(long, short, default_value = "pgtrace.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Serve { config } => run_serve(&config).await?,
        Command::Check { config } => run_check(&config)?,
    }

    Ok(())
}

async fn run_serve(config_path: &Path) -> anyhow::Result<()> {
    let config = PgTraceConfig::from_file(config_path)?;
    let proxy = TraceProxy::new(config)?;

    tokio::select! {
        result = proxy.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }

    Ok(())
}

fn run_check(config_path: &Path) -> anyhow::Result<()> {
    let config = PgTraceConfig::from_file(config_path)?;

    println!("Configuration OK: {}", config_path.display());
    println!(
        "  listen:          {}:{}",
        config.proxy.listen_addr, config.proxy.listen_port
    );
    println!("  upstream:        {}", config.upstream.address());
    println!("  capture output:  {}", config.capture.output.display());
    println!("  output sockets:  {}", config.capture.output_sockets);
    println!("  buffer size:     {} bytes", config.proxy.buffer_size);
    println!("  max connections: {}", config.proxy.max_connections);
    if config.capture.save_traffic {
        println!(
            "  traffic dumps:   {}",
            config.capture.traffic_dir.display()
        );
    }

    Ok(())
}
