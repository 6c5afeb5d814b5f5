//! Command line entry point for fragrun
//!
//! Serves the HTTP API by default. `run` executes the registered program once
//! and prints its output, `install` provisions the persisted dependency list
//! into the host interpreter.

use anyhow::Result;
use clap::{Parser, Subcommand};
use fragrun_core::config::validation;
use fragrun_core::{ConfigLoader, FileRegistry, FragrunConfig, IsolationMode, Runner};
use fragrun_server::{shutdown_signal, FragrunServer, ServerConfig};
use log::LevelFilter;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "fragrun - register code fragments and run them in a sandbox")]
struct Cli {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(long, short, help = "Path to fragrun.yaml (defaults to ./fragrun.yaml, then ~/.fragrun/fragrun.yaml)")]
    config: Option<String>,

    #[clap(long, help = "Address to listen on, overrides server.bind_addr")]
    bind_addr: Option<String>,

    #[clap(long, short, default_value = "info")]
    log_level: String,

    #[clap(long, help = "Isolation mode: local or container")]
    mode: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API (default command)
    Serve,
    /// Run the registered program once and print its output
    Run,
    /// Install the persisted dependency list into the host interpreter
    Install,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .parse_default_env()
        .init();

    let config = load_config(&cli).await?;
    let store = Arc::new(FileRegistry::new(
        config.storage.functions_path(),
        config.storage.requirements_path(),
    ));
    let runner = Runner::from_config(store, &config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(runner, &config).await,
        Commands::Run => run_once(runner).await,
        Commands::Install => install(runner).await,
    }
}

async fn load_config(cli: &Cli) -> Result<FragrunConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            log::info!("Loading configuration from file: {}", path);
            ConfigLoader::from_file(path).await?
        }
        None => ConfigLoader::discover().await?,
    };

    if let Some(mode) = &cli.mode {
        config.execution.mode = mode.parse::<IsolationMode>()?;
    }
    if let Some(bind_addr) = &cli.bind_addr {
        config.server.bind_addr = bind_addr.clone();
    }
    validation::validate(&config)?;
    Ok(config)
}

async fn serve(runner: Runner, config: &FragrunConfig) -> Result<()> {
    let server_config = ServerConfig::from_settings(&config.server)?.with_logging(true);
    let server = FragrunServer::with_config(runner, server_config);
    log::info!("Starting fragrun server on {}...", server.config().bind_addr);

    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn run_once(runner: Runner) -> Result<()> {
    let result = runner.run_main().await?;
    if result.succeeded() {
        print!("{}", result.output);
        Ok(())
    } else {
        eprintln!("{}: {}", result.status, result.output);
        std::process::exit(1);
    }
}

async fn install(runner: Runner) -> Result<()> {
    let report = runner.install_dependencies().await;
    if report.succeeded {
        println!("{}", report.message);
        Ok(())
    } else {
        eprintln!("{}", report.message);
        std::process::exit(1);
    }
}
