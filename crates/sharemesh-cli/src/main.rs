//! sharemesh CLI: run a server or talk to one.

mod cli;
mod client;

use crate::cli::{Cli, Commands, ServeArgs};
use clap::Parser;
use sharemesh_server::Server;
use sharemesh_types::ServerConfig;
use tracing::info;

fn init_tracing_stderr(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let result = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(async {
            match cli.command {
                Commands::Serve(args) => cmd_serve(args, cli.debug).await,
                Commands::Client(args) => {
                    init_tracing_stderr(cli.debug);
                    client::run(args).await
                }
            }
        }),
        Err(e) => Err(anyhow::Error::new(e).context("Failed to create Tokio runtime")),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn cmd_serve(args: ServeArgs, debug: bool) -> anyhow::Result<()> {
    let mut config = ServerConfig::load(args.config.as_deref());
    args.apply(&mut config);
    config.debug |= debug;
    init_tracing_stderr(config.debug);

    let server = Server::start(config).await?;
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.shutdown();
    Ok(())
}
