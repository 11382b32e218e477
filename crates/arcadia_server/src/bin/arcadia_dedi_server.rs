//! The dedicated server binary: parses CLI options, connects to the
//! database, starts the Hub and TCP listener, and drives a small admin
//! console on stdin (§10, grounded on the teacher's
//! `gs_common::dedicated_server::run_dedicated_server`).

use std::sync::Arc;

use anyhow::Result;
use arcadia_server::client::handle_connection;
use arcadia_server::config::{CliOptions, ServerConfig};
use arcadia_server::hub::Hub;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliOptions::parse();

    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(&cli.log_level)).init();

    let config = ServerConfig::from(&cli);

    let pool = arcadia_server::db::connect(&config.database_url).await?;
    let hub = Hub::new(pool, config.region_capacity);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "listening for connections");

    tokio::spawn(run_accept_loop(listener, hub.clone()));

    run_admin_console(hub).await
}

async fn run_accept_loop(listener: TcpListener, hub: Arc<Hub>) {
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                if let Err(err) = socket.set_nodelay(true) {
                    warn!(%addr, error = %err, "failed to set TCP_NODELAY");
                }
                tokio::spawn(handle_connection(socket, addr, hub.clone()));
            }
            Err(err) => {
                error!(error = %err, "failed to accept connection");
            }
        }
    }
}

/// A blocking `rustyline` prompt, run on a dedicated blocking thread so it
/// never stalls the async runtime's reactor (§10; teacher's console loop in
/// `gs_common::dedicated_server::run_dedicated_server` is adapted the same
/// way since it doesn't need to share a runtime with an accept loop).
async fn run_admin_console(hub: Arc<Hub>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let Ok(mut rl) = DefaultEditor::new() else {
            info!("no interactive terminal detected, running headless");
            loop {
                std::thread::park();
            }
        };

        loop {
            match rl.readline("arcadia> ") {
                Ok(line) => {
                    let cmd = line.split_whitespace().next().unwrap_or("");
                    match cmd {
                        "" => continue,
                        "quit" | "stop" | "exit" => {
                            info!("shutting down on operator command");
                            break;
                        }
                        "status" => {
                            info!(logged_in_accounts = hub.connected_accounts(), "status");
                        }
                        _ => error!("unknown command {cmd}"),
                    }
                }
                Err(ReadlineError::Eof) => {
                    info!("stdin EOF reached");
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    info!("interrupt signal received");
                    break;
                }
                Err(ReadlineError::WindowResized) => continue,
                Err(err) => {
                    error!(error = %err, "error reading admin console input");
                    break;
                }
            }
        }
    })
    .await?;

    Ok(())
}
