//! Entry point for `udp-file-transfer`.
//!
//! Parses CLI arguments and dispatches into server mode or one of the client
//! commands.  All protocol work is delegated to library modules; `main.rs`
//! owns only process setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use udp_file_transfer::client::Client;
use udp_file_transfer::config::{ServerConfig, WindowConfig, DEFAULT_BIND, DEFAULT_WINDOW};
use udp_file_transfer::server::Server;
use udp_file_transfer::simulator::{Simulator, SimulatorConfig};
use udp_file_transfer::socket::{Socket, Transport};

/// Reliable file upload and remote deletion over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct WindowArgs {
    /// Maximum chunks in flight (must match on both ends).
    #[arg(long, default_value_t = DEFAULT_WINDOW)]
    window: usize,
    /// Milliseconds to wait for an acknowledgment before retransmitting.
    #[arg(long, default_value_t = 2000)]
    ack_timeout_ms: u64,
}

impl WindowArgs {
    fn config(&self) -> WindowConfig {
        WindowConfig {
            capacity: self.window.max(1),
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
        }
    }
}

#[derive(Subcommand)]
enum Mode {
    /// Receive uploads and serve delete requests until END_SESSION.
    Server {
        /// Local address to bind.
        #[arg(short, long, default_value = DEFAULT_BIND)]
        bind: SocketAddr,
        /// Directory all uploads and deletions are confined to.
        #[arg(short, long, env = "UFT_ROOT")]
        root: PathBuf,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Upload one or more files.
    Upload {
        /// Remote server address (e.g. 127.0.0.1:9000).
        #[arg(short, long, env = "UFT_SERVER")]
        server: SocketAddr,
        /// Destination folder under the server root.
        #[arg(short, long, default_value = "")]
        folder: String,
        /// Drop this fraction of outgoing datagrams (fault injection).
        #[arg(long, default_value_t = 0.0)]
        loss_rate: f64,
        /// Seed for the fault-injection RNG.
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[command(flatten)]
        window: WindowArgs,
        /// Files to send.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Delete a file (or, with --folder, a folder) under the server root.
    Delete {
        #[arg(short, long, env = "UFT_SERVER")]
        server: SocketAddr,
        /// Treat PATH as a folder and delete it recursively.
        #[arg(long)]
        folder: bool,
        path: String,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Tell the server to shut down.
    EndSession {
        #[arg(short, long, env = "UFT_SERVER")]
        server: SocketAddr,
    },
}

async fn client_socket() -> Result<Socket> {
    let any: SocketAddr = "0.0.0.0:0".parse()?;
    Socket::bind(any).await.context("failed to bind client socket")
}

async fn upload_all<T: Transport>(client: &Client<T>, folder: &str, files: &[PathBuf]) -> Result<()> {
    for file in files {
        let report = client
            .upload(file, folder)
            .await
            .with_context(|| format!("upload of {} failed", file.display()))?;
        println!(
            "{}: {} bytes in {} chunk(s), {} retransmission burst(s)",
            file.display(),
            report.bytes,
            report.chunks,
            report.retransmit_bursts
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Server { bind, root, window } => {
            let mut config = ServerConfig::new(bind, root);
            config.window = window.config();
            let mut server = Server::bind(config)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;

            tokio::select! {
                result = server.serve() => result.context("server stopped")?,
                signal = tokio::signal::ctrl_c() => {
                    signal.context("failed to listen for ctrl-c")?;
                    log::info!("Interrupted; shutting down server");
                }
            }
        }
        Mode::Upload {
            server,
            folder,
            loss_rate,
            seed,
            window,
            files,
        } => {
            let socket = client_socket().await?;
            if loss_rate > 0.0 {
                let sim = Simulator::new(
                    socket,
                    SimulatorConfig {
                        loss_rate,
                        seed,
                        ..Default::default()
                    },
                );
                let client = Client::with_config(sim, server, window.config());
                upload_all(&client, &folder, &files).await?;
                log::info!("Simulator: {:?}", client.transport().stats());
            } else {
                let client = Client::with_config(socket, server, window.config());
                upload_all(&client, &folder, &files).await?;
            }
        }
        Mode::Delete {
            server,
            folder,
            path,
            window,
        } => {
            let client = Client::with_config(client_socket().await?, server, window.config());
            let status = if folder {
                client.delete_folder(&path).await
            } else {
                client.delete_file(&path).await
            }
            .with_context(|| format!("delete of '{path}' failed"))?;
            println!("{status}");
        }
        Mode::EndSession { server } => {
            let client = Client::new(client_socket().await?, server);
            client.end_session().await?;
        }
    }

    Ok(())
}
