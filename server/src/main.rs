use clap::Parser;
use log::{error, info};
use server::config::EngineConfig;
use server::content::BuiltinContent;
use server::network::{NetResult, Server};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Participants allowed per session (the host is not counted)
    #[arg(short = 'm', long, default_value = "12")]
    max_players: usize,

    /// Seconds a disconnected player keeps their seat
    #[arg(long, default_value = "60")]
    grace_secs: u64,

    /// Seconds without any update before a session expires
    #[arg(long, default_value = "1800")]
    idle_ttl_secs: u64,

    /// Seconds of silence before a connection counts as dropped
    #[arg(long, default_value = "10")]
    heartbeat_secs: u64,

    /// Concurrent connections accepted by the socket
    #[arg(long, default_value = "1024")]
    max_connections: usize,

    /// Fixed seed for role and content selection
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> NetResult<()> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = EngineConfig {
        max_players: args.max_players,
        grace_period: Duration::from_secs(args.grace_secs),
        idle_ttl: Duration::from_secs(args.idle_ttl_secs),
        heartbeat_timeout: Duration::from_secs(args.heartbeat_secs),
        max_connections: args.max_connections,
        rng_seed: args.seed,
        ..Default::default()
    };

    info!("Starting session server...");
    info!(
        "Max {} players per session, {}s grace, {}s idle expiry",
        args.max_players, args.grace_secs, args.idle_ttl_secs
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, Arc::new(BuiltinContent)).await?;

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down");
                shutdown.shutdown();
            }
            Err(e) => error!("Could not listen for Ctrl+C: {}", e),
        }
    });

    server.run().await
}
