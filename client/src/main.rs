use clap::Parser;
use client::network::{Client, Identity};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Stable player id used to reclaim a seat after reconnecting
    #[arg(short = 'i', long)]
    player_id: String,

    /// Display name
    #[arg(short = 'n', long)]
    name: String,

    /// Optional avatar URL
    #[arg(long)]
    avatar_url: Option<String>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Seconds between heartbeats
    #[arg(long, default_value = "2")]
    heartbeat_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let identity = Identity {
        player_id: args.player_id,
        name: args.name,
        avatar_url: args.avatar_url,
    };
    let mut client = Client::new(
        &args.server,
        identity,
        args.fake_ping,
        Duration::from_secs(args.heartbeat_secs.max(1)),
    )
    .await?;

    client.run().await?;

    Ok(())
}
