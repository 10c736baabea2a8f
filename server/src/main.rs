use clap::Parser;
use log::info;
use server::network::GameServer;
use std::time::Duration;
use tokio::net::TcpListener;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "5555")]
    port: u16,
    /// Round length in seconds
    #[clap(short, long, default_value_t = shared::DEFAULT_ROUND_SECS)]
    round_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&address).await?;
    let server = GameServer::new(Duration::from_secs(args.round_secs));
    info!(
        "Prime grid server starting on {address} ({}s rounds)",
        args.round_secs
    );

    tokio::select! {
        result = server.run(listener) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
