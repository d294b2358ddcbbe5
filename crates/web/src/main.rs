use std::net::SocketAddr;

use clap::Parser;
use tracing::info;

use hello_web::config::{ResponderConfig, DEFAULT_ADDR};

/// Minimal web responder: every request gets the Hello World page
#[derive(Parser, Debug)]
#[command(name = "hello-web")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "HELLO_WEB_ADDR", default_value_t = DEFAULT_ADDR)]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = ResponderConfig { addr: args.addr };

    info!("Starting hello-web on http://{}", cfg.addr);

    hello_web::serve(cfg).await
}
