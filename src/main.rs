//! keigo daemon binary.
//!
//! Bridges compose-surface clients (one TCP connection per surface, line
//! JSON) to the local tone analysis service (one shared persistent
//! socket). Run it next to the service:
//!
//! ```bash
//! keigo                                  # defaults
//! keigo --service-addr 127.0.0.1:37100 --listen-addr 127.0.0.1:37110
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use keigo_engine::Engine;
use keigo_relay::constants::DEFAULT_SERVICE_ADDR;
use keigo_relay::spawn_relay;

mod daemon;

use daemon::Daemon;

/// Where the daemon listens for UI connections by default.
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:37110";

#[derive(Parser, Debug)]
#[command(name = "keigo", about = "Tone analysis relay daemon")]
struct Args {
    /// Address of the tone analysis service.
    #[arg(long, default_value = DEFAULT_SERVICE_ADDR)]
    service_addr: String,

    /// Address to accept compose-surface connections on.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    listen_addr: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let relay = spawn_relay(args.service_addr.clone());
    let engine = Engine::new(Arc::new(relay.clone()));
    engine.attach_relay(&relay);

    let listener = match TcpListener::bind(&args.listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %args.listen_addr, %err, "failed to bind listen address");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        listen = %args.listen_addr,
        service = %args.service_addr,
        "keigo daemon up"
    );

    if let Err(err) = Daemon::new(engine).run(listener).await {
        tracing::error!(%err, "daemon error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
