//! nimbuscache Server Binary
//!
//! Starts the TCP cache server.

use clap::Parser;
use nimbuscache::{CacheServer, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// nimbuscache Server
#[derive(Parser, Debug)]
#[command(name = "nimbus-server")]
#[command(about = "Distributed in-memory cache server")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:5566")]
    listen: String,

    /// Require a valid username/password pair at login
    #[arg(long)]
    use_credentials: bool,

    /// Accepted credentials as "user:pass;user:pass"
    #[arg(long, default_value = "")]
    credentials: String,

    /// Log every request instead of sampled summaries
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.debug {
        "info,nimbuscache=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("nimbuscache Server v{}", nimbuscache::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    let mut builder = ServerConfig::builder()
        .listen_addr(&args.listen)
        .use_credentials(args.use_credentials)
        .debug(args.debug);

    // Credentials arrive as "user:pass;user:pass"
    for pair in args.credentials.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        match pair.split_once(':') {
            Some((username, password)) => {
                builder = builder.credential(username.trim(), password.trim());
            }
            None => {
                tracing::error!("malformed credential entry: {:?}", pair);
                std::process::exit(1);
            }
        }
    }

    let server = CacheServer::with_memory_store(builder.build());
    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
