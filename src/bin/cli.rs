//! nimbuscache CLI Client
//!
//! Command-line interface for interacting with a nimbuscache server.

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use nimbuscache::{CacheClient, ClientConfig};

/// nimbuscache CLI
#[derive(Parser, Debug)]
#[command(name = "nimbus-cli")]
#[command(about = "CLI for the nimbuscache distributed cache")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value = "5566")]
    port: u16,

    /// Login username
    #[arg(short, long, default_value = "")]
    username: String,

    /// Login password
    #[arg(short, long, default_value = "")]
    password: String,

    /// Tenant instance name
    #[arg(short, long, default_value = "")]
    instance: String,

    /// Per-call timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Touch a key, extending its sliding expiration
    Refresh {
        /// The key to refresh
        key: String,
    },

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    let config = ClientConfig::builder()
        .host(&args.host)
        .port(args.port)
        .credentials(&args.username, &args.password)
        .instance(&args.instance)
        .query_timeout(Duration::from_secs(args.timeout))
        .reconnect(false)
        .build();

    let client = CacheClient::new(config);

    let outcome = match args.command {
        Commands::Get { key } => client.get(&key).map(|value| {
            match String::from_utf8(value.clone()) {
                Ok(text) if !text.is_empty() => println!("{text}"),
                _ if value.is_empty() => println!("(empty)"),
                _ => println!("{value:?}"),
            }
        }),
        Commands::Set { key, value } => client
            .set(&key, value.into_bytes())
            .map(|()| println!("OK")),
        Commands::Del { key } => client.remove(&key).map(|()| println!("OK")),
        Commands::Refresh { key } => client.refresh(&key).map(|()| println!("OK")),
        Commands::Ping => {
            let started = Instant::now();
            client.ping().map(|()| {
                println!("PONG ({} ms)", started.elapsed().as_millis());
            })
        }
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
