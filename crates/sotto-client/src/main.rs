//! Sotto terminal client binary.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local hub
//! sotto --name ada
//!
//! # Connect to a remote hub with a dedicated key directory
//! sotto --addr chat.example.com:7878 --name ada --key-dir ~/.sotto/ada
//! ```
//!
//! Lines typed on stdin are sent to the hub; messages from the hub are
//! printed to stdout as they arrive.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use sotto_client::Connection;
use sotto_crypto::{DEFAULT_RSA_BITS, KeyRegistry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sotto encrypted chat client
#[derive(Parser, Debug)]
#[command(name = "sotto")]
#[command(about = "Sotto encrypted group chat client")]
#[command(version)]
struct Args {
    /// Hub address to connect to
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    addr: String,

    /// Display name sent to the hub
    #[arg(short, long)]
    name: String,

    /// Directory holding this client's RSA keypair
    #[arg(long, default_value = ".sotto/client-keys")]
    key_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let registry = KeyRegistry::new(&args.key_dir);
    let keys = registry.load_or_generate(DEFAULT_RSA_BITS)?;

    let connection = Connection::connect(&args.addr, &args.name, keys).await?;
    println!("connected to {} as {}", args.addr, args.name);

    let (mut send, mut recv) = connection.split();

    let reader = tokio::spawn(async move {
        loop {
            match recv.recv().await {
                Ok(Some(message)) => println!("{message}"),
                Ok(None) => {
                    println!("hub closed the connection");
                    break;
                }
                Err(e) => {
                    eprintln!("receive error: {e}");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        if let Err(e) = send.send(&line).await {
            if e.is_fatal() {
                eprintln!("send error: {e}");
                break;
            }
            eprintln!("{e}");
        }
    }

    reader.abort();
    Ok(())
}
