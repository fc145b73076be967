//! Sotto relay daemon.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port with generated keys
//! sottod --bind 0.0.0.0:7878
//!
//! # Wire up an answering service
//! sottod --bind 0.0.0.0:7878 --assistant-url http://localhost:9000/ask
//! ```

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use sotto_core::{
    AnswerService, DEFAULT_TRIGGER_TOKEN, MemoryIdentityStore, MemoryMessageStore, NoAnswerService,
};
use sotto_server::{HttpAnswerService, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sotto encrypted chat relay
#[derive(Parser, Debug)]
#[command(name = "sottod")]
#[command(about = "Encrypted persistent group-chat relay")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7878")]
    bind: String,

    /// Directory holding the hub key pair (created on first run)
    #[arg(short, long, default_value = ".sotto/keys")]
    key_dir: PathBuf,

    /// Capacity of the hub dispatch queues
    #[arg(long, default_value = "1024")]
    queue_capacity: usize,

    /// Substring that routes a message to the assistant
    #[arg(long, default_value = DEFAULT_TRIGGER_TOKEN)]
    trigger_token: String,

    /// HTTP endpoint of the answering service; questions are dropped when
    /// unset
    #[arg(long)]
    assistant_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("sottod starting");
    tracing::info!("binding to {}", args.bind);

    let answers: Arc<dyn AnswerService> = match args.assistant_url {
        Some(url) => {
            tracing::info!("answering service at {url}");
            Arc::new(HttpAnswerService::new(url))
        },
        None => {
            tracing::warn!("no answering service configured; assistant questions will be dropped");
            Arc::new(NoAnswerService)
        },
    };

    let config = ServerConfig {
        bind_address: args.bind,
        key_dir: args.key_dir,
        queue_capacity: args.queue_capacity,
        trigger_token: args.trigger_token,
        ..Default::default()
    };

    let server = Server::bind(
        config,
        Arc::new(MemoryIdentityStore::new()),
        Arc::new(MemoryMessageStore::new()),
        answers,
    )
    .await?;

    tracing::info!("relay ready on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
