//! rendezvous CLI: demo nodes for broadcast topic discovery.

use std::time::Duration;

use clap::{Parser, Subcommand};
use rendezvous_node::{setup, Node};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "rendezvous",
    about = "Discover publishers and subscribers on the local network",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Advertise a topic and publish a counted message on it periodically.
    Talk {
        topic: String,

        #[arg(short, long, default_value = "hello world")]
        message: String,

        /// Milliseconds between messages.
        #[arg(short, long, default_value_t = 1000)]
        period_ms: u64,
    },

    /// Subscribe to topics and print every payload received.
    Listen {
        #[arg(required = true)]
        topics: Vec<String>,
    },

    /// Publish and subscribe to the same topic in one process.
    Echo {
        topic: String,

        #[arg(short, long, default_value = "echo")]
        message: String,

        #[arg(short, long, default_value_t = 1000)]
        period_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = setup::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.node.log_level)),
        )
        .init();

    let mut node = Node::bind(config).await?;
    info!(identity = %node.identity(), ip = %node.advertised_ip(), "node ready");

    match cli.command {
        Commands::Talk {
            topic,
            message,
            period_ms,
        } => {
            node.advertise(&topic)?;
            start_talking(&mut node, topic, message, period_ms)?;
        }
        Commands::Listen { topics } => {
            for topic in &topics {
                node.subscribe(topic, print_payload)?;
            }
        }
        Commands::Echo {
            topic,
            message,
            period_ms,
        } => {
            node.advertise(&topic)?;
            node.subscribe(&topic, print_payload)?;
            start_talking(&mut node, topic, message, period_ms)?;
        }
    }

    tokio::select! {
        result = node.spin() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("interrupted");
        }
    }
    node.shutdown().await;
    Ok(())
}

/// Publish `"<message> <n>"` on `topic` every `period_ms`.
fn start_talking(
    node: &mut Node,
    topic: String,
    message: String,
    period_ms: u64,
) -> anyhow::Result<()> {
    let handle = node.handle();
    let mut count = 0u64;
    node.set_timer(Duration::from_millis(period_ms), move || {
        count += 1;
        let payload = format!("{message} {count}");
        match handle.publish(&topic, &payload) {
            Ok(()) => println!("[{topic}] sent: {payload}"),
            Err(e) => tracing::warn!(topic = %topic, error = %e, "publish failed"),
        }
    })?;
    Ok(())
}

fn print_payload(topic: &str, payload: &[u8]) {
    println!("[{topic}] {}", String::from_utf8_lossy(payload));
}
