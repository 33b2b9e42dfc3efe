//! gossip-node: One member of a gossip broadcast cluster.
//!
//! Reads line-delimited JSON messages on stdin and writes replies and
//! peer traffic on stdout. Logs go to stderr.

use anyhow::Result;
use clap::Parser;
use gossip_core::{BackoffConfig, DeliveryMode, GossipConfig};
use gossip_node::NodeRuntime;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gossip-node")]
#[command(about = "Gossip broadcast node speaking JSON over stdin/stdout")]
struct Args {
    /// Wait before the first gossip retry, doubled after every failure
    #[arg(long, env = "GOSSIP_BACKOFF_BASE_MS", default_value_t = 500)]
    backoff_base_ms: u64,

    /// Ceiling on the retry wait (unbounded if not set)
    #[arg(long, env = "GOSSIP_BACKOFF_MAX_MS")]
    backoff_max_ms: Option<u64>,

    /// How long one gossip attempt waits for its ack
    #[arg(long, env = "GOSSIP_ACK_TIMEOUT_MS", default_value_t = 1000)]
    ack_timeout_ms: u64,

    /// Delivery mode: "reliable" (retry until acked) or "best-effort" (send once)
    #[arg(long, env = "GOSSIP_MODE", default_value_t = DeliveryMode::Reliable)]
    mode: DeliveryMode,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn gossip_config(&self) -> GossipConfig {
        GossipConfig {
            backoff: BackoffConfig {
                base: Duration::from_millis(self.backoff_base_ms),
                max_delay: self.backoff_max_ms.map(Duration::from_millis),
                ..Default::default()
            },
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            mode: self.mode,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,gossip_node=debug,gossip_core=debug"
    } else {
        "info,gossip_node=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // stdout carries the protocol, so logs must stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = args.gossip_config();
    info!("Starting gossip-node");
    info!(
        "Delivery: {}, backoff base {:?}, max {:?}, ack timeout {:?}",
        config.mode, config.backoff.base, config.backoff.max_delay, config.ack_timeout
    );

    let runtime = NodeRuntime::new(config);
    let shutdown = runtime.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    runtime.run(tokio::io::stdin(), tokio::io::stdout()).await?;

    info!("Shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["gossip-node"]);
        let config = args.gossip_config();

        assert_eq!(config.backoff.base, Duration::from_millis(500));
        assert_eq!(config.backoff.max_delay, None);
        assert_eq!(config.ack_timeout, Duration::from_secs(1));
        assert_eq!(config.mode, DeliveryMode::Reliable);
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "gossip-node",
            "--backoff-base-ms",
            "100",
            "--backoff-max-ms",
            "5000",
            "--ack-timeout-ms",
            "250",
            "--mode",
            "best-effort",
        ]);
        let config = args.gossip_config();

        assert_eq!(config.backoff.base, Duration::from_millis(100));
        assert_eq!(config.backoff.max_delay, Some(Duration::from_secs(5)));
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.mode, DeliveryMode::BestEffort);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Args::try_parse_from(["gossip-node", "--mode", "carrier-pigeon"]).is_err());
    }
}
