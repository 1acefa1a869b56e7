#![forbid(unsafe_code)]
//! bpmchain node: serves the streaming and HTTP interfaces over one shared chain.

use bpmchain::config::load_config;
use bpmchain::error::ChainError;
use bpmchain::network::run_stream_server;
use bpmchain::node::{Node, NodeState};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Tcp,
    Http,
    Both,
}

#[derive(Parser)]
#[command(name = "bpmchain-node", version, about = "Run a bpmchain ledger node")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which interfaces to serve
    #[arg(short, long, value_enum, default_value_t = Transport::Both)]
    transport: Transport,

    /// Override the proof-of-work difficulty
    #[arg(short, long)]
    difficulty: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(difficulty) = cli.difficulty {
        config.chain.difficulty = difficulty;
        config.validate()?;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let node = Node::new(&config);
    let _logger = node.spawn_chain_logger();

    let tcp = {
        let node = node.clone();
        let network = config.network.clone();
        let enabled = cli.transport != Transport::Http;
        async move {
            if enabled {
                run_stream_server(node, &network).await
            } else {
                std::future::pending::<Result<(), ChainError>>().await
            }
        }
    };

    let http = {
        let node = node.clone();
        let addr = config.network.api_addr();
        let enabled = cli.transport != Transport::Tcp;
        async move {
            if enabled {
                serve_http(node, &addr).await
            } else {
                std::future::pending::<Result<(), ChainError>>().await
            }
        }
    };

    node.set_state(NodeState::Ready);
    info!(transport = ?cli.transport, "bpmchain node ready");

    let result = tokio::select! {
        r = tcp => r,
        r = http => r,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };

    node.shutdown();
    if let Err(e) = &result {
        error!("server failed: {}", e);
    }
    info!(length = node.store().len(), "bpmchain node stopped");
    result.map_err(Into::into)
}

#[cfg(feature = "api")]
async fn serve_http(node: Node, addr: &str) -> Result<(), ChainError> {
    bpmchain::api::run_api_server(node, addr).await
}

#[cfg(not(feature = "api"))]
async fn serve_http(_node: Node, _addr: &str) -> Result<(), ChainError> {
    Err(ChainError::ConfigError("API feature not enabled in this build".to_string()))
}
