//! Binary entry point: parses CLI flags, loads the peer directory, and
//! runs a node until interrupted (§2, §4.7, §4.9).

use std::path::PathBuf;

use clap::Parser;
use tokio::signal;

use strongchain_node::config::{load_peers, NodeSettings, DEFAULT_PEERS_FILE};
use strongchain_node::controller::NodeController;
use strongchain_node::crypto::signatures;
use strongchain_node::logging::NodeLog;

#[derive(Parser, Debug)]
#[command(
    name = "strongchain-node",
    about = "A peer-to-peer node for a proof-of-work chain that counts sub-target weak headers toward chain weight and miner reward"
)]
struct Args {
    /// This node's numeric identity, used for its log file name.
    #[arg(long, default_value_t = 1)]
    node_id: u32,

    /// UDP port to listen on.
    #[arg(long, default_value_t = 9000)]
    port: u16,

    /// Address to bind the listening socket to.
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    /// Path to the peer directory file.
    #[arg(long, default_value = DEFAULT_PEERS_FILE)]
    peers_file: PathBuf,

    /// When no peers file is found, fall back to the built-in three-node
    /// local demo directory instead of starting with no peers.
    #[arg(long)]
    demo: bool,

    /// Display verbose messages in the node's log.
    #[arg(long)]
    verbose: bool,

    /// Act as a selfish miner.
    #[arg(long)]
    selfish: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let settings = NodeSettings {
        node_id: args.node_id,
        port: args.port,
        address: args.address,
        verbose: args.verbose,
        selfish: args.selfish,
        peers_file: args.peers_file,
    };

    let level = if settings.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    NodeLog::install(&settings.log_filename(), level)?;

    let mut peers = load_peers(&settings.peers_file)?;
    if peers.is_empty() && args.demo {
        peers = strongchain_node::config::demo_peers(settings.port);
    }

    let (priv_key, pub_key) = signatures::generate_keypair();
    let pub_key_hex = signatures::public_key_to_hex(&pub_key);

    log::info!(
        "node {} starting as {} ({} configured peers, selfish = {})",
        settings.node_id,
        pub_key_hex,
        peers.len(),
        settings.selfish,
    );

    let controller = NodeController::bootstrap(&settings, priv_key, pub_key_hex, peers)?;

    log::info!("node {} running on {}:{}. Press Ctrl+C to stop.", settings.node_id, settings.address, settings.port);
    signal::ctrl_c().await?;
    log::info!("shutdown signal received, stopping node {}", settings.node_id);

    controller.shutdown();
    Ok(())
}
