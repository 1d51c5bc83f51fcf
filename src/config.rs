//! Node configuration: CLI-adjacent settings and the peer directory loaded
//! from `peers.toml` (§2 ambient stack, replacing the original's
//! hardcoded per-node peer lists).

use std::path::{Path, PathBuf};

use config::{Config as ConfigLoader, File};
use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::network::protocol::PeerInfo;

pub const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_PEERS_FILE: &str = "peers.toml";

/// Runtime settings for one node process, the Rust analogue of the
/// original's `ArgParser` output plus `NodeConf`'s listen address.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub node_id: u32,
    pub port: u16,
    pub address: String,
    pub verbose: bool,
    pub selfish: bool,
    pub peers_file: PathBuf,
}

impl NodeSettings {
    pub fn log_filename(&self) -> PathBuf {
        Path::new(DEFAULT_LOG_DIR).join(format!("node-{}.log", self.node_id))
    }
}

/// One entry of `peers.toml`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeerEntry {
    pub port: u16,
    pub address: String,
    pub vk: String,
}

impl From<PeerEntry> for PeerInfo {
    fn from(e: PeerEntry) -> Self {
        PeerInfo::new(e.port, e.address, e.vk)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
struct PeersFile {
    #[serde(default)]
    peer: Vec<PeerEntry>,
}

/// Loads the peer directory from `path`. A missing file is not an error:
/// it means this node is the first on the network, matching the original
/// behavior when `peers` is empty.
pub fn load_peers(path: &Path) -> Result<Vec<PeerInfo>, NodeError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let loader = ConfigLoader::builder()
        .add_source(File::from(path.to_path_buf()).format(config::FileFormat::Toml))
        .build()?;
    let parsed: PeersFile = loader.try_deserialize()?;
    Ok(parsed.peer.into_iter().map(PeerInfo::from).collect())
}

/// The three symmetric local peers the original wires up via
/// `BaseNode1.py`/`BaseNode2.py`/`BaseNode3.py`, for standalone/demo runs
/// with no `peers.toml` on hand. `own_port` is excluded so a demo node
/// doesn't list itself as a peer.
pub fn demo_peers(own_port: u16) -> Vec<PeerInfo> {
    const DEMO: [(u16, &str); 3] = [
        (9000, "demo-node-0"),
        (9001, "demo-node-1"),
        (9002, "demo-node-2"),
    ];
    DEMO.iter()
        .filter(|(port, _)| *port != own_port)
        .map(|(port, vk)| PeerInfo::new(*port, "127.0.0.1".to_string(), (*vk).to_string()))
        .collect()
}
