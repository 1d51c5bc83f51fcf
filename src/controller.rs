//! Bootstraps a node process: builds the node, runs the one-time startup
//! sync, then spawns the mining and listening threads (§4.7, §5).
//!
//! The original splits the sync out into the listening thread itself,
//! gated by a `blockchain_downloaded` barrier event the mining thread
//! waits on. Here the sync runs synchronously, before either thread is
//! spawned, so `Node` only ever needs to cross a thread boundary by being
//! moved into `Arc`s once already fully initialized; see DESIGN.md.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::info;

use crate::client::Client;
use crate::config::NodeSettings;
use crate::crypto::signatures::PrivateKey;
use crate::logging::seed_from_log_filename;
use crate::network::node::Node;
use crate::network::protocol::PeerInfo;
use crate::network::selfish::SelfishNode;

pub enum NodeRole {
    Honest(Arc<Node>),
    Selfish(Arc<SelfishNode>),
}

pub struct NodeController {
    pub node: Arc<Node>,
    pub role: NodeRole,
    pub client: Client,
    mining_handle: Option<JoinHandle<()>>,
    listening_handle: Option<JoinHandle<()>>,
}

impl NodeController {
    /// Builds the node, performs the initial blockchain sync against
    /// `peers`, then spawns its worker threads. Returns once both threads
    /// are running; the sync itself has already completed by then.
    pub fn bootstrap(settings: &NodeSettings, priv_key: PrivateKey, pub_key: String, peers: Vec<PeerInfo>) -> std::io::Result<Self> {
        let mining_seed = seed_from_log_filename(&settings.log_filename());
        let node = Arc::new(Node::new(
            settings.node_id,
            priv_key.clone(),
            pub_key.clone(),
            settings.address.clone(),
            settings.port,
            peers.clone(),
            mining_seed,
        ));

        let socket = node.bind_socket()?;
        info!("node {} syncing blockchain from {} configured peers", settings.node_id, peers.len());
        node.download_blockchain(&socket);
        info!("node {} blockchain sync complete", settings.node_id);

        let client = Client::new(priv_key, node.clone());

        let role = if settings.selfish {
            let known = peers.iter().map(|p| p.vk.clone()).chain(std::iter::once(pub_key));
            NodeRole::Selfish(Arc::new(SelfishNode::new(node.clone(), known)))
        } else {
            NodeRole::Honest(node.clone())
        };

        let mining_handle = Self::spawn_mining_thread(settings.node_id, &role);

        let listening_handle = {
            let n = node.clone();
            let name = format!("node-{}-listening", settings.node_id);
            Some(
                std::thread::Builder::new()
                    .name(name)
                    .spawn(move || n.run_listening_thread(socket))
                    .expect("spawn listening thread"),
            )
        };

        Ok(NodeController {
            node,
            role,
            client,
            mining_handle,
            listening_handle,
        })
    }

    fn spawn_mining_thread(node_id: u32, role: &NodeRole) -> Option<JoinHandle<()>> {
        let name = format!("node-{node_id}-mining");
        let handle = match role {
            NodeRole::Honest(node) => {
                let node = node.clone();
                std::thread::Builder::new().name(name).spawn(move || node.run_mining_thread())
            }
            NodeRole::Selfish(node) => {
                let node = node.clone();
                std::thread::Builder::new().name(name).spawn(move || node.run_mining_thread())
            }
        };
        Some(handle.expect("spawn mining thread"))
    }

    /// Signals both worker threads to stop and waits for them to exit,
    /// matching the original's shutdown sequence on an interactive quit.
    pub fn shutdown(mut self) {
        self.node.stop_mining.store(true, Ordering::Relaxed);
        self.node.stop_listening.store(true, Ordering::Relaxed);

        if let Some(h) = self.mining_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.listening_handle.take() {
            let _ = h.join();
        }
    }
}
