//! The programmatic client API: submitting transactions and querying chain
//! state from outside the mining/listening threads (§4.9).
//!
//! The original exposes this through an interactive `serve_loop()` REPL;
//! that input loop is out of scope here; what is kept is everything the
//! REPL itself called into, as a library surface a caller can drive
//! however it likes.

use std::collections::HashMap;

use num_traits::ToPrimitive;

use crate::blockchain::header::WeakHeader;
use crate::blockchain::transaction::Amount;
use crate::blockchain::{Block, Transaction};
use crate::crypto::signatures::{self, PrivateKey};
use crate::network::node::Node;

#[derive(Debug, Clone)]
pub struct TxStatus {
    pub tx: Transaction,
    pub mined: bool,
    pub block_len: Option<u64>,
}

/// Per-miner counts of strong blocks and weak headers contributed to the
/// mainchain, matching the `stats` command's breakdown.
#[derive(Debug, Clone, Default)]
pub struct MinerStats {
    pub strong_blocks: HashMap<String, u64>,
    pub weak_headers: HashMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct ChainSummary {
    pub length: u64,
    pub chain_pow: f64,
    pub avg_weak_headers: f64,
    pub stdev_weak_headers: f64,
    pub blocks: Vec<Block>,
}

pub struct Client {
    vk: String,
    sk: PrivateKey,
    node: std::sync::Arc<Node>,
    all_txns_made: HashMap<String, TxStatus>,
}

impl Client {
    pub fn new(sk: PrivateKey, node: std::sync::Arc<Node>) -> Self {
        let vk = signatures::public_key_to_hex(&p192::ecdsa::VerifyingKey::from(&sk));
        Client {
            vk,
            sk,
            node,
            all_txns_made: HashMap::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.vk
    }

    pub fn balance(&self) -> Amount {
        self.node.balances.read().balance_of(&self.vk)
    }

    pub fn all_balances(&self) -> HashMap<String, Amount> {
        self.node.balances.read().all_balances().clone()
    }

    pub fn whdrs_cache(&self) -> Vec<WeakHeader> {
        self.node.blockchain.read().whdrs_cache().to_vec()
    }

    pub fn block(&self, length: u64) -> Option<Block> {
        self.node.blockchain.read().block_by_length(length)
    }

    pub fn chain_summary(&self) -> ChainSummary {
        let chain = self.node.blockchain.read();
        let mainchain = chain.mainchain();
        let counts: Vec<f64> = mainchain.iter().map(|b| b.weak_hdrs.len() as f64).collect();
        let avg = counts.iter().sum::<f64>() / counts.len().max(1) as f64;
        let variance = counts.iter().map(|c| (c - avg).powi(2)).sum::<f64>() / counts.len().max(1) as f64;

        let pow = chain.chain_pow(None);
        let pow_f64 = pow.numer().to_f64().unwrap_or(f64::MAX) / pow.denom().to_f64().unwrap_or(1.0);

        ChainSummary {
            length: chain.tip_block.length,
            chain_pow: pow_f64,
            avg_weak_headers: avg,
            stdev_weak_headers: variance.sqrt(),
            blocks: mainchain,
        }
    }

    /// Per-miner strong-block and weak-header counts across the mainchain,
    /// skipping the genesis block (it has no coinbase miner).
    pub fn miner_stats(&self) -> MinerStats {
        let chain = self.node.blockchain.read();
        let mut stats = MinerStats::default();

        for block in chain.mainchain() {
            if block.length == 1 {
                continue;
            }
            *stats.strong_blocks.entry(block.header.coinbase.clone()).or_insert(0) += 1;
            for wh in &block.weak_hdrs {
                *stats.weak_headers.entry(wh.coinbase.clone()).or_insert(0) += 1;
            }
        }

        stats
    }

    /// Signs and enqueues a transaction for mining. Fails with `None`
    /// returned if an identical transaction (by id) is already pending.
    pub fn submit_transaction(
        &mut self,
        receiver: impl Into<String>,
        amount: Amount,
        comment: impl Into<String>,
    ) -> Option<String> {
        let tx = Transaction::signed(self.vk.clone(), receiver, amount, comment, &self.sk);
        let id = tx.id();
        if self.all_txns_made.contains_key(&id) {
            return None;
        }

        self.node.q_txns_from_client.push(tx.clone());
        self.all_txns_made.insert(
            id.clone(),
            TxStatus {
                tx,
                mined: false,
                block_len: None,
            },
        );
        Some(id)
    }

    pub fn transaction_history(&self) -> impl Iterator<Item = &TxStatus> {
        self.all_txns_made.values()
    }

    /// Drains the mining thread's notification queue, updating the status
    /// of any of our own transactions that have since been mined.
    pub fn poll_mined_transactions(&mut self) {
        while let Some(tx) = self.node.q_client_txns_mined.try_pop() {
            let id = tx.id();
            if let Some(status) = self.all_txns_made.get_mut(&id) {
                status.mined = true;
                status.block_len = self.node.blockchain.read().block_length_of_mined_tx(&tx);
            }
        }
    }
}
