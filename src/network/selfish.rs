//! The selfish-mining strategy: withhold newly mined strong blocks instead
//! of broadcasting them, only revealing the hidden chain when an honest
//! competitor is about to catch up (§4.8).
//!
//! Wraps a [`Node`] rather than subclassing it: every field and queue a
//! selfish node needs already lives on `Node`, so `SelfishNode` only adds
//! the second balance view it keeps on the public chain it is racing.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use num_bigint::BigInt;
use num_rational::Ratio;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::protocol::MsgType;
use crate::balance::BalanceModel;
use crate::blockchain::{Block, Blockchain};

/// The fraction of the honest chain's catch-up progress (relative to
/// `MAX_TARGET * target`) at which a selfish miner reveals its hidden
/// chain rather than risk being overtaken outright.
const RATIO_TO_OVERRIDE_NUM: i64 = 1;
const RATIO_TO_OVERRIDE_DEN: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfishState {
    Withhold,
    Publish,
    GiveUp,
}

pub struct SelfishNode {
    pub node: Arc<super::node::Node>,
    /// Tracks balances as they would be under the honest chain the selfish
    /// node is hiding blocks from, so it can judge when to give up.
    honest_balances: RwLock<BalanceModel>,
}

impl SelfishNode {
    pub fn new(node: Arc<super::node::Node>, known_addresses: impl IntoIterator<Item = String>) -> Self {
        SelfishNode {
            node,
            honest_balances: RwLock::new(BalanceModel::new(known_addresses)),
        }
    }

    fn reveal_threshold(rcv_block: &Block) -> Ratio<BigInt> {
        let max_t = BigInt::from(crate::blockchain::header::max_target());
        let target = BigInt::from(rcv_block.header.target.clone());
        Ratio::new(BigInt::from(RATIO_TO_OVERRIDE_NUM), BigInt::from(RATIO_TO_OVERRIDE_DEN)) * (max_t * target)
    }

    fn blocks_to_reveal(chain: &Blockchain, fork_mark: &Block) -> Vec<Block> {
        let mut revealed = Vec::new();
        let mut cur = chain.tip_block.clone();
        while cur.header.id() != fork_mark.header.id() {
            let prev_hash = cur.header.prev_hash.clone();
            revealed.insert(0, cur);
            match chain.all_blocks.get(&prev_hash) {
                Some(parent) => cur = parent.clone(),
                None => break,
            }
        }
        revealed
    }

    /// Adds a received block to the index, then decides whether to keep
    /// withholding, publish the hidden chain, or give up on it (§4.8).
    fn add_or_ignore_block(&self, rcv_block: Block, fork_mark: &Block) -> SelfishState {
        let mut chain = self.node.blockchain.write();
        chain.add_block(rcv_block.clone());

        if rcv_block.header.prev_hash == chain.tip_block.header.id() {
            chain.set_tip(rcv_block.clone());
            drop(chain);
            self.node.balances.write().update_balances(&rcv_block);
            self.honest_balances.write().update_balances(&rcv_block);
            return SelfishState::GiveUp;
        }

        let challenger_pow = chain.chain_pow(Some(&rcv_block));
        let own_total = chain.chain_pow(None) + chain.current_whdrs_pow();
        let threshold = Self::reveal_threshold(&rcv_block);

        if challenger_pow > own_total.clone() - threshold.clone() && challenger_pow < own_total {
            info!("revealing withheld chain: honest chain is catching up");
            let to_reveal = Self::blocks_to_reveal(&chain, fork_mark);
            drop(chain);

            for block in &to_reveal {
                self.node.broadcast(MsgType::StrongBlockMined, block.to_json_string());
            }
            let chain = self.node.blockchain.read();
            self.honest_balances.write().rebuild_after_fork(&chain);
            SelfishState::Publish
        } else if challenger_pow < own_total {
            drop(chain);
            self.honest_balances.write().update_balances(&rcv_block);
            SelfishState::Withhold
        } else {
            info!("giving up the withheld chain: honest chain overtook it");
            chain.set_tip(rcv_block.clone());
            drop(chain);
            let snapshot = self.node.blockchain.read();
            self.node.balances.write().rebuild_after_fork(&snapshot);
            self.honest_balances.write().update_balances(&rcv_block);
            SelfishState::GiveUp
        }
    }

    /// The selfish mining loop: mines exactly like the honest node but
    /// never broadcasts weak headers, and only reveals mined strong blocks
    /// through [`add_or_ignore_block`]'s publish path.
    pub fn run_mining_thread(self: Arc<Self>) {
        while !self.node.blockchain_downloaded.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(10));
        }

        let mut rng = StdRng::seed_from_u64(self.node.mining_seed());
        let mut fork_mark: Option<Block> = None;

        loop {
            if self.node.stop_mining.load(Ordering::Relaxed) {
                return;
            }

            let txns = self.node.preupdate_mined_txns();
            let coinbase = self.node.pub_key.clone();

            let mined = {
                let mut chain = self.node.blockchain.write();
                chain.mine_next_block(
                    &coinbase,
                    txns,
                    &mut rng,
                    &self.node.stop_mining,
                    &self.node.q_weak,
                    &self.node.q_strong,
                    |_wh| {}, // withheld: a selfish node never broadcasts weak headers
                )
            };

            if self.node.stop_mining.load(Ordering::Relaxed) {
                return;
            }

            match mined {
                Some(block) => {
                    if fork_mark.is_none() {
                        fork_mark = Some(self.node.blockchain.read().tip_block.clone());
                    }
                    {
                        let mut chain = self.node.blockchain.write();
                        chain.add_block(block.clone());
                        chain.set_tip(block.clone());
                    }
                    self.node.update_txns_to_mine(&block);
                    self.node.balances.write().update_balances(&block);
                }
                None => {
                    let Some(rcv_block) = self.node.q_strong.try_pop() else { continue };
                    let valid = {
                        let chain = self.node.blockchain.read();
                        let bm = self.node.balances.read();
                        chain.validate_block(&rcv_block).is_ok()
                            && self.node.validate_txns_of_recv_block(&chain, &bm, &rcv_block)
                    };
                    if !valid {
                        continue;
                    }

                    let current_fork_mark = fork_mark
                        .clone()
                        .unwrap_or_else(|| self.node.blockchain.read().tip_block.clone());

                    match self.add_or_ignore_block(rcv_block.clone(), &current_fork_mark) {
                        SelfishState::Publish => {
                            fork_mark = Some(self.node.blockchain.read().tip_block.clone());
                        }
                        SelfishState::Withhold => {}
                        SelfishState::GiveUp => {
                            self.node.blockchain.write().clear_whdrs_cache();
                            self.node.update_txns_to_mine(&rcv_block);
                            fork_mark = Some(self.node.blockchain.read().tip_block.clone());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signatures::{generate_keypair, public_key_to_hex};
    use crate::network::node::Node;
    use crate::network::queue::FifoQueue;
    use num_bigint::BigUint;
    use num_traits::Num;
    use std::sync::atomic::AtomicBool;

    fn trivial_target() -> BigUint {
        BigUint::from_str_radix(&"f".repeat(64), 16).unwrap()
    }

    fn retarget_genesis(chain: &mut Blockchain, target: BigUint) {
        let old_id = chain.tip_block.header.id();
        chain.all_blocks.remove(&old_id);
        chain.tip_block.header.target = target;
        let new_genesis = chain.tip_block.clone();
        chain.all_blocks.insert(new_genesis.header.id(), new_genesis);
    }

    fn test_selfish_node() -> SelfishNode {
        let (sk, vk) = generate_keypair();
        let node = Arc::new(Node::new(
            1,
            sk,
            public_key_to_hex(&vk),
            "127.0.0.1".to_string(),
            19500,
            vec![],
            11,
        ));
        SelfishNode::new(node, std::iter::empty::<String>())
    }

    // Scenario 5 (§8): a private branch 2 blocks ahead of the public tip
    // reveals when a rival public block brings its PoW into the window
    // `(P_s - Delta, P_s)`. Delta is deliberately astronomical (see
    // `reveal_threshold`), so in practice any rival lighter than the
    // private branch falls inside the window and triggers a reveal.
    #[test]
    fn selfish_branch_reveals_when_rival_catches_up() {
        let selfish = test_selfish_node();
        {
            let mut chain = selfish.node.blockchain.write();
            retarget_genesis(&mut chain, trivial_target());
        }
        let fork_mark = selfish.node.blockchain.read().tip_block.clone();
        let stop = AtomicBool::new(false);
        let empty_weak = FifoQueue::new();
        let empty_strong = FifoQueue::new();

        let private_1 = {
            let mut chain = selfish.node.blockchain.write();
            chain
                .mine_next_block("selfish-miner", vec![], &mut StdRng::seed_from_u64(30), &stop, &empty_weak, &empty_strong, |_| {})
                .unwrap()
        };
        {
            let mut chain = selfish.node.blockchain.write();
            chain.add_block(private_1.clone());
            chain.set_tip(private_1.clone());
        }

        let private_2 = {
            let mut chain = selfish.node.blockchain.write();
            chain
                .mine_next_block("selfish-miner", vec![], &mut StdRng::seed_from_u64(31), &stop, &empty_weak, &empty_strong, |_| {})
                .unwrap()
        };
        {
            let mut chain = selfish.node.blockchain.write();
            chain.add_block(private_2.clone());
            chain.set_tip(private_2.clone());
        }

        // A rival block mined publicly off the same genesis, one block deep
        // against the private branch's two.
        let mut rival_chain = Blockchain::new();
        retarget_genesis(&mut rival_chain, trivial_target());
        let rival = rival_chain
            .mine_next_block("honest-miner", vec![], &mut StdRng::seed_from_u64(32), &stop, &empty_weak, &empty_strong, |_| {})
            .unwrap();

        {
            let chain = selfish.node.blockchain.read();
            let order = SelfishNode::blocks_to_reveal(&chain, &fork_mark);
            assert_eq!(order.len(), 2);
            assert_eq!(order[0].header.id(), private_1.header.id());
            assert_eq!(order[1].header.id(), private_2.header.id());
        }

        let state = selfish.add_or_ignore_block(rival, &fork_mark);
        assert_eq!(state, SelfishState::Publish);

        // Revealing doesn't change the store's own tip: it stays the
        // private branch's tip, which the mining loop adopts as the next
        // fork_mark.
        assert_eq!(selfish.node.blockchain.read().tip_block.header.id(), private_2.header.id());
    }
}
