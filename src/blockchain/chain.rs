//! The chain store: block index, weak-header cache, tip, target
//! adjustment, validation and mining (§4.1-§4.4, §9).
//!
//! Only the mining thread is ever given a mutable `Blockchain` (§5); readers
//! elsewhere in the crate go through the snapshots this module exposes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use num_bigint::{BigInt, BigUint};
use num_rational::Ratio;
use rand::Rng;

use super::block::Block;
use super::header::{init_strong_target, max_target, Header, WeakHeader};
use super::transaction::{Amount, Transaction};
use crate::crypto::sha256_hex;
use crate::network::queue::FifoQueue;

pub const GENESIS_TS: f64 = 1542696180.0;
pub const GENESIS_NONCE: u64 = 1_111_111;
pub const GENESIS_LEN: u64 = 1;

/// How many blocks pass between strong-target recalculations.
pub const BLOCKS_TO_CHECK_TARGET: u64 = 10;
/// Desired spacing between strong blocks, in seconds.
pub const TIME_BETWEEN_BLOCKS: f64 = 3.0;
/// A strong block's base reward, in whole units.
pub const STRONG_BLOCK_REWARD: u64 = 10;
/// How far a header's timestamp may drift from its expected arrival time.
pub const TIMESTAMP_RANGE: f64 = 3600.0;

fn zero_hash() -> String {
    crate::crypto::hash::ZERO_HASH_64.to_string()
}

/// Multiplies a 256-bit target by an `f64` ratio exactly, by decomposing
/// the ratio into its IEEE-754 mantissa and binary exponent. A naive
/// `as u128` cast saturates for targets this large; this instead shifts
/// the exact product, so a target near `MAX_TARGET` survives the
/// adjustment intact.
fn scale_biguint_by_f64(value: &BigUint, factor: f64) -> BigUint {
    if !factor.is_finite() || factor <= 0.0 {
        return BigUint::from(0u32);
    }

    let bits = factor.to_bits();
    let raw_exponent = ((bits >> 52) & 0x7ff) as i64;
    let mantissa_bits = bits & 0x000f_ffff_ffff_ffff;
    let (mantissa, exp2) = if raw_exponent == 0 {
        (mantissa_bits, -1074i64) // subnormal
    } else {
        (mantissa_bits | (1u64 << 52), raw_exponent - 1075)
    };

    let product = value * BigUint::from(mantissa);
    if exp2 >= 0 {
        product << (exp2 as u64)
    } else {
        product >> ((-exp2) as u64)
    }
}

/// Outcome of validating a candidate strong block or weak header against
/// the store, matching the original protocol's discriminants (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum BlockValidationStatus {
    NonExistingPred = -1,
    ExistingBlock = -2,
    TxnsIntegrity = -3,
    WhdrsIntegrity = -4,
    TargetValue = -5,
    StrongTargetPow = -6,
    HdrTimestamp = -7,
    WhdrTimestamp = -8,
    WhdrPrevHash = -9,
    WhdrTargetPow = -10,
    WhdrTargetValue = -11,
    Ok = 0,
    WhdrOk = 1,
}

impl BlockValidationStatus {
    pub fn is_ok(self) -> bool {
        matches!(self, BlockValidationStatus::Ok | BlockValidationStatus::WhdrOk)
    }
}

pub fn strong_block_reward() -> Amount {
    Amount::from_units(STRONG_BLOCK_REWARD)
}

/// A weak header earns `STRONG_BLOCK_REWARD / 2^WEAK_TARGET_POWER` of a
/// strong block's reward.
pub fn weak_header_reward() -> Amount {
    Amount::from_hundredths(strong_block_reward().hundredths() >> super::header::WEAK_TARGET_POWER)
}

pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_secs_f64()
}

pub struct Blockchain {
    pub all_blocks: HashMap<String, Block>,
    /// Insertion-ordered weak-header cache, keyed by header id for O(1)
    /// membership checks; `compute_hash_of_set` depends on insertion order.
    whdrs_cache_order: Vec<WeakHeader>,
    whdrs_cache_ids: HashSet<String>,
    pub tip_block: Block,
    times_of_blocks: Vec<f64>,
}

impl Blockchain {
    pub fn new() -> Self {
        let genesis = Self::build_genesis_block();
        let mut all_blocks = HashMap::new();
        all_blocks.insert(genesis.header.id(), genesis.clone());

        info!(
            "ratio of weak/strong targets is {}",
            1u32 << super::header::WEAK_TARGET_POWER
        );
        info!("desired time between blocks is {}", TIME_BETWEEN_BLOCKS);
        info!("block reward {}", strong_block_reward());
        info!("weak header reward {}", weak_header_reward());

        Blockchain {
            all_blocks,
            whdrs_cache_order: Vec::new(),
            whdrs_cache_ids: HashSet::new(),
            tip_block: genesis,
            times_of_blocks: Vec::new(),
        }
    }

    fn build_genesis_block() -> Block {
        let txns: Vec<Transaction> = Vec::new();
        let root = Block::root_for(&txns);
        let header = Header::new(
            zero_hash(),
            GENESIS_TS,
            GENESIS_NONCE,
            root,
            zero_hash(),
            "0".repeat(96),
            init_strong_target(),
        );
        Block::new(header, GENESIS_LEN, txns, Vec::new())
    }

    pub fn genesis_prev_hash() -> String {
        zero_hash()
    }

    fn is_genesis(&self, block: &Block) -> bool {
        block.header.prev_hash == Self::genesis_prev_hash()
    }

    pub fn add_block(&mut self, block: Block) {
        self.times_of_blocks.push(now_ts());
        self.all_blocks.insert(block.header.id(), block);
    }

    /// Switches the mainchain tip, crediting the whdrs cache toward the
    /// new tip's weight as the cache is now relative to it (§4.5).
    pub fn set_tip(&mut self, block: Block) {
        self.tip_block = block;
    }

    pub fn whdrs_cache(&self) -> &[WeakHeader] {
        &self.whdrs_cache_order
    }

    pub fn clear_whdrs_cache(&mut self) {
        self.whdrs_cache_order.clear();
        self.whdrs_cache_ids.clear();
    }

    fn insert_whdr(&mut self, wh: WeakHeader) {
        let id = wh.id();
        if self.whdrs_cache_ids.insert(id) {
            self.whdrs_cache_order.push(wh);
        }
    }

    fn expected_arrival(&self, prev_hash: &str) -> Option<f64> {
        self.all_blocks
            .get(prev_hash)
            .map(|b| b.effective_ts() + TIME_BETWEEN_BLOCKS)
    }

    pub fn validate_block(&self, block: &Block) -> BlockValidationStatus {
        let id = block.header.id();
        if self.all_blocks.contains_key(&id) {
            return BlockValidationStatus::ExistingBlock;
        }

        let Some(parent) = self.all_blocks.get(&block.header.prev_hash) else {
            return BlockValidationStatus::NonExistingPred;
        };

        if block.header.root != Block::root_for(&block.txns) {
            return BlockValidationStatus::TxnsIntegrity;
        }

        if block.header.whdrs_hash != Self::compute_hash_of_set(&block.weak_hdrs) {
            return BlockValidationStatus::WhdrsIntegrity;
        }

        let strong_target = self.get_next_strong_target(parent);
        if block.header.target != strong_target {
            return BlockValidationStatus::TargetValue;
        }

        if block.header.id_as_int() >= strong_target {
            return BlockValidationStatus::StrongTargetPow;
        }

        if !self.is_genesis(parent) {
            if let Some(expected) = self.expected_arrival(&block.header.prev_hash) {
                if (expected - block.header.timestamp).abs() > TIMESTAMP_RANGE {
                    return BlockValidationStatus::HdrTimestamp;
                }
            }
        }

        for wh in &block.weak_hdrs {
            let status = self.validate_weak_header(wh, &block.header);
            if status != BlockValidationStatus::WhdrOk {
                return status;
            }
        }

        BlockValidationStatus::Ok
    }

    /// Validates `wh` as a sibling of `sibling_hdr` — a block (or in-flight
    /// candidate) it shares a parent and strong target with: same `target`,
    /// same `prev_hash`. Called with a mined block's own header when
    /// checking its committed weak headers, and with the in-progress
    /// candidate header when absorbing a gossiped weak header during
    /// mining (§3, §4.3 item 8).
    pub fn validate_weak_header(&self, wh: &WeakHeader, sibling_hdr: &Header) -> BlockValidationStatus {
        if wh.target != sibling_hdr.target {
            return BlockValidationStatus::WhdrTargetValue;
        }

        if wh.id_as_int() >= wh.weak_target() {
            return BlockValidationStatus::WhdrTargetPow;
        }

        if wh.prev_hash != sibling_hdr.prev_hash {
            return BlockValidationStatus::WhdrPrevHash;
        }

        if !self.is_genesis_prev_hash(&wh.prev_hash) {
            if let Some(expected) = self.expected_arrival(&wh.prev_hash) {
                if (expected - wh.timestamp).abs() > TIMESTAMP_RANGE {
                    return BlockValidationStatus::WhdrTimestamp;
                }
            }
        }

        BlockValidationStatus::WhdrOk
    }

    fn is_genesis_prev_hash(&self, prev_hash: &str) -> bool {
        self.all_blocks
            .get(prev_hash)
            .map(|b| self.is_genesis(b))
            .unwrap_or(false)
    }

    /// Sum of `Block::pow()` from genesis to `block` (or the tip, if
    /// `None`). Recomputed on every call rather than cached (§9).
    pub fn chain_pow(&self, block: Option<&Block>) -> Ratio<BigInt> {
        let start = block.unwrap_or(&self.tip_block);

        let Some(mut cur) = self.all_blocks.get(&start.header.id()) else {
            return start.pow();
        };

        let mut total = Ratio::from_integer(BigInt::from(0));
        loop {
            total += cur.pow();
            if cur.header.prev_hash == Self::genesis_prev_hash() {
                break;
            }
            match self.all_blocks.get(&cur.header.prev_hash) {
                Some(parent) => cur = parent,
                None => break,
            }
        }
        total
    }

    /// The uncommitted weak-header cache's weight, credited toward the tip
    /// when deciding whether to switch forks (§4.5).
    pub fn current_whdrs_pow(&self) -> Ratio<BigInt> {
        let max_t = BigInt::from(max_target());
        let weak_target = BigInt::from(self.tip_block.header.weak_target());
        Ratio::new(max_t, weak_target) * BigInt::from(self.whdrs_cache_order.len() as u64)
    }

    /// Recomputes the strong target every `BLOCKS_TO_CHECK_TARGET` blocks
    /// from the average time between blocks over the preceding window,
    /// otherwise inherits the parent's target (§4.2).
    pub fn get_next_strong_target(&self, prev_block: &Block) -> BigUint {
        let due = !self.is_genesis(prev_block) && prev_block.length % BLOCKS_TO_CHECK_TARGET == 1;
        if !due {
            return prev_block.header.target.clone();
        }

        let mut block_window = BLOCKS_TO_CHECK_TARGET;
        if prev_block.length == BLOCKS_TO_CHECK_TARGET + 1 {
            block_window -= 1; // the window would otherwise include genesis' fixed timestamp
        }

        let mut retro = prev_block;
        for _ in 0..block_window {
            match self.all_blocks.get(&retro.header.prev_hash) {
                Some(parent) => retro = parent,
                None => break,
            }
        }

        let ts_diff = prev_block.effective_ts() - retro.effective_ts();
        let ratio = ts_diff / (block_window as f64 * TIME_BETWEEN_BLOCKS);

        let new_target = scale_biguint_by_f64(&prev_block.header.target, ratio);

        debug!(
            "adjusted strong target from {:.16}.. to {:.16}.. over {} blocks ({:.3}s/block)",
            prev_block.header.target.to_str_radix(16),
            new_target.to_str_radix(16),
            block_window,
            ts_diff / block_window as f64,
        );

        new_target
    }

    /// Full replay of `address`'s balance from genesis to the tip.
    /// Expensive; intended for startup/diagnostic use, not the hot path
    /// (§4.6).
    pub fn balance_of(&self, address: &str) -> Amount {
        let mut total = Amount::ZERO;
        let mut cur = &self.tip_block;

        loop {
            for tx in &cur.txns {
                if tx.receiver == address {
                    total = total.checked_add(tx.amount).expect("balance does not overflow");
                }
                if tx.sender == address {
                    total = total.checked_sub(tx.amount).unwrap_or(Amount::ZERO);
                }
            }

            if cur.header.coinbase == address {
                total = total.checked_add(strong_block_reward()).expect("reward does not overflow");
            }

            let whdr_count = cur.weak_hdrs.iter().filter(|wh| wh.coinbase == address).count() as u64;
            if whdr_count > 0 {
                let reward = Amount::from_hundredths(weak_header_reward().hundredths() * whdr_count);
                total = total.checked_add(reward).expect("reward does not overflow");
            }

            if cur.header.prev_hash == Self::genesis_prev_hash() {
                break;
            }
            match self.all_blocks.get(&cur.header.prev_hash) {
                Some(parent) => cur = parent,
                None => break,
            }
        }

        total
    }

    pub fn compute_hash_of_set(items: &[WeakHeader]) -> String {
        if items.is_empty() {
            return zero_hash();
        }
        let joined = items
            .iter()
            .map(|wh| wh.to_json_string())
            .collect::<Vec<_>>()
            .join("|");
        sha256_hex(joined.as_bytes())
    }

    pub fn block_length_of_mined_tx(&self, tx: &Transaction) -> Option<u64> {
        let mut cur = &self.tip_block;
        let id = tx.id();
        loop {
            if cur.txns.iter().any(|t| t.id() == id) {
                return Some(cur.length);
            }
            if cur.header.prev_hash == Self::genesis_prev_hash() {
                return None;
            }
            match self.all_blocks.get(&cur.header.prev_hash) {
                Some(parent) => cur = parent,
                None => return None,
            }
        }
    }

    /// The chain of blocks from genesis to `tip_hash`, inclusive, oldest
    /// first. `None` if `tip_hash` is unknown.
    pub fn chain_from_tip(&self, tip_hash: &str) -> Option<Vec<Block>> {
        let mut chain = Vec::new();
        let mut cur_hash = tip_hash.to_string();

        if !self.all_blocks.contains_key(&cur_hash) {
            return None;
        }

        while cur_hash != Self::genesis_prev_hash() {
            let block = self.all_blocks.get(&cur_hash)?;
            chain.push(block.clone());
            cur_hash = block.header.prev_hash.clone();
        }

        chain.reverse();
        Some(chain)
    }

    pub fn mainchain(&self) -> Vec<Block> {
        self.chain_from_tip(&self.tip_block.header.id())
            .unwrap_or_default()
    }

    pub fn block_by_length(&self, length: u64) -> Option<Block> {
        if length == 0 || length > self.tip_block.length {
            return None;
        }
        self.mainchain().into_iter().nth((length - 1) as usize)
    }

    /// The outcome of a mining attempt: a freshly mined strong block, or
    /// `None` if mining was abandoned because a competing strong block
    /// arrived on `incoming_blocks` first.
    pub fn mine_next_block(
        &mut self,
        coinbase: &str,
        txns: Vec<Transaction>,
        rng: &mut impl Rng,
        stop: &AtomicBool,
        incoming_weak: &FifoQueue<WeakHeader>,
        incoming_strong: &FifoQueue<Block>,
        mut on_weak_mined: impl FnMut(&WeakHeader),
    ) -> Option<Block> {
        let root = Block::root_for(&txns);
        let ts = now_ts();
        let prev_hash = self.tip_block.header.id();
        let mut whdrs_hash = Self::compute_hash_of_set(&self.whdrs_cache_order);
        let strong_target = self.get_next_strong_target(&self.tip_block);

        while !stop.load(Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_micros(100));

            let nonce = rng.gen_range(0..10_000_000u64);
            let candidate = Header::new(
                prev_hash.clone(),
                ts,
                nonce,
                root.clone(),
                whdrs_hash.clone(),
                coinbase.to_string(),
                strong_target.clone(),
            );
            let id_int = candidate.id_as_int();

            if id_int < candidate.target {
                info!("mined a new strong block");
                let block = Block::new(
                    candidate,
                    self.tip_block.length + 1,
                    txns,
                    std::mem::take(&mut self.whdrs_cache_order),
                );
                self.clear_whdrs_cache();
                return Some(block);
            }

            if id_int < candidate.weak_target() {
                let wh = WeakHeader(candidate.clone());
                if !self.whdrs_cache_ids.contains(&wh.id()) {
                    info!("mined a new weak header");
                    on_weak_mined(&wh);
                    self.insert_whdr(wh);
                    whdrs_hash = Self::compute_hash_of_set(&self.whdrs_cache_order);
                }
            }

            if !incoming_strong.is_empty() {
                return None;
            }

            while let Some(rcv_whdr) = incoming_weak.try_pop() {
                if self.whdrs_cache_ids.contains(&rcv_whdr.id()) {
                    continue;
                }

                let status = self.validate_weak_header(&rcv_whdr, &candidate);
                if status != BlockValidationStatus::WhdrOk {
                    debug!("rejected weak header: {status:?}");
                    continue;
                }

                self.insert_whdr(rcv_whdr);
                whdrs_hash = Self::compute_hash_of_set(&self.whdrs_cache_order);
            }
        }

        None
    }
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_validates_as_its_own_chain() {
        let chain = Blockchain::new();
        assert_eq!(chain.tip_block.length, GENESIS_LEN);
        assert_eq!(chain.mainchain().len(), 1);
    }

    #[test]
    fn chain_pow_of_genesis_is_positive() {
        let chain = Blockchain::new();
        assert!(chain.chain_pow(None) > Ratio::from_integer(BigInt::from(0)));
    }

    #[test]
    fn balance_of_unused_address_is_zero() {
        let chain = Blockchain::new();
        assert_eq!(chain.balance_of("nobody"), Amount::ZERO);
    }

    #[test]
    fn next_strong_target_inherits_before_adjustment_window() {
        let chain = Blockchain::new();
        let target = chain.get_next_strong_target(&chain.tip_block);
        assert_eq!(target, chain.tip_block.header.target);
    }

    #[test]
    fn compute_hash_of_set_is_order_sensitive() {
        let h1 = WeakHeader(Header::new("a", 1.0, 1, "r", "w", "c", init_strong_target()));
        let h2 = WeakHeader(Header::new("b", 2.0, 2, "r", "w", "c", init_strong_target()));
        let ab = Blockchain::compute_hash_of_set(&[h1.clone(), h2.clone()]);
        let ba = Blockchain::compute_hash_of_set(&[h2, h1]);
        assert_ne!(ab, ba);
    }

    /// A target so loose that essentially any header id satisfies it, used
    /// to make mining converge in a handful of nonce attempts in tests
    /// instead of the tens of thousands a real strong target would need.
    fn trivial_target() -> BigUint {
        use num_traits::Num;
        BigUint::from_str_radix(&"f".repeat(64), 16).unwrap()
    }

    /// Replaces `chain`'s genesis block with a copy under `target`, in both
    /// `all_blocks` and `tip_block`, so the two stay consistent (mutating
    /// `tip_block.header.target` alone would change its id without updating
    /// the store's key for it).
    fn retarget_genesis(chain: &mut Blockchain, target: BigUint) {
        let old_id = chain.tip_block.header.id();
        chain.all_blocks.remove(&old_id);
        chain.tip_block.header.target = target;
        let new_genesis = chain.tip_block.clone();
        chain.all_blocks.insert(new_genesis.header.id(), new_genesis);
    }

    fn rng_for(seed: u64) -> rand::rngs::StdRng {
        use rand::SeedableRng;
        rand::rngs::StdRng::seed_from_u64(seed)
    }

    // Scenario 2 (§8): a block mined with zero transactions and zero weak
    // headers advances the tip, credits the coinbase, and validates clean.
    #[test]
    fn single_block_mined_advances_tip_and_credits_coinbase() {
        let mut chain = Blockchain::new();
        retarget_genesis(&mut chain, trivial_target());
        let mut rng = rng_for(1);
        let stop = AtomicBool::new(false);
        let incoming_weak = FifoQueue::new();
        let incoming_strong = FifoQueue::new();

        let block = chain
            .mine_next_block("miner-a", vec![], &mut rng, &stop, &incoming_weak, &incoming_strong, |_| {})
            .expect("mining against a trivial target converges quickly");

        assert!(block.txns.is_empty());
        assert!(block.weak_hdrs.is_empty());
        assert!(chain.validate_block(&block).is_ok());

        chain.add_block(block.clone());
        chain.set_tip(block.clone());
        assert_eq!(chain.tip_block.length, GENESIS_LEN + 1);

        let mut bm = crate::balance::BalanceModel::new(["miner-a".to_string()]);
        bm.update_balances(&block);
        assert_eq!(bm.balance_of("miner-a"), strong_block_reward());
    }

    // Scenario 3 (§8): a block carrying two weak headers from distinct
    // coinbases credits each of them the weak-header reward on top of the
    // strong reward, and its PoW reflects both weak contributions.
    #[test]
    fn block_with_two_weak_headers_credits_both_coinbases() {
        let mut chain = Blockchain::new();
        retarget_genesis(&mut chain, trivial_target());
        let stop = AtomicBool::new(false);
        let incoming_strong = FifoQueue::new();
        let incoming_weak = FifoQueue::new();

        // Two peers' weak headers, arriving before we find our own strong block.
        let wh_a = mine_weak_header_for_test(&chain, "A", 101);
        let wh_b = mine_weak_header_for_test(&chain, "B", 202);
        incoming_weak.push(wh_a);
        incoming_weak.push(wh_b);

        let mut rng = rng_for(2);
        let block = chain
            .mine_next_block("miner-a", vec![], &mut rng, &stop, &incoming_weak, &incoming_strong, |_| {})
            .expect("mining against a trivial target converges quickly");

        assert_eq!(block.weak_hdrs.len(), 2);
        assert!(chain.validate_block(&block).is_ok());

        let mut bm = crate::balance::BalanceModel::new(["miner-a".to_string(), "A".to_string(), "B".to_string()]);
        bm.update_balances(&block);
        assert_eq!(bm.balance_of("miner-a"), strong_block_reward());
        assert_eq!(bm.balance_of("A"), weak_header_reward());
        assert_eq!(bm.balance_of("B"), weak_header_reward());

        let pow_no_weak = Ratio::new(BigInt::from(max_target()), BigInt::from(block.header.target.clone()));
        assert_eq!(block.pow() - pow_no_weak, Ratio::new(BigInt::from(max_target()), BigInt::from(block.header.weak_target())) * BigInt::from(2));
    }

    /// Builds a valid weak header sibling of the block that would next
    /// extend `chain`'s tip under a distinct `coinbase`: same `prev_hash`
    /// (the tip's own id) and same strong target as that candidate block,
    /// for use as "already mined elsewhere" fixtures.
    fn mine_weak_header_for_test(chain: &Blockchain, coinbase: &str, nonce_seed: u64) -> WeakHeader {
        let tip = &chain.tip_block;
        let strong_target = chain.get_next_strong_target(tip);
        let weak_target = &strong_target << super::header::WEAK_TARGET_POWER;
        for nonce in nonce_seed..nonce_seed + 10_000 {
            let h = Header::new(
                tip.header.id(),
                now_ts(),
                nonce,
                "unrelated-root".to_string(),
                zero_hash(),
                coinbase.to_string(),
                strong_target.clone(),
            );
            if h.id_as_int() < weak_target {
                return WeakHeader(h);
            }
        }
        panic!("no valid weak header nonce found in range");
    }

    // Scenario 4 (§8): an alternate branch whose chain weight (including
    // weak headers) exceeds the local tip's weight plus its uncommitted
    // weak-header cache wins the fork and its balances replace the old
    // mainchain's entirely.
    #[test]
    fn heavier_fork_switches_tip_and_rebuilds_balances() {
        let mut chain = Blockchain::new();
        retarget_genesis(&mut chain, trivial_target());
        let stop = AtomicBool::new(false);
        let incoming_weak = FifoQueue::new();
        let incoming_strong = FifoQueue::new();

        // Local branch: one block mined by "local-miner".
        let mut rng = rng_for(10);
        let local_block = chain
            .mine_next_block("local-miner", vec![], &mut rng, &stop, &incoming_weak, &incoming_strong, |_| {})
            .unwrap();
        chain.add_block(local_block.clone());
        chain.set_tip(local_block.clone());

        // Build a competing 2-block branch off genesis (heavier: twice as
        // many strong blocks), mined under a fresh chain view rooted at the
        // same genesis, by a different miner.
        let mut fork_chain = Blockchain::new();
        retarget_genesis(&mut fork_chain, trivial_target());
        let fork_block_1 = fork_chain
            .mine_next_block("fork-miner", vec![], &mut rng_for(20), &stop, &incoming_weak, &incoming_strong, |_| {})
            .unwrap();
        fork_chain.add_block(fork_block_1.clone());
        fork_chain.set_tip(fork_block_1.clone());
        let fork_block_2 = fork_chain
            .mine_next_block("fork-miner", vec![], &mut rng_for(21), &stop, &incoming_weak, &incoming_strong, |_| {})
            .unwrap();

        // Splice the fork's two blocks into the local store and switch.
        chain.add_block(fork_block_1.clone());
        chain.add_block(fork_block_2.clone());

        let challenger_pow = chain.chain_pow(Some(&fork_block_2));
        let current_pow = chain.chain_pow(None) + chain.current_whdrs_pow();
        assert!(challenger_pow > current_pow, "a 2-block fork must outweigh a 1-block mainchain");

        chain.set_tip(fork_block_2.clone());
        let mut bm = crate::balance::BalanceModel::new(["local-miner".to_string(), "fork-miner".to_string()]);
        bm.rebuild_after_fork(&chain);

        assert_eq!(bm.balance_of("fork-miner"), Amount::from_units(STRONG_BLOCK_REWARD * 2));
        assert_eq!(bm.balance_of("local-miner"), Amount::ZERO);
        assert_eq!(chain.tip_block.header.id(), fork_block_2.header.id());
    }
}
