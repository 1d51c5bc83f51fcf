//! A strong block: a header plus the weak headers and transactions it
//! commits to (§3, §4.1, §4.2).

use num_bigint::BigInt;
use num_rational::Ratio;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::header::{max_target, Header, WeakHeader, WEAK_TARGET_POWER};
use super::transaction::Transaction;
use crate::crypto::merkle::MerkleTree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub length: u64,
    pub txns: Vec<Transaction>,
    pub weak_hdrs: Vec<WeakHeader>,
}

impl Block {
    /// Builds a block with `header.root` and `header.whdrs_hash` already
    /// populated from `txns`/`whdrs` by the caller (typically
    /// `Blockchain::mine_next_block`).
    pub fn new(header: Header, length: u64, txns: Vec<Transaction>, whdrs: Vec<WeakHeader>) -> Self {
        Block {
            header,
            length,
            txns,
            weak_hdrs: whdrs,
        }
    }

    pub fn root_for(txns: &[Transaction]) -> String {
        let leaves: Vec<String> = txns.iter().map(|t| t.to_json_string()).collect();
        MerkleTree::compute_root(&leaves)
    }

    /// Proof-of-work weight: the strong header's contribution plus one
    /// weak-target's worth of contribution per weak header collected.
    /// Computed as an exact rational, never cached (§9).
    pub fn pow(&self) -> Ratio<BigInt> {
        let max_t = BigInt::from(max_target());
        let target = BigInt::from(self.header.target.clone());
        let weak_target = BigInt::from(self.header.weak_target());

        let strong_component = Ratio::new(max_t.clone(), target);
        let weak_unit = Ratio::new(max_t, weak_target);
        strong_component + weak_unit * BigInt::from(self.weak_hdrs.len() as u64)
    }

    pub fn pow_f64(&self) -> f64 {
        let r = self.pow();
        r.numer().to_f64().unwrap_or(f64::MAX) / r.denom().to_f64().unwrap_or(1.0)
    }

    /// The effective timestamp: the strong header's own timestamp blended
    /// with its weak headers', each weak header weighted by
    /// `target / weak_target = 2^-WEAK_TARGET_POWER` relative to the strong
    /// header's weight of 1.
    pub fn effective_ts(&self) -> f64 {
        let ratio_wh = 1.0 / (1u64 << WEAK_TARGET_POWER) as f64;
        let mut sum_ts = self.header.timestamp;
        let mut sum_weight = 1.0;
        for wh in &self.weak_hdrs {
            sum_ts += ratio_wh * wh.timestamp;
            sum_weight += ratio_wh;
        }
        sum_ts / sum_weight
    }

    pub fn to_short_str(&self) -> String {
        format!(
            "[{:>3}] | H = {}, CB = {}, WHs = {:>2}, TXNs = {:>2}, target_s = {}, target_w = {}, PoW = {:>7.1}|",
            self.length,
            &self.header.id()[..16],
            &self.header.coinbase[..self.header.coinbase.len().min(16)],
            self.weak_hdrs.len(),
            self.txns.len(),
            &format!("{:064x}", self.header.target)[..16],
            &format!("{:064x}", self.header.weak_target())[..16],
            self.pow_f64(),
        )
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string_pretty(self).expect("Block serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::header::init_strong_target;

    fn empty_header() -> Header {
        Header::new(
            "0".repeat(64),
            1000.0,
            0,
            Block::root_for(&[]),
            "0".repeat(64),
            "c".repeat(96),
            init_strong_target(),
        )
    }

    #[test]
    fn pow_with_no_weak_headers_is_max_over_target() {
        let header = empty_header();
        let block = Block::new(header.clone(), 1, vec![], vec![]);
        let expected = Ratio::new(
            BigInt::from(max_target()),
            BigInt::from(header.target.clone()),
        );
        assert_eq!(block.pow(), expected);
    }

    #[test]
    fn pow_strictly_increases_with_each_weak_header() {
        let header = empty_header();
        let no_weak = Block::new(header.clone(), 1, vec![], vec![]);
        let one_weak = Block::new(header.clone(), 1, vec![], vec![WeakHeader(header.clone())]);
        assert!(one_weak.pow() > no_weak.pow());
    }

    #[test]
    fn effective_ts_with_no_weak_headers_is_own_timestamp() {
        let header = empty_header();
        let block = Block::new(header.clone(), 1, vec![], vec![]);
        assert_eq!(block.effective_ts(), header.timestamp);
    }

    #[test]
    fn effective_ts_blends_toward_weak_header_time() {
        let mut header = empty_header();
        header.timestamp = 1000.0;
        let mut wh = header.clone();
        wh.timestamp = 2000.0;
        let block = Block::new(header.clone(), 1, vec![], vec![WeakHeader(wh)]);
        let ts = block.effective_ts();
        assert!(ts > 1000.0 && ts < 2000.0);
    }

    #[test]
    fn root_for_empty_txns_matches_empty_merkle_root() {
        assert_eq!(Block::root_for(&[]).len(), 64);
    }
}
