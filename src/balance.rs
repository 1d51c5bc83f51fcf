//! Account balance model: incremental updates as blocks are mined/received,
//! plus full-replay rebuilds after a fork switch (§4.6).
//!
//! `Amount` is unsigned, so the original's explicit "amount is negative"
//! rejection is structurally impossible here and is not reproduced; every
//! other check (`Transaction::validate_sig`, insufficient balance) still
//! applies.

use std::collections::HashMap;

use crate::blockchain::chain::{strong_block_reward, weak_header_reward};
use crate::blockchain::{Amount, Block, Blockchain, Transaction};

#[derive(Debug, Clone, Default)]
pub struct BalanceModel {
    balances: HashMap<String, Amount>,
}

impl BalanceModel {
    pub fn new(known_addresses: impl IntoIterator<Item = String>) -> Self {
        let mut balances = HashMap::new();
        for addr in known_addresses {
            balances.entry(addr).or_insert(Amount::ZERO);
        }
        BalanceModel { balances }
    }

    pub fn balance_of(&self, address: &str) -> Amount {
        self.balances.get(address).copied().unwrap_or(Amount::ZERO)
    }

    pub fn all_balances(&self) -> &HashMap<String, Amount> {
        &self.balances
    }

    pub fn ensure_address(&mut self, address: &str) {
        self.balances.entry(address.to_string()).or_insert(Amount::ZERO);
    }

    /// Applies a newly accepted block's transactions and rewards.
    pub fn update_balances(&mut self, block: &Block) {
        for tx in &block.txns {
            self.debit(&tx.sender, tx.amount);
            self.credit(&tx.receiver, tx.amount);
        }

        self.credit(&block.header.coinbase, strong_block_reward());
        for wh in &block.weak_hdrs {
            self.credit(&wh.coinbase, weak_header_reward());
        }
    }

    fn debit(&mut self, address: &str, amount: Amount) {
        let entry = self.balances.entry(address.to_string()).or_insert(Amount::ZERO);
        *entry = entry.checked_sub(amount).unwrap_or(Amount::ZERO);
    }

    fn credit(&mut self, address: &str, amount: Amount) {
        let entry = self.balances.entry(address.to_string()).or_insert(Amount::ZERO);
        *entry = entry.checked_add(amount).expect("account balance does not overflow");
    }

    /// Checks every transaction's signature and that senders can afford it,
    /// applying debits/credits against a scratch copy of the balances so a
    /// later transaction in the same block sees its predecessors' effects.
    pub fn check_balances_and_sigs(&self, txns: &[Transaction]) -> bool {
        let mut scratch = self.balances.clone();

        for tx in txns {
            if !tx.validate_sig() {
                return false;
            }

            let sender_balance = scratch.entry(tx.sender.clone()).or_insert(Amount::ZERO);
            match sender_balance.checked_sub(tx.amount) {
                Some(remaining) => *sender_balance = remaining,
                None => return false,
            }

            let receiver_balance = scratch.entry(tx.receiver.clone()).or_insert(Amount::ZERO);
            *receiver_balance = receiver_balance
                .checked_add(tx.amount)
                .expect("account balance does not overflow");
        }

        true
    }

    /// Filters a transaction pool down to the ones that validate and can
    /// be afforded in order, matching the original's order-sensitive
    /// filtering (§4.6).
    pub fn filter_out_invalid_txns(&self, txns: Vec<Transaction>) -> Vec<Transaction> {
        let mut scratch = self.balances.clone();
        let mut valid = Vec::with_capacity(txns.len());

        for tx in txns {
            if !tx.validate_sig() {
                continue;
            }

            let sender_balance = scratch.entry(tx.sender.clone()).or_insert(Amount::ZERO);
            let remaining = match sender_balance.checked_sub(tx.amount) {
                Some(r) => r,
                None => continue,
            };
            *sender_balance = remaining;

            let receiver_balance = scratch.entry(tx.receiver.clone()).or_insert(Amount::ZERO);
            *receiver_balance = receiver_balance
                .checked_add(tx.amount)
                .expect("account balance does not overflow");

            valid.push(tx);
        }

        valid
    }

    /// Replays every known address's balance from genesis against `chain`.
    /// Expensive; only called right after a fork switch (§4.5, §4.6).
    pub fn rebuild_after_fork(&mut self, chain: &Blockchain) {
        let addresses: Vec<String> = self.balances.keys().cloned().collect();
        for address in addresses {
            let balance = chain.balance_of(&address);
            self.balances.insert(address, balance);
        }
    }
}
