//! Deterministic wallet simulator for comparing selection policies.
//!
//! The simulator consumes a stream of events and maintains a toy wallet:
//! deposits extend the UTxO, payments run the policy under study, and slot
//! boundaries promote change back into the UTxO according to a commit
//! policy. Everything is synchronous and deterministic, so two runs over the
//! same stream and seed produce identical reports.

use crate::error::PolicyError;
use crate::policy::{InputSelectionPolicy, SelectionStats};
use galleon_core::{Address, Coin, TxHash, TxIn, TxOut, Utxo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::VecDeque;
use tracing::debug;

/// One event of a simulation stream.
#[derive(Debug, Clone)]
pub enum WalletEvent {
    /// Funds arrive from outside.
    Deposit(Utxo),
    /// The wallet is asked to pay these outputs.
    Pay(Vec<TxOut>),
    /// A slot boundary; pending change is promoted per the commit policy.
    NextSlot,
}

/// How much pending change a slot boundary confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Promote everything (the classic assumption).
    All,
    /// Promote only the `n` oldest pending change outputs per slot,
    /// modelling slow confirmation.
    Oldest(usize),
}

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Slot-boundary commit behavior.
    pub commit: CommitPolicy,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            commit: CommitPolicy::All,
        }
    }
}

/// A fixed-width histogram over small counts (input counts, change counts).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    buckets: BTreeMap<u64, u64>,
}

impl Histogram {
    /// Record one observation.
    pub fn record(&mut self, value: u64) {
        *self.buckets.entry(value).or_insert(0) += 1;
    }

    /// Observations at exactly `value`.
    pub fn count(&self, value: u64) -> u64 {
        self.buckets.get(&value).copied().unwrap_or(0)
    }

    /// Total number of observations.
    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// Iterate (value, count) pairs in ascending value order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.buckets.iter().map(|(value, count)| (*value, *count))
    }
}

/// UTxO shape sampled at a slot boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotSample {
    /// Slot number.
    pub slot: u64,
    /// UTxO entry count after the boundary.
    pub utxo_size: usize,
    /// Confirmed balance after the boundary.
    pub balance: Coin,
    /// Change outputs still awaiting promotion.
    pub pending_change: usize,
}

/// The output of a simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimReport {
    /// Per-payment selection diagnostics, in stream order.
    pub payments: Vec<SelectionStats>,
    /// Payments the policy failed, with the failure kind name.
    pub failures: Vec<String>,
    /// UTxO shape over time, one sample per slot boundary.
    pub slots: Vec<SlotSample>,
    /// Distribution of inputs per successful payment.
    pub inputs_per_payment: Histogram,
    /// Distribution of change outputs per successful payment.
    pub change_per_payment: Histogram,
}

/// A wallet driven by an event stream and a selection policy.
pub struct Simulator<P> {
    policy: P,
    config: SimConfig,
    utxo: Utxo,
    pending_change: VecDeque<Coin>,
    slot: u64,
    change_counter: u64,
    report: SimReport,
}

impl<P: InputSelectionPolicy> Simulator<P> {
    /// Create a simulator with an empty wallet.
    pub fn new(policy: P, config: SimConfig) -> Self {
        Self {
            policy,
            config,
            utxo: Utxo::new(),
            pending_change: VecDeque::new(),
            slot: 0,
            change_counter: 0,
            report: SimReport::default(),
        }
    }

    /// Current confirmed UTxO.
    pub fn utxo(&self) -> &Utxo {
        &self.utxo
    }

    /// Consume one event.
    pub fn step(&mut self, event: WalletEvent) {
        match event {
            WalletEvent::Deposit(deposit) => {
                debug!(outputs = deposit.len(), "deposit");
                self.utxo.extend(deposit);
            }
            WalletEvent::Pay(payments) => self.pay(&payments),
            WalletEvent::NextSlot => self.next_slot(),
        }
    }

    /// Consume a whole stream and return the report.
    pub fn run(mut self, events: impl IntoIterator<Item = WalletEvent>) -> SimReport {
        for event in events {
            self.step(event);
        }
        self.finish()
    }

    /// Finish the run and hand back the report.
    pub fn finish(self) -> SimReport {
        self.report
    }

    fn pay(&mut self, payments: &[TxOut]) {
        match self.policy.select(&self.utxo, payments) {
            Ok((selection, stats)) => {
                for (txin, _) in &selection.inputs {
                    self.utxo.remove(txin);
                }
                for change in &selection.change {
                    self.pending_change.push_back(*change);
                }
                self.report.inputs_per_payment.record(stats.inputs_used as u64);
                self.report
                    .change_per_payment
                    .record(stats.change_outputs as u64);
                self.report.payments.push(stats);
            }
            Err(err) => {
                debug!(%err, "payment failed");
                self.report.failures.push(failure_kind(&err).to_string());
            }
        }
    }

    fn next_slot(&mut self) {
        self.slot += 1;
        let promote = match self.config.commit {
            CommitPolicy::All => self.pending_change.len(),
            CommitPolicy::Oldest(n) => n.min(self.pending_change.len()),
        };
        for _ in 0..promote {
            let value = self.pending_change.pop_front().expect("counted above");
            let txin = self.fresh_change_ref();
            self.utxo
                .insert(txin, TxOut::new(change_address(self.change_counter), value));
        }

        let balance: Coin = self.utxo.values().map(|out| out.value).sum();
        self.report.slots.push(SlotSample {
            slot: self.slot,
            utxo_size: self.utxo.len(),
            balance,
            pending_change: self.pending_change.len(),
        });
    }

    fn fresh_change_ref(&mut self) -> TxIn {
        self.change_counter += 1;
        let mut tag = b"sim-change-".to_vec();
        tag.extend_from_slice(&self.change_counter.to_be_bytes());
        TxIn::new(TxHash::digest(&tag), 0)
    }
}

fn change_address(counter: u64) -> Address {
    let mut bytes = b"sim-addr-".to_vec();
    bytes.extend_from_slice(&counter.to_be_bytes());
    Address::opaque(bytes)
}

fn failure_kind(err: &PolicyError) -> &'static str {
    match err {
        PolicyError::InsufficientFunds { .. } => "insufficient-funds",
        PolicyError::NoSuitableInputs => "no-suitable-inputs",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LargestFirst;

    fn deposit(values: &[Coin]) -> WalletEvent {
        let mut utxo = Utxo::new();
        for (idx, value) in values.iter().enumerate() {
            utxo.insert(
                TxIn::new(TxHash::digest(&[idx as u8, 0xd0]), idx as u32),
                TxOut::new(Address::opaque(vec![idx as u8; 8]), *value),
            );
        }
        WalletEvent::Deposit(utxo)
    }

    fn pay(value: Coin) -> WalletEvent {
        WalletEvent::Pay(vec![TxOut::new(Address::opaque(vec![0xee; 8]), value)])
    }

    #[test]
    fn deposits_and_payments_update_the_utxo() {
        let mut sim = Simulator::new(LargestFirst, SimConfig::default());
        sim.step(deposit(&[500, 300]));
        assert_eq!(sim.utxo().len(), 2);

        sim.step(pay(400));
        // Largest (500) spent, change 100 pending until the slot boundary.
        assert_eq!(sim.utxo().len(), 1);

        sim.step(WalletEvent::NextSlot);
        assert_eq!(sim.utxo().len(), 2);

        let report = sim.finish();
        assert_eq!(report.payments.len(), 1);
        assert_eq!(report.slots.last().unwrap().balance, 400);
    }

    #[test]
    fn histogram_counts_observations() {
        let mut histogram = Histogram::default();
        histogram.record(1);
        histogram.record(1);
        histogram.record(3);
        assert_eq!(histogram.count(1), 2);
        assert_eq!(histogram.count(2), 0);
        assert_eq!(histogram.total(), 3);
    }

    #[test]
    fn partial_commit_promotes_oldest_first() {
        let mut sim = Simulator::new(
            LargestFirst,
            SimConfig {
                commit: CommitPolicy::Oldest(1),
            },
        );
        sim.step(deposit(&[1_000, 900]));
        sim.step(pay(100)); // change 900 pending
        sim.step(pay(100)); // change 800 pending
        sim.step(WalletEvent::NextSlot);

        let report = sim.finish();
        let sample = report.slots.last().unwrap();
        assert_eq!(sample.pending_change, 1);
        // Only the older change (900) was promoted.
        assert_eq!(sample.balance, 900);
        assert_eq!(sample.utxo_size, 1);
    }

    #[test]
    fn failed_payments_are_recorded_not_fatal() {
        let report = Simulator::new(LargestFirst, SimConfig::default()).run([
            deposit(&[50]),
            pay(100),
            WalletEvent::NextSlot,
        ]);
        assert_eq!(report.failures, vec!["insufficient-funds".to_string()]);
        assert!(report.payments.is_empty());
    }
}
