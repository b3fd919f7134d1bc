//! Resubmission scheduling for locally issued transactions.
//!
//! Every pending transaction the wallet submits is tracked here with an
//! attempt counter and a due time. Each tick dispatches the entries that are
//! due, pushes their due time out by an exponential backoff, and retires the
//! ones that have exhausted their attempts. Entry lifecycle:
//!
//! ```text
//!    added ──► scheduled ──tick(due)──► dispatched ──► scheduled (attempts+1)
//!                                               └──(attempts = cap)──► cancelled
//!    scheduled ──remove──► removed
//! ```

use crate::clock::Clock;
use galleon_core::{AccountId, Tx, TxId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Exponential backoff parameters for resubmission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResubmitPolicy {
    /// Backoff base; the wait before attempt `k` is `base^k` slots.
    pub base: f64,
    /// Attempts before an entry is declared cancelled.
    pub max_attempts: u32,
    /// Length of one backoff slot in microseconds.
    pub slot_micros: u64,
}

impl ResubmitPolicy {
    /// Wait before attempt `attempts`, in microseconds. Saturates rather
    /// than overflowing for large exponents.
    pub fn wait_micros(&self, attempts: u32) -> u64 {
        let scaled = self.base.powi(attempts as i32) * self.slot_micros as f64;
        if scaled >= u64::MAX as f64 {
            u64::MAX
        } else {
            scaled as u64
        }
    }
}

impl Default for ResubmitPolicy {
    fn default() -> Self {
        Self {
            base: 1.25,
            max_attempts: 255,
            slot_micros: 1_000_000,
        }
    }
}

#[derive(Debug, Clone)]
struct ScheduledTx {
    body: Tx,
    attempts: u32,
    next_due_micros: u64,
}

/// What one tick decided.
///
/// `cancelled` and `to_send` are disjoint: an entry either retires or is
/// dispatched, never both.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Entries that exhausted their attempts this tick, removed from the
    /// queue. The caller drops them from the store.
    pub cancelled: BTreeMap<AccountId, BTreeSet<TxId>>,
    /// Bodies due for retransmission, ordered by due time (earliest first).
    pub to_send: Vec<Tx>,
}

/// The pending-transaction submission queue.
pub struct Submission {
    clock: Arc<dyn Clock>,
    policy: ResubmitPolicy,
    queue: BTreeMap<(AccountId, TxId), ScheduledTx>,
}

impl Submission {
    /// Create an empty queue over the given clock and policy.
    pub fn new(clock: Arc<dyn Clock>, policy: ResubmitPolicy) -> Self {
        Self {
            clock,
            policy,
            queue: BTreeMap::new(),
        }
    }

    /// Enqueue transactions with zero attempts, due immediately.
    ///
    /// Re-adding a tracked entry resets its schedule.
    pub fn add_pending(
        &mut self,
        account: AccountId,
        txs: impl IntoIterator<Item = (TxId, Tx)>,
    ) {
        let now = self.clock.now_micros();
        for (tx_id, body) in txs {
            debug!(account = %account, tx = %tx_id, "scheduling transaction for submission");
            self.queue.insert(
                (account, tx_id),
                ScheduledTx {
                    body,
                    attempts: 0,
                    next_due_micros: now,
                },
            );
        }
    }

    /// Drop an entry, typically because its transaction confirmed.
    pub fn remove(&mut self, account: &AccountId, tx_id: &TxId) {
        if self.queue.remove(&(*account, *tx_id)).is_some() {
            debug!(account = %account, tx = %tx_id, "submission entry removed");
        }
    }

    /// Whether an entry is currently tracked.
    pub fn contains(&self, account: &AccountId, tx_id: &TxId) -> bool {
        self.queue.contains_key(&(*account, *tx_id))
    }

    /// Keys of every tracked entry.
    pub fn tracked(&self) -> Vec<(AccountId, TxId)> {
        self.queue.keys().copied().collect()
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Advance the schedule once. Never fails; an idle queue produces an
    /// empty outcome.
    ///
    /// Each due entry is handled exactly once per tick: retired if its
    /// attempts are exhausted, otherwise dispatched with its counter bumped
    /// and its due time pushed out by the policy.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now_micros();
        let mut outcome = TickOutcome::default();

        let mut due: Vec<(AccountId, TxId, u64)> = self
            .queue
            .iter()
            .filter(|(_, entry)| entry.next_due_micros <= now)
            .map(|((account, tx_id), entry)| (*account, *tx_id, entry.next_due_micros))
            .collect();
        // Earliest due first; key order breaks ties deterministically.
        due.sort_by_key(|(account, tx_id, due_micros)| (*due_micros, *account, *tx_id));

        for (account, tx_id, _) in due {
            let entry = self
                .queue
                .get_mut(&(account, tx_id))
                .expect("due entry vanished mid-tick");
            if entry.attempts >= self.policy.max_attempts {
                info!(
                    account = %account,
                    tx = %tx_id,
                    attempts = entry.attempts,
                    "submission attempts exhausted, cancelling"
                );
                self.queue.remove(&(account, tx_id));
                outcome
                    .cancelled
                    .entry(account)
                    .or_default()
                    .insert(tx_id);
            } else {
                entry.attempts += 1;
                entry.next_due_micros = now + self.policy.wait_micros(entry.attempts);
                debug!(
                    account = %account,
                    tx = %tx_id,
                    attempts = entry.attempts,
                    next_due_micros = entry.next_due_micros,
                    "dispatching transaction"
                );
                outcome.to_send.push(entry.body.clone());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use galleon_core::{Address, RootId, TxHash, TxIn, TxOut};

    fn account(tag: u8) -> AccountId {
        AccountId::new(RootId([tag; 32]), 0)
    }

    fn tx(tag: &[u8]) -> (TxId, Tx) {
        let body = Tx::new(
            vec![TxIn::new(TxHash::digest(tag), 0)],
            vec![TxOut::new(Address::opaque(tag.to_vec()), 1)],
        );
        (body.id(), body)
    }

    fn submission(clock: &ManualClock, policy: ResubmitPolicy) -> Submission {
        Submission::new(Arc::new(clock.clone()), policy)
    }

    #[test]
    fn backoff_follows_the_policy_schedule() {
        let clock = ManualClock::new();
        let mut sub = submission(&clock, ResubmitPolicy::default());
        let (id, body) = tx(b"s4");
        sub.add_pending(account(1), [(id, body)]);

        // t = 1.0s: due, first attempt.
        clock.set_micros(1_000_000);
        let out = sub.tick();
        assert_eq!(out.to_send.len(), 1);

        // t = 1.5s: next due is 1s + 1.25s = 2.25s, so nothing happens.
        clock.set_micros(1_500_000);
        assert!(sub.tick().to_send.is_empty());

        // t = 2.25s: second attempt.
        clock.set_micros(2_250_000);
        let out = sub.tick();
        assert_eq!(out.to_send.len(), 1);
        assert!(out.cancelled.is_empty());
    }

    #[test]
    fn attempts_exhausted_moves_entry_to_cancelled() {
        let clock = ManualClock::new();
        let policy = ResubmitPolicy {
            max_attempts: 3,
            ..ResubmitPolicy::default()
        };
        let mut sub = submission(&clock, policy);
        let (id, body) = tx(b"s5");
        let acct = account(1);
        sub.add_pending(acct, [(id, body)]);

        for _ in 0..3 {
            // Jump far enough that the entry is always due again.
            clock.advance_micros(60_000_000);
            let out = sub.tick();
            assert_eq!(out.to_send.len(), 1);
            assert!(out.cancelled.is_empty());
        }

        clock.advance_micros(60_000_000);
        let out = sub.tick();
        assert!(out.to_send.is_empty());
        assert_eq!(out.cancelled[&acct], [id].into_iter().collect());
        assert!(sub.is_empty());

        // Subsequent ticks are quiet.
        clock.advance_micros(60_000_000);
        let out = sub.tick();
        assert!(out.to_send.is_empty() && out.cancelled.is_empty());
    }

    #[test]
    fn cancelled_and_to_send_are_disjoint() {
        let clock = ManualClock::new();
        let policy = ResubmitPolicy {
            max_attempts: 1,
            ..ResubmitPolicy::default()
        };
        let mut sub = submission(&clock, policy);
        let (id_a, body_a) = tx(b"fresh");
        let (id_b, body_b) = tx(b"spent");
        sub.add_pending(account(1), [(id_b, body_b)]);

        // Exhaust entry b's single attempt.
        clock.advance_micros(10_000_000);
        assert_eq!(sub.tick().to_send.len(), 1);

        // Now add a fresh entry; next tick must cancel b and send a.
        sub.add_pending(account(1), [(id_a, body_a.clone())]);
        clock.advance_micros(10_000_000);
        let out = sub.tick();
        assert_eq!(out.to_send, vec![body_a]);
        assert_eq!(out.cancelled[&account(1)], [id_b].into_iter().collect());
    }

    #[test]
    fn earlier_due_entries_dispatch_first() {
        let clock = ManualClock::new();
        let mut sub = submission(&clock, ResubmitPolicy::default());
        let (id_a, body_a) = tx(b"first");
        let (id_b, body_b) = tx(b"second");

        clock.set_micros(100);
        sub.add_pending(account(1), [(id_a, body_a.clone())]);
        clock.set_micros(200);
        sub.add_pending(account(2), [(id_b, body_b.clone())]);

        clock.set_micros(1_000_000);
        let out = sub.tick();
        assert_eq!(out.to_send, vec![body_a, body_b]);
    }

    #[test]
    fn remove_forgets_the_entry() {
        let clock = ManualClock::new();
        let mut sub = submission(&clock, ResubmitPolicy::default());
        let (id, body) = tx(b"confirmed");
        let acct = account(1);
        sub.add_pending(acct, [(id, body)]);
        assert!(sub.contains(&acct, &id));

        sub.remove(&acct, &id);
        assert!(!sub.contains(&acct, &id));
        clock.advance_micros(10_000_000);
        let out = sub.tick();
        assert!(out.to_send.is_empty() && out.cancelled.is_empty());
        // Removing again is harmless.
        sub.remove(&acct, &id);
    }

    #[test]
    fn wait_grows_exponentially_and_saturates() {
        let policy = ResubmitPolicy::default();
        for k in 1..40u32 {
            let ratio = policy.wait_micros(k) as f64 / policy.wait_micros(k - 1) as f64;
            assert!((ratio - 1.25).abs() < 0.01, "ratio at {k} was {ratio}");
        }
        // 1.25^255 seconds overflows u64 micros; the wait saturates.
        assert_eq!(policy.wait_micros(255), u64::MAX);
    }
}
