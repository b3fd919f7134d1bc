//! The active kernel: passive kernel plus submission and diffusion.
//!
//! Locally built transactions enter through [`ActiveKernel::new_pending`];
//! a background ticker retransmits them until a block resolves them or the
//! backoff policy gives up. Within one tick, store cancellation happens
//! before any network send, and no lock is held across a send.

use crate::clock::Clock;
use crate::diffusion::Diffusion;
use crate::error::NewPendingError;
use crate::kernel::PassiveKernel;
use crate::shutdown::{ShutdownSignal, ShutdownToken};
use crate::submission::{ResubmitPolicy, Submission};
use galleon_core::{AccountId, ResolvedBlock, Tx};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Configuration for an active kernel's background ticker.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    /// Interval between submission ticks.
    pub tick_interval: Duration,
    /// Resubmission backoff policy.
    pub resubmit: ResubmitPolicy,
}

impl Default for ActiveConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            resubmit: ResubmitPolicy::default(),
        }
    }
}

/// The active wallet kernel.
pub struct ActiveKernel {
    passive: Arc<PassiveKernel>,
    submission: Mutex<Submission>,
    diffusion: Arc<dyn Diffusion>,
}

impl ActiveKernel {
    /// Compose an active kernel from its parts.
    pub fn new(
        passive: Arc<PassiveKernel>,
        diffusion: Arc<dyn Diffusion>,
        clock: Arc<dyn Clock>,
        policy: ResubmitPolicy,
    ) -> Self {
        Self {
            passive,
            submission: Mutex::new(Submission::new(clock, policy)),
            diffusion,
        }
    }

    /// The underlying passive kernel.
    pub fn passive(&self) -> &Arc<PassiveKernel> {
        &self.passive
    }

    /// Record and schedule a locally built transaction.
    ///
    /// The store commit and the submission registration are not atomic
    /// under a crash; the store is authoritative and
    /// [`resync_from_store`](Self::resync_from_store) rebuilds the queue.
    pub fn new_pending(&self, account: AccountId, tx: Tx) -> Result<(), NewPendingError> {
        self.passive.store().new_pending(account, tx.clone())?;
        self.submission.lock().add_pending(account, [(tx.id(), tx)]);
        Ok(())
    }

    /// Apply a block and retire the submission records it resolved.
    pub fn apply_block(&self, block: &ResolvedBlock) {
        let resolved = self.passive.apply_block(block);
        if resolved.is_empty() {
            return;
        }
        let mut submission = self.submission.lock();
        for (account, tx_ids) in resolved {
            for tx_id in tx_ids {
                submission.remove(&account, &tx_id);
            }
        }
    }

    /// Rebuild the submission queue from the store's pending sets.
    ///
    /// Entries without a backing pending transaction are dropped; pending
    /// transactions without an entry are scheduled from scratch.
    pub fn resync_from_store(&self) {
        let view = self.passive.snapshot();
        let mut submission = self.submission.lock();

        let mut valid = BTreeSet::new();
        for (account, state) in view.wallets().accounts() {
            for tx_id in state.pending.keys() {
                valid.insert((account, *tx_id));
            }
        }
        for (account, tx_id) in submission.tracked() {
            if !valid.contains(&(account, tx_id)) {
                submission.remove(&account, &tx_id);
            }
        }
        for (account, state) in view.wallets().accounts() {
            let missing: Vec<_> = state
                .pending
                .iter()
                .filter(|(tx_id, _)| !submission.contains(&account, tx_id))
                .map(|(tx_id, tx)| (*tx_id, tx.clone()))
                .collect();
            if !missing.is_empty() {
                submission.add_pending(account, missing);
            }
        }
        debug!(entries = submission.len(), "submission queue resynced from store");
    }

    /// Run one submission tick: cancel exhausted entries in the store, then
    /// transmit everything due, in order, holding no locks.
    pub async fn tick_once(&self) {
        let outcome = self.submission.lock().tick();
        if !outcome.cancelled.is_empty() {
            self.passive.store().cancel_pending(outcome.cancelled);
        }
        for tx in &outcome.to_send {
            if let Err(err) = self.diffusion.send_tx(tx).await {
                warn!(%err, "transaction send failed, will retry on a later tick");
            }
        }
    }

    /// Tick on `interval` until shutdown is signalled.
    pub async fn run_ticker(self: Arc<Self>, interval: Duration, mut signal: ShutdownSignal) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = signal.wait() => {
                    debug!("submission ticker shutting down");
                    return;
                }
                _ = ticker.tick() => self.tick_once().await,
            }
        }
    }
}

/// Run `f` with an active kernel whose ticker is guaranteed to be torn down
/// before this function returns, on every exit path including panics.
pub async fn bracket_active_wallet<F, Fut, T>(
    passive: Arc<PassiveKernel>,
    diffusion: Arc<dyn Diffusion>,
    clock: Arc<dyn Clock>,
    config: ActiveConfig,
    f: F,
) -> T
where
    F: FnOnce(Arc<ActiveKernel>) -> Fut,
    Fut: Future<Output = T>,
{
    let kernel = Arc::new(ActiveKernel::new(
        passive,
        diffusion,
        clock,
        config.resubmit,
    ));
    let (token, signal) = ShutdownToken::new();
    let handle = tokio::spawn(Arc::clone(&kernel).run_ticker(config.tick_interval, signal));

    let mut guard = TickerGuard {
        token,
        handle: Some(handle),
    };
    let result = f(kernel).await;
    guard.finish().await;
    result
}

/// Tears the ticker down gracefully on the normal path and aborts it if the
/// bracketed future is dropped mid-flight.
struct TickerGuard {
    token: ShutdownToken,
    handle: Option<JoinHandle<()>>,
}

impl TickerGuard {
    async fn finish(&mut self) {
        self.token.shutdown();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TickerGuard {
    fn drop(&mut self) {
        self.token.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
