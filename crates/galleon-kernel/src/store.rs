//! The transactional HD wallet store.
//!
//! All mutation goes through a closed set of [`Command`]s applied by a pure
//! step function to a cloned copy of the state; the new tree is swapped in
//! only when the whole command succeeds, so commits are atomic and readers
//! never observe partial state. Readers take a [`DbView`]: a cheap `Arc`
//! snapshot consistent at a single commit boundary.

use crate::error::{CreateHdRootError, NewPendingError, QueryError};
use galleon_core::{
    utxo_total, AccountId, BlockMeta, Coin, PrefilteredBlock, RootId, RootRecord, Tx, TxId, TxIn,
    Utxo,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-account wallet state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Confirmed unspent outputs.
    pub utxo: Utxo,
    /// Locally issued transactions not yet observed on-chain.
    pub pending: BTreeMap<TxId, Tx>,
    /// Chain position of the last block applied to this account.
    pub meta: Option<BlockMeta>,
}

impl AccountState {
    /// References consumed by pending transactions.
    pub fn pending_spends(&self) -> BTreeSet<TxIn> {
        self.pending
            .values()
            .flat_map(|tx| tx.inputs.iter().copied())
            .collect()
    }
}

/// A wallet root together with its accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootEntry {
    /// Root metadata.
    pub record: RootRecord,
    /// Accounts by index.
    pub accounts: BTreeMap<u32, AccountState>,
}

/// The entire wallet database value. `Wallets::default()` is the empty
/// database a fresh in-memory store opens with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallets {
    roots: BTreeMap<RootId, RootEntry>,
}

impl Wallets {
    /// Look up a root.
    pub fn root(&self, root: &RootId) -> Option<&RootEntry> {
        self.roots.get(root)
    }

    /// Look up an account.
    pub fn account(&self, account: &AccountId) -> Option<&AccountState> {
        self.roots
            .get(&account.root)
            .and_then(|entry| entry.accounts.get(&account.index))
    }

    /// All roots in the store.
    pub fn roots(&self) -> impl Iterator<Item = (&RootId, &RootEntry)> {
        self.roots.iter()
    }

    /// All accounts in the store.
    pub fn accounts(&self) -> impl Iterator<Item = (AccountId, &AccountState)> {
        self.roots.iter().flat_map(|(root, entry)| {
            entry
                .accounts
                .iter()
                .map(|(index, state)| (AccountId::new(*root, *index), state))
        })
    }
}

/// The closed set of store mutations.
///
/// Serializable so a persistence adapter can event-log and replay commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Create a root and any accounts present in the initial UTxO split.
    CreateHdWallet {
        /// Root id derived from the root public key hash.
        root: RootId,
        /// Root metadata.
        record: RootRecord,
        /// Initial UTxO split by account.
        utxo_by_account: BTreeMap<AccountId, Utxo>,
    },
    /// Apply one prefiltered block across all touched accounts.
    ApplyBlock {
        /// Per-account block projections.
        by_account: BTreeMap<AccountId, PrefilteredBlock>,
    },
    /// Record a locally built transaction as pending.
    NewPending {
        /// Spending account.
        account: AccountId,
        /// Transaction body.
        tx: Tx,
    },
    /// Drop pending transactions, e.g. after submission gives up.
    CancelPending {
        /// Transaction ids to drop, per account. Unknown ids are ignored.
        by_account: BTreeMap<AccountId, BTreeSet<TxId>>,
    },
}

/// Business-level failures of [`step`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// `CreateHdWallet` failed.
    #[error(transparent)]
    Create(#[from] CreateHdRootError),
    /// `NewPending` failed.
    #[error(transparent)]
    NewPending(#[from] NewPendingError),
}

/// Observable side effects of a committed command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepEffects {
    /// Pending transactions the commit resolved: confirmed by the block or
    /// invalidated because their inputs were consumed.
    pub resolved_pending: BTreeMap<AccountId, BTreeSet<TxId>>,
}

/// Pure step function: apply one command to a state value.
///
/// On error the state may be partially modified; callers commit by stepping
/// a scratch clone and swapping it in only on success.
pub fn step(state: &mut Wallets, command: Command) -> Result<StepEffects, CommandError> {
    match command {
        Command::CreateHdWallet {
            root,
            record,
            utxo_by_account,
        } => {
            create_hd_wallet(state, root, record, utxo_by_account)?;
            Ok(StepEffects::default())
        }
        Command::ApplyBlock { by_account } => Ok(apply_block(state, by_account)),
        Command::NewPending { account, tx } => {
            new_pending(state, account, tx)?;
            Ok(StepEffects::default())
        }
        Command::CancelPending { by_account } => {
            cancel_pending(state, by_account);
            Ok(StepEffects::default())
        }
    }
}

fn create_hd_wallet(
    state: &mut Wallets,
    root: RootId,
    record: RootRecord,
    utxo_by_account: BTreeMap<AccountId, Utxo>,
) -> Result<(), CreateHdRootError> {
    if state.roots.contains_key(&root) {
        return Err(CreateHdRootError::RootAlreadyExists(root));
    }
    let mut accounts = BTreeMap::new();
    for (account, utxo) in utxo_by_account {
        debug_assert_eq!(account.root, root, "initial UTxO under a foreign root");
        accounts.insert(
            account.index,
            AccountState {
                utxo,
                pending: BTreeMap::new(),
                meta: None,
            },
        );
    }
    debug!(%root, accounts = accounts.len(), "created HD wallet root");
    state.roots.insert(root, RootEntry { record, accounts });
    Ok(())
}

fn apply_block(
    state: &mut Wallets,
    by_account: BTreeMap<AccountId, PrefilteredBlock>,
) -> StepEffects {
    let mut effects = StepEffects::default();
    for (account_id, filtered) in by_account {
        let Some(entry) = state.roots.get_mut(&account_id.root) else {
            // Prefiltered accounts always stem from a registered key, and
            // registration follows root creation; an unknown root here is a
            // caller feeding foreign projections.
            warn!(account = %account_id, "apply_block: unknown root, skipping projection");
            continue;
        };
        let account = entry.accounts.entry(account_id.index).or_default();

        for spent in &filtered.spent {
            account.utxo.remove(spent);
        }
        for (txin, txout) in &filtered.credited {
            account.utxo.insert(*txin, txout.clone());
        }
        account.meta = Some(filtered.meta);

        // A pending transaction is resolved once the block confirms it or
        // consumes any of its inputs.
        let utxo = &account.utxo;
        let mut resolved = BTreeSet::new();
        account.pending.retain(|tx_id, tx| {
            let confirmed = filtered.block_txs.contains(tx_id);
            let inputs_live = tx.inputs.iter().all(|input| utxo.contains_key(input));
            if confirmed || !inputs_live {
                resolved.insert(*tx_id);
                false
            } else {
                true
            }
        });
        if !resolved.is_empty() {
            debug!(
                account = %account_id,
                count = resolved.len(),
                "block resolved pending transactions"
            );
            effects.resolved_pending.insert(account_id, resolved);
        }
    }
    effects
}

fn new_pending(state: &mut Wallets, account_id: AccountId, tx: Tx) -> Result<(), NewPendingError> {
    let Some(account) = state
        .roots
        .get_mut(&account_id.root)
        .and_then(|entry| entry.accounts.get_mut(&account_id.index))
    else {
        return Err(NewPendingError::UnknownAccount(account_id));
    };

    let pending_spends = account.pending_spends();
    let unavailable: Vec<TxIn> = tx
        .inputs
        .iter()
        .filter(|input| !account.utxo.contains_key(input) || pending_spends.contains(input))
        .copied()
        .collect();
    if !unavailable.is_empty() {
        return Err(NewPendingError::InputsUnavailable(unavailable));
    }

    let tx_id = tx.id();
    debug!(account = %account_id, tx = %tx_id, "recorded pending transaction");
    account.pending.insert(tx_id, tx);
    Ok(())
}

fn cancel_pending(state: &mut Wallets, by_account: BTreeMap<AccountId, BTreeSet<TxId>>) {
    for (account_id, tx_ids) in by_account {
        let Some(account) = state
            .roots
            .get_mut(&account_id.root)
            .and_then(|entry| entry.accounts.get_mut(&account_id.index))
        else {
            continue;
        };
        for tx_id in tx_ids {
            if account.pending.remove(&tx_id).is_some() {
                debug!(account = %account_id, tx = %tx_id, "cancelled pending transaction");
            }
        }
    }
}

/// The transactional wallet store.
///
/// One writer at a time; any number of snapshot readers. A commit clones the
/// current tree, steps it, and swaps the `Arc`, so writers never block
/// readers and a failed command leaves the published state untouched.
pub struct WalletStore {
    state: RwLock<Arc<Wallets>>,
    write_gate: Mutex<()>,
}

impl WalletStore {
    /// Open a fresh, empty in-memory store.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(Arc::new(Wallets::default())),
            write_gate: Mutex::new(()),
        }
    }

    /// Commit a command atomically.
    pub fn commit(&self, command: Command) -> Result<StepEffects, CommandError> {
        let _writer = self.write_gate.lock();
        let mut scratch = Wallets::clone(&self.state.read());
        let effects = step(&mut scratch, command)?;
        *self.state.write() = Arc::new(scratch);
        Ok(effects)
    }

    /// Create a new root with its initial accounts.
    pub fn create_hd_wallet(
        &self,
        root: RootId,
        record: RootRecord,
        utxo_by_account: BTreeMap<AccountId, Utxo>,
    ) -> Result<(), CreateHdRootError> {
        match self.commit(Command::CreateHdWallet {
            root,
            record,
            utxo_by_account,
        }) {
            Ok(_) => Ok(()),
            Err(CommandError::Create(err)) => Err(err),
            Err(other) => unreachable!("create_hd_wallet: unexpected error {other}"),
        }
    }

    /// Apply one prefiltered block atomically across all touched accounts.
    ///
    /// Returns the pending transactions the block resolved, so the caller
    /// can retire their submission records.
    pub fn apply_block(
        &self,
        by_account: BTreeMap<AccountId, PrefilteredBlock>,
    ) -> BTreeMap<AccountId, BTreeSet<TxId>> {
        match self.commit(Command::ApplyBlock { by_account }) {
            Ok(effects) => effects.resolved_pending,
            Err(err) => unreachable!("apply_block cannot fail: {err}"),
        }
    }

    /// Record a locally built transaction as pending on `account`.
    pub fn new_pending(&self, account: AccountId, tx: Tx) -> Result<(), NewPendingError> {
        match self.commit(Command::NewPending { account, tx }) {
            Ok(_) => Ok(()),
            Err(CommandError::NewPending(err)) => Err(err),
            Err(other) => unreachable!("new_pending: unexpected error {other}"),
        }
    }

    /// Drop the listed pending transactions. Idempotent; unknown accounts
    /// and ids are ignored.
    pub fn cancel_pending(&self, by_account: BTreeMap<AccountId, BTreeSet<TxId>>) {
        match self.commit(Command::CancelPending { by_account }) {
            Ok(_) => {}
            Err(err) => unreachable!("cancel_pending cannot fail: {err}"),
        }
    }

    /// Take a consistent read-only snapshot.
    pub fn snapshot(&self) -> DbView {
        DbView {
            wallets: Arc::clone(&self.state.read()),
        }
    }
}

impl Default for WalletStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// A consistent read-only view of the store at one commit boundary.
#[derive(Clone)]
pub struct DbView {
    wallets: Arc<Wallets>,
}

impl DbView {
    /// The underlying state value.
    pub fn wallets(&self) -> &Wallets {
        &self.wallets
    }

    fn account(&self, account: &AccountId) -> Result<&AccountState, QueryError> {
        let entry = self
            .wallets
            .root(&account.root)
            .ok_or(QueryError::UnknownRoot(account.root))?;
        entry
            .accounts
            .get(&account.index)
            .ok_or(QueryError::UnknownAccount(*account))
    }

    /// Confirmed UTxO of an account.
    pub fn account_utxo(&self, account: &AccountId) -> Result<Utxo, QueryError> {
        Ok(self.account(account)?.utxo.clone())
    }

    /// Confirmed balance: the sum over the account's UTxO. Pending activity
    /// is ignored entirely.
    pub fn account_total_balance(&self, account: &AccountId) -> Result<Coin, QueryError> {
        Ok(utxo_total(&self.account(account)?.utxo))
    }

    /// Balance net of outputs locked by pending spends.
    pub fn account_available_balance(&self, account: &AccountId) -> Result<Coin, QueryError> {
        let state = self.account(account)?;
        let locked = state.pending_spends();
        Ok(state
            .utxo
            .iter()
            .filter(|(txin, _)| !locked.contains(txin))
            .fold(0u64, |acc, (_, out)| {
                acc.checked_add(out.value)
                    .expect("UTxO balance overflow: corrupted store state")
            }))
    }

    /// Pending transactions of an account.
    pub fn account_pending(&self, account: &AccountId) -> Result<BTreeMap<TxId, Tx>, QueryError> {
        Ok(self.account(account)?.pending.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use galleon_core::{Address, AssuranceLevel, TxHash, TxOut};

    fn record(name: &str) -> RootRecord {
        RootRecord {
            name: name.to_string(),
            assurance: AssuranceLevel::Normal,
            has_password: false,
            created_at_micros: 0,
        }
    }

    fn root(tag: u8) -> RootId {
        RootId([tag; 32])
    }

    fn addr(tag: u8) -> Address {
        Address::opaque(vec![tag; 24])
    }

    fn filtered_credit(slot: u64, tx: TxHash, outputs: Vec<(u32, Coin)>) -> PrefilteredBlock {
        let mut credited = Utxo::new();
        for (idx, value) in outputs {
            credited.insert(TxIn::new(tx, idx), TxOut::new(addr(0x42), value));
        }
        PrefilteredBlock {
            spent: BTreeSet::new(),
            credited,
            block_txs: [tx].into_iter().collect(),
            meta: BlockMeta {
                slot,
                timestamp_micros: slot,
            },
        }
    }

    #[test]
    fn create_rejects_duplicate_root() {
        let store = WalletStore::in_memory();
        store
            .create_hd_wallet(root(1), record("one"), BTreeMap::new())
            .unwrap();
        assert_eq!(
            store.create_hd_wallet(root(1), record("two"), BTreeMap::new()),
            Err(CreateHdRootError::RootAlreadyExists(root(1)))
        );
        // The failed commit left the first record in place.
        let view = store.snapshot();
        assert_eq!(view.wallets().root(&root(1)).unwrap().record.name, "one");
    }

    #[test]
    fn apply_block_creates_unknown_accounts() {
        let store = WalletStore::in_memory();
        store
            .create_hd_wallet(root(1), record("w"), BTreeMap::new())
            .unwrap();

        let account = AccountId::new(root(1), 7);
        let tx = TxHash::digest(b"credit");
        let mut by_account = BTreeMap::new();
        by_account.insert(account, filtered_credit(1, tx, vec![(0, 500)]));
        store.apply_block(by_account);

        let view = store.snapshot();
        assert_eq!(view.account_total_balance(&account), Ok(500));
        assert_eq!(
            view.wallets().account(&account).unwrap().meta,
            Some(BlockMeta {
                slot: 1,
                timestamp_micros: 1
            })
        );
    }

    #[test]
    fn apply_block_skips_unknown_roots() {
        let store = WalletStore::in_memory();
        let account = AccountId::new(root(9), 0);
        let mut by_account = BTreeMap::new();
        by_account.insert(account, filtered_credit(1, TxHash::digest(b"x"), vec![(0, 1)]));
        let resolved = store.apply_block(by_account);
        assert!(resolved.is_empty());
        assert!(store.snapshot().wallets().root(&root(9)).is_none());
    }

    #[test]
    fn new_pending_validates_account_and_inputs() {
        let store = WalletStore::in_memory();
        let account = AccountId::new(root(1), 0);

        let missing_account = store.new_pending(account, Tx::new(vec![], vec![]));
        assert_eq!(
            missing_account,
            Err(NewPendingError::UnknownAccount(account))
        );

        let funding = TxHash::digest(b"funding");
        let mut utxo_by_account = BTreeMap::new();
        let mut utxo = Utxo::new();
        utxo.insert(TxIn::new(funding, 0), TxOut::new(addr(1), 1_000));
        utxo_by_account.insert(account, utxo);
        store
            .create_hd_wallet(root(1), record("w"), utxo_by_account)
            .unwrap();

        let ghost = TxIn::new(funding, 1);
        let err = store
            .new_pending(
                account,
                Tx::new(
                    vec![TxIn::new(funding, 0), ghost],
                    vec![TxOut::new(addr(2), 900)],
                ),
            )
            .unwrap_err();
        assert_eq!(err, NewPendingError::InputsUnavailable(vec![ghost]));

        // Store unchanged by the rejection.
        let view = store.snapshot();
        assert!(view.account_pending(&account).unwrap().is_empty());

        // A valid spend is accepted, and the same input cannot be pending twice.
        let spend = Tx::new(vec![TxIn::new(funding, 0)], vec![TxOut::new(addr(2), 900)]);
        store.new_pending(account, spend.clone()).unwrap();
        let double = Tx::new(vec![TxIn::new(funding, 0)], vec![TxOut::new(addr(3), 800)]);
        assert_eq!(
            store.new_pending(account, double),
            Err(NewPendingError::InputsUnavailable(vec![TxIn::new(
                funding, 0
            )]))
        );
    }

    #[test]
    fn cancel_pending_is_idempotent() {
        let store = WalletStore::in_memory();
        let account = AccountId::new(root(1), 0);
        let funding = TxHash::digest(b"funding");
        let mut utxo = Utxo::new();
        utxo.insert(TxIn::new(funding, 0), TxOut::new(addr(1), 1_000));
        store
            .create_hd_wallet(root(1), record("w"), [(account, utxo)].into_iter().collect())
            .unwrap();

        let spend = Tx::new(vec![TxIn::new(funding, 0)], vec![TxOut::new(addr(2), 900)]);
        let tx_id = spend.id();
        store.new_pending(account, spend).unwrap();

        let cancel: BTreeMap<_, _> = [(account, [tx_id].into_iter().collect())]
            .into_iter()
            .collect();
        store.cancel_pending(cancel.clone());
        let once = store.snapshot().wallets().clone();
        store.cancel_pending(cancel);
        let twice = store.snapshot().wallets().clone();
        assert_eq!(once, twice);
        assert!(once.account(&account).unwrap().pending.is_empty());
    }

    #[test]
    fn balances_distinguish_total_and_available() {
        let store = WalletStore::in_memory();
        let account = AccountId::new(root(1), 0);
        let funding = TxHash::digest(b"funding");
        let mut utxo = Utxo::new();
        utxo.insert(TxIn::new(funding, 0), TxOut::new(addr(1), 600));
        utxo.insert(TxIn::new(funding, 1), TxOut::new(addr(1), 400));
        store
            .create_hd_wallet(root(1), record("w"), [(account, utxo)].into_iter().collect())
            .unwrap();

        store
            .new_pending(
                account,
                Tx::new(vec![TxIn::new(funding, 0)], vec![TxOut::new(addr(2), 550)]),
            )
            .unwrap();

        let view = store.snapshot();
        assert_eq!(view.account_total_balance(&account), Ok(1_000));
        assert_eq!(view.account_available_balance(&account), Ok(400));
    }

    #[test]
    fn snapshots_are_isolated_from_later_commits() {
        let store = WalletStore::in_memory();
        store
            .create_hd_wallet(root(1), record("w"), BTreeMap::new())
            .unwrap();
        let before = store.snapshot();

        let account = AccountId::new(root(1), 0);
        let mut by_account = BTreeMap::new();
        by_account.insert(
            account,
            filtered_credit(3, TxHash::digest(b"later"), vec![(0, 77)]),
        );
        store.apply_block(by_account);

        assert!(before.wallets().account(&account).is_none());
        assert_eq!(store.snapshot().account_total_balance(&account), Ok(77));
    }

    #[test]
    fn query_errors_distinguish_root_and_account() {
        let store = WalletStore::in_memory();
        store
            .create_hd_wallet(root(1), record("w"), BTreeMap::new())
            .unwrap();
        let view = store.snapshot();

        let unknown_root = AccountId::new(root(9), 0);
        assert_eq!(
            view.account_utxo(&unknown_root),
            Err(QueryError::UnknownRoot(root(9)))
        );
        let unknown_account = AccountId::new(root(1), 3);
        assert_eq!(
            view.account_utxo(&unknown_account),
            Err(QueryError::UnknownAccount(unknown_account))
        );
    }
}
