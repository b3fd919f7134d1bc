//! The passive kernel: key registry plus block ingest.
//!
//! Owns the process-local encrypted-key map and the store handle. Blocks
//! flow in, get prefiltered against every registered key in one pass, and
//! land in the store as one atomic commit per block.

use crate::clock::Clock;
use crate::error::{CreateHdRootError, QueryError};
use crate::store::{DbView, WalletStore};
use galleon_core::{
    prefilter_block_all, prefilter_utxo, AccountId, AssuranceLevel, Coin, EncryptedRootKey,
    ResolvedBlock, RootId, RootRecord, TxId, Utxo, WalletId,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// The passive wallet kernel.
///
/// Key material lives only here, behind a lock, and never enters the store.
pub struct PassiveKernel {
    store: WalletStore,
    keys: RwLock<BTreeMap<WalletId, EncryptedRootKey>>,
    clock: Arc<dyn Clock>,
}

impl PassiveKernel {
    /// Create a kernel over a fresh in-memory store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: WalletStore::in_memory(),
            keys: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Create an HD-random wallet.
    ///
    /// Derives the root id from the public key hash, splits `initial_utxo`
    /// by account under the new key, creates the root, and registers the key
    /// material. Returns the accounts discovered in the initial UTxO.
    pub fn create_wallet_hd_random(
        &self,
        name: &str,
        has_password: bool,
        assurance: AssuranceLevel,
        pub_key_hash: &[u8],
        esk: EncryptedRootKey,
        initial_utxo: &Utxo,
    ) -> Result<Vec<AccountId>, CreateHdRootError> {
        let root = RootId::from_pub_key_hash(pub_key_hash);
        debug_assert_eq!(root, esk.root_id(), "key material does not match the public key hash");

        let utxo_by_account = prefilter_utxo(&esk, initial_utxo);
        let accounts: Vec<AccountId> = utxo_by_account.keys().copied().collect();

        let record = RootRecord {
            name: name.to_string(),
            assurance,
            has_password,
            created_at_micros: self.clock.now_micros(),
        };
        self.store.create_hd_wallet(root, record, utxo_by_account)?;

        // Registration is idempotent per wallet id; the store stays the
        // source of truth if we crash between the two steps.
        self.keys.write().entry(WalletId::from(root)).or_insert(esk);
        info!(%root, accounts = accounts.len(), name, "created HD-random wallet");
        Ok(accounts)
    }

    /// Whether key material is registered for `wallet`.
    pub fn has_wallet(&self, wallet: &WalletId) -> bool {
        self.keys.read().contains_key(wallet)
    }

    /// Prefilter a block against every registered key and commit it.
    ///
    /// Returns the pending transactions the block resolved per account, so
    /// an active kernel can retire their submission records.
    pub fn apply_block(&self, block: &ResolvedBlock) -> BTreeMap<AccountId, BTreeSet<TxId>> {
        let by_account = {
            let keys = self.keys.read();
            prefilter_block_all(&keys, block)
        };
        debug!(
            slot = block.meta.slot,
            accounts = by_account.len(),
            "applying block"
        );
        self.store.apply_block(by_account)
    }

    /// Apply a sequence of blocks, one atomic commit each.
    ///
    /// An interruption partway leaves the store consistent at the last
    /// committed block.
    pub fn apply_blocks<'b>(
        &self,
        blocks: impl IntoIterator<Item = &'b ResolvedBlock>,
    ) -> BTreeMap<AccountId, BTreeSet<TxId>> {
        let mut resolved: BTreeMap<AccountId, BTreeSet<TxId>> = BTreeMap::new();
        for block in blocks {
            for (account, tx_ids) in self.apply_block(block) {
                resolved.entry(account).or_default().extend(tx_ids);
            }
        }
        resolved
    }

    /// Consistent snapshot of the store.
    pub fn snapshot(&self) -> DbView {
        self.store.snapshot()
    }

    /// Confirmed UTxO of an account.
    pub fn account_utxo(&self, account: &AccountId) -> Result<Utxo, QueryError> {
        self.snapshot().account_utxo(account)
    }

    /// Confirmed balance of an account.
    pub fn account_total_balance(&self, account: &AccountId) -> Result<Coin, QueryError> {
        self.snapshot().account_total_balance(account)
    }

    /// Balance net of pending spends.
    pub fn account_available_balance(&self, account: &AccountId) -> Result<Coin, QueryError> {
        self.snapshot().account_available_balance(account)
    }

    /// Direct store handle.
    pub fn store(&self) -> &WalletStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use galleon_core::{BlockMeta, ResolvedTx, TxHash, TxOut};

    fn kernel() -> PassiveKernel {
        PassiveKernel::new(Arc::new(ManualClock::new()))
    }

    fn credit_block(slot: u64, outputs: Vec<TxOut>) -> ResolvedBlock {
        ResolvedBlock {
            meta: BlockMeta {
                slot,
                timestamp_micros: slot * 20_000_000,
            },
            txs: vec![ResolvedTx {
                hash: TxHash::digest(&slot.to_be_bytes()),
                inputs: vec![],
                outputs,
            }],
        }
    }

    #[test]
    fn create_discovers_accounts_from_initial_utxo() {
        let kernel = kernel();
        let esk = EncryptedRootKey::from_seed(b"w1");
        let mut initial = Utxo::new();
        initial.insert(
            galleon_core::TxIn::new(TxHash::digest(b"genesis"), 0),
            TxOut::new(esk.derive_address(0, 0), 1_000),
        );

        let accounts = kernel
            .create_wallet_hd_random(
                "main",
                false,
                AssuranceLevel::Normal,
                &esk.pub_key_hash(),
                esk.clone(),
                &initial,
            )
            .unwrap();
        assert_eq!(accounts, vec![AccountId::new(esk.root_id(), 0)]);
        assert_eq!(kernel.account_total_balance(&accounts[0]), Ok(1_000));
        assert!(kernel.has_wallet(&WalletId::from(esk.root_id())));
    }

    #[test]
    fn duplicate_root_creation_is_rejected() {
        let kernel = kernel();
        let esk = EncryptedRootKey::from_seed(b"w1");
        let empty = Utxo::new();
        kernel
            .create_wallet_hd_random(
                "one",
                false,
                AssuranceLevel::Normal,
                &esk.pub_key_hash(),
                esk.clone(),
                &empty,
            )
            .unwrap();
        let again = kernel.create_wallet_hd_random(
            "two",
            true,
            AssuranceLevel::Strict,
            &esk.pub_key_hash(),
            esk.clone(),
            &empty,
        );
        assert_eq!(
            again,
            Err(CreateHdRootError::RootAlreadyExists(esk.root_id()))
        );
    }

    #[test]
    fn apply_block_reaches_every_registered_wallet() {
        let kernel = kernel();
        let esk_a = EncryptedRootKey::from_seed(b"wa");
        let esk_b = EncryptedRootKey::from_seed(b"wb");
        let empty = Utxo::new();
        for esk in [&esk_a, &esk_b] {
            kernel
                .create_wallet_hd_random(
                    "w",
                    false,
                    AssuranceLevel::Normal,
                    &esk.pub_key_hash(),
                    esk.clone(),
                    &empty,
                )
                .unwrap();
        }

        kernel.apply_block(&credit_block(
            1,
            vec![
                TxOut::new(esk_a.derive_address(0, 0), 10),
                TxOut::new(esk_b.derive_address(0, 0), 20),
            ],
        ));

        assert_eq!(
            kernel.account_total_balance(&AccountId::new(esk_a.root_id(), 0)),
            Ok(10)
        );
        assert_eq!(
            kernel.account_total_balance(&AccountId::new(esk_b.root_id(), 0)),
            Ok(20)
        );
    }

    #[test]
    fn apply_blocks_commits_sequentially() {
        let kernel = kernel();
        let esk = EncryptedRootKey::from_seed(b"w1");
        kernel
            .create_wallet_hd_random(
                "w",
                false,
                AssuranceLevel::Normal,
                &esk.pub_key_hash(),
                esk.clone(),
                &Utxo::new(),
            )
            .unwrap();

        let blocks = vec![
            credit_block(1, vec![TxOut::new(esk.derive_address(0, 0), 10)]),
            credit_block(2, vec![TxOut::new(esk.derive_address(0, 0), 32)]),
        ];
        kernel.apply_blocks(blocks.iter());

        let account = AccountId::new(esk.root_id(), 0);
        assert_eq!(kernel.account_total_balance(&account), Ok(42));
        let meta = kernel
            .snapshot()
            .wallets()
            .account(&account)
            .unwrap()
            .meta;
        assert_eq!(meta.map(|m| m.slot), Some(2));
    }
}
