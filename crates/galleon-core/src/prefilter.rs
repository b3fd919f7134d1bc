//! Projecting resolved blocks onto wallet accounts.
//!
//! The prefilter walks a block once against the whole key map, classifying
//! every spent and created output by owning account. It is a pure function of
//! `(block, keys)`: malformed addresses are skipped and logged, never fatal.

use crate::address::Address;
use crate::block::{PrefilteredBlock, ResolvedBlock};
use crate::keys::EncryptedRootKey;
use crate::types::{AccountId, RootId, TxIn, Utxo, WalletId};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Prefilter a block against every registered key in a single pass.
///
/// Accounts appearing for the first time simply show up as new keys of the
/// result; the store creates them on apply.
pub fn prefilter_block_all(
    keys: &BTreeMap<WalletId, EncryptedRootKey>,
    block: &ResolvedBlock,
) -> BTreeMap<AccountId, PrefilteredBlock> {
    scan(&fingerprint_index(keys.values()), block)
}

/// Prefilter a block against a single wallet's key.
pub fn prefilter_block(
    key: &EncryptedRootKey,
    block: &ResolvedBlock,
) -> BTreeMap<AccountId, PrefilteredBlock> {
    scan(&fingerprint_index(std::iter::once(key)), block)
}

/// Split an existing UTxO by owning account under one key.
///
/// Used when a wallet is created over a non-empty chain state. Outputs the
/// key does not own, and outputs with malformed addresses, are dropped.
pub fn prefilter_utxo(key: &EncryptedRootKey, utxo: &Utxo) -> BTreeMap<AccountId, Utxo> {
    let mut by_account: BTreeMap<AccountId, Utxo> = BTreeMap::new();
    for (txin, txout) in utxo {
        match key.recognize(&txout.address) {
            Ok(Some(account)) => {
                by_account
                    .entry(AccountId::new(key.root_id(), account))
                    .or_default()
                    .insert(*txin, txout.clone());
            }
            Ok(None) => {}
            Err(err) => {
                debug!(%txin, %err, "skipping output with malformed address");
            }
        }
    }
    by_account
}

/// Disjoint union of per-key prefilter results.
///
/// Account sets produced for different keys cannot overlap because the
/// account id embeds the root id; an overlap is corrupted input.
pub fn merge_prefiltered(
    parts: impl IntoIterator<Item = BTreeMap<AccountId, PrefilteredBlock>>,
) -> BTreeMap<AccountId, PrefilteredBlock> {
    let mut merged = BTreeMap::new();
    for part in parts {
        for (account, filtered) in part {
            let clash = merged.insert(account, filtered).is_some();
            assert!(!clash, "prefilter merge: account {account} appears twice");
        }
    }
    merged
}

fn fingerprint_index<'k>(
    keys: impl Iterator<Item = &'k EncryptedRootKey>,
) -> HashMap<[u8; 8], RootId> {
    keys.map(|key| (key.root_id().fingerprint(), key.root_id()))
        .collect()
}

fn scan(
    index: &HashMap<[u8; 8], RootId>,
    block: &ResolvedBlock,
) -> BTreeMap<AccountId, PrefilteredBlock> {
    let mut by_account: BTreeMap<AccountId, PrefilteredBlock> = BTreeMap::new();

    for tx in &block.txs {
        for input in &tx.inputs {
            match classify(index, &input.resolved.address) {
                Classified::Owned(account) => {
                    let filtered = by_account
                        .entry(account)
                        .or_insert_with(|| PrefilteredBlock::empty(block));
                    filtered.spent.insert(input.source);
                    // An output created earlier in this block and spent here
                    // nets out of the projection entirely.
                    filtered.credited.remove(&input.source);
                }
                Classified::Foreign => {}
                Classified::Malformed => {
                    debug!(source = %input.source, "skipping spent output with malformed address");
                }
            }
        }
        for (idx, output) in tx.outputs.iter().enumerate() {
            if output.value == 0 {
                debug!(tx = %tx.hash, idx, "skipping zero-value output");
                continue;
            }
            match classify(index, &output.address) {
                Classified::Owned(account) => {
                    by_account
                        .entry(account)
                        .or_insert_with(|| PrefilteredBlock::empty(block))
                        .credited
                        .insert(TxIn::new(tx.hash, idx as u32), output.clone());
                }
                Classified::Foreign => {}
                Classified::Malformed => {
                    debug!(tx = %tx.hash, idx, "skipping created output with malformed address");
                }
            }
        }
    }
    by_account
}

enum Classified {
    Owned(AccountId),
    Foreign,
    Malformed,
}

fn classify(index: &HashMap<[u8; 8], RootId>, address: &Address) -> Classified {
    match address.decode() {
        Ok(payload) => match index.get(&payload.fingerprint) {
            Some(root) => Classified::Owned(AccountId::new(*root, payload.account)),
            None => Classified::Foreign,
        },
        Err(_) => Classified::Malformed,
    }
}
