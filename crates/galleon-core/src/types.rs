//! Primitive ledger and wallet identifier types.

use crate::address::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Coin value in the smallest ledger unit.
pub type Coin = u64;

/// Transaction hash (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

/// Identifier of a locally built transaction.
///
/// Pending transactions are identified by the hash of their body, so the id
/// space is shared with confirmed transaction hashes.
pub type TxId = TxHash;

impl TxHash {
    /// Hash arbitrary bytes into a transaction hash.
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Reference to a transaction output: the producing transaction and the
/// output position within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxIn {
    /// Hash of the producing transaction.
    pub hash: TxHash,
    /// Output position within the producing transaction.
    pub index: u32,
}

impl TxIn {
    /// Create an output reference.
    pub fn new(hash: TxHash, index: u32) -> Self {
        Self { hash, index }
    }
}

impl fmt::Display for TxIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(&self.hash.0[..8]), self.index)
    }
}

/// A transaction output: recipient address and value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Recipient address.
    pub address: Address,
    /// Value in the smallest unit. Zero-valued outputs are never credited.
    pub value: Coin,
}

impl TxOut {
    /// Create an output.
    pub fn new(address: Address, value: Coin) -> Self {
        Self { address, value }
    }
}

/// Unspent transaction outputs, keyed by the reference that spends them.
pub type Utxo = BTreeMap<TxIn, TxOut>;

/// Sum the values of a UTxO set.
///
/// Panics on overflow: total supply fits a `Coin` by construction, so an
/// overflowing sum means corrupted state.
pub fn utxo_total(utxo: &Utxo) -> Coin {
    utxo.values().fold(0u64, |acc, out| {
        acc.checked_add(out.value)
            .expect("UTxO balance overflow: corrupted store state")
    })
}

/// A transaction body as built by this wallet: inputs it spends and outputs
/// it creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// Outputs consumed.
    pub inputs: Vec<TxIn>,
    /// Outputs created, in order.
    pub outputs: Vec<TxOut>,
}

impl Tx {
    /// Create a transaction body.
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self { inputs, outputs }
    }

    /// Identifier of this body: a digest over inputs and outputs.
    pub fn id(&self) -> TxId {
        let mut hasher = Sha256::new();
        hasher.update((self.inputs.len() as u32).to_be_bytes());
        for input in &self.inputs {
            hasher.update(input.hash.0);
            hasher.update(input.index.to_be_bytes());
        }
        hasher.update((self.outputs.len() as u32).to_be_bytes());
        for output in &self.outputs {
            hasher.update(output.address.as_bytes());
            hasher.update(output.value.to_be_bytes());
        }
        TxHash(hasher.finalize().into())
    }

    /// Reference to this transaction's output at `index`.
    pub fn output_ref(&self, index: u32) -> TxIn {
        TxIn::new(self.id(), index)
    }
}

/// Identifier of an HD wallet root, derived from the root public key hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RootId(pub [u8; 32]);

impl RootId {
    /// Derive the root id from the hash of the root public key.
    pub fn from_pub_key_hash(pub_key_hash: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(pub_key_hash);
        Self(hasher.finalize().into())
    }

    /// Short fingerprint embedded in address payloads.
    pub fn fingerprint(&self) -> [u8; 8] {
        let mut fp = [0u8; 8];
        fp.copy_from_slice(&self.0[..8]);
        fp
    }
}

impl fmt::Debug for RootId {
    // Short hex prefix; full ids are 64 hex chars of noise in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootId({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Identifier of an account: a root plus the account index beneath it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId {
    /// Owning root.
    pub root: RootId,
    /// Account index within the root.
    pub index: u32,
}

impl AccountId {
    /// Create an account id.
    pub fn new(root: RootId, index: u32) -> Self {
        Self { root, index }
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({}/{})", hex::encode(&self.root.0[..8]), self.index)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", hex::encode(&self.root.0[..8]), self.index)
    }
}

/// Identifier of a wallet's key material.
///
/// For HD-random wallets this is one-to-one with [`RootId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WalletId(pub RootId);

impl From<RootId> for WalletId {
    fn from(root: RootId) -> Self {
        Self(root)
    }
}

/// How many confirmations the wallet owner wants before trusting a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssuranceLevel {
    /// Standard confirmation depth.
    Normal,
    /// Paranoid confirmation depth.
    Strict,
}

/// Metadata describing a wallet root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    /// Human-readable wallet name.
    pub name: String,
    /// Assurance level chosen at creation.
    pub assurance: AssuranceLevel,
    /// Whether a spending password protects the key material.
    pub has_password: bool,
    /// Creation time, microseconds since the epoch.
    pub created_at_micros: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn out(value: Coin) -> TxOut {
        TxOut::new(Address::opaque(vec![0xab; 12]), value)
    }

    #[test]
    fn tx_id_is_deterministic_and_input_sensitive() {
        let base = Tx::new(
            vec![TxIn::new(TxHash::digest(b"a"), 0)],
            vec![out(5), out(7)],
        );
        let same = base.clone();
        assert_eq!(base.id(), same.id());

        let reordered = Tx::new(base.inputs.clone(), vec![out(7), out(5)]);
        assert_ne!(base.id(), reordered.id());

        let respent = Tx::new(
            vec![TxIn::new(TxHash::digest(b"b"), 0)],
            base.outputs.clone(),
        );
        assert_ne!(base.id(), respent.id());
    }

    #[test]
    fn utxo_total_sums_all_entries() {
        let mut utxo = Utxo::new();
        utxo.insert(TxIn::new(TxHash::digest(b"x"), 0), out(10));
        utxo.insert(TxIn::new(TxHash::digest(b"x"), 1), out(32));
        assert_eq!(utxo_total(&utxo), 42);
        assert_eq!(utxo_total(&Utxo::new()), 0);
    }

    #[test]
    fn account_ids_order_by_root_then_index() {
        let ra = RootId([1u8; 32]);
        let rb = RootId([2u8; 32]);
        assert!(AccountId::new(ra, 9) < AccountId::new(rb, 0));
        assert!(AccountId::new(ra, 0) < AccountId::new(ra, 1));
    }
}
