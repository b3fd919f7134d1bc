//! Resolved blocks and their per-account projections.

use crate::types::{TxHash, TxIn, TxOut, Utxo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Chain position of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMeta {
    /// Chain slot the block occupies.
    pub slot: u64,
    /// Block timestamp, microseconds since the epoch.
    pub timestamp_micros: u64,
}

/// A transaction input paired with the output it consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedInput {
    /// The reference being spent.
    pub source: TxIn,
    /// The output that reference pointed at.
    pub resolved: TxOut,
}

/// A confirmed transaction with every input resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTx {
    /// Hash of this transaction.
    pub hash: TxHash,
    /// Inputs with the outputs they consume.
    pub inputs: Vec<ResolvedInput>,
    /// Outputs created, in order.
    pub outputs: Vec<TxOut>,
}

impl ResolvedTx {
    /// Reference to this transaction's output at `index`.
    pub fn output_ref(&self, index: u32) -> TxIn {
        TxIn::new(self.hash, index)
    }
}

/// A block whose every transaction input has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBlock {
    /// Chain position.
    pub meta: BlockMeta,
    /// Transactions in block order.
    pub txs: Vec<ResolvedTx>,
}

impl ResolvedBlock {
    /// Hashes of every transaction in the block.
    pub fn tx_hashes(&self) -> BTreeSet<TxHash> {
        self.txs.iter().map(|tx| tx.hash).collect()
    }
}

/// The projection of a resolved block onto a single account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefilteredBlock {
    /// References this account owned that the block spends.
    pub spent: BTreeSet<TxIn>,
    /// New outputs credited to this account.
    pub credited: Utxo,
    /// Hashes of every transaction in the block, for confirmation detection.
    pub block_txs: BTreeSet<TxHash>,
    /// Chain position of the source block.
    pub meta: BlockMeta,
}

impl PrefilteredBlock {
    /// An empty projection for a block.
    pub fn empty(block: &ResolvedBlock) -> Self {
        Self {
            spent: BTreeSet::new(),
            credited: Utxo::new(),
            block_txs: block.tx_hashes(),
            meta: block.meta,
        }
    }
}
