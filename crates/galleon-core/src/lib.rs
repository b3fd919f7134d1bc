//! Galleon wallet kernel core
//!
//! This crate implements the ledger-facing half of the wallet kernel: the
//! primitive UTxO types, opaque root key material with account/address
//! derivation, and the prefilter that projects resolved blocks onto the
//! accounts a wallet owns.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod block;
pub mod error;
pub mod keys;
pub mod prefilter;
pub mod types;

pub use address::{Address, AddressPayload};
pub use block::{BlockMeta, PrefilteredBlock, ResolvedBlock, ResolvedInput, ResolvedTx};
pub use error::DerivationError;
pub use keys::EncryptedRootKey;
pub use prefilter::{merge_prefiltered, prefilter_block, prefilter_block_all, prefilter_utxo};
pub use types::{
    utxo_total, AccountId, AssuranceLevel, Coin, RootId, RootRecord, Tx, TxHash, TxId, TxIn,
    TxOut, Utxo, WalletId,
};
