//! Error types for the wallet kernel.

use galleon_core::{AccountId, RootId, TxIn};

/// Failure to create a wallet root.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateHdRootError {
    /// A root with this id is already present in the store.
    #[error("wallet root {0} already exists")]
    RootAlreadyExists(RootId),
}

/// Failure to record a locally built transaction as pending.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NewPendingError {
    /// The referenced account does not exist.
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),

    /// Some inputs are not spendable: absent from the confirmed UTxO or
    /// already referenced by another pending transaction.
    #[error("inputs unavailable: {}", format_inputs(.0))]
    InputsUnavailable(Vec<TxIn>),
}

/// Failure to answer a snapshot query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The referenced root does not exist.
    #[error("unknown root {0}")]
    UnknownRoot(RootId),

    /// The root exists but the account index does not.
    #[error("unknown account {0}")]
    UnknownAccount(AccountId),
}

/// Opaque network send failure.
///
/// The submission layer treats every send error as "try again later"; the
/// payload exists only for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("diffusion send failed: {0}")]
pub struct SendError(pub String);

fn format_inputs(inputs: &[TxIn]) -> String {
    let shown: Vec<String> = inputs.iter().map(|i| i.to_string()).collect();
    shown.join(", ")
}
