//! Error types for input selection.

/// Why a policy could not build a selection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// The UTxO cannot cover the requested payments at all.
    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds {
        /// Total value available in the UTxO.
        available: u64,
        /// Total value the payments require.
        required: u64,
    },

    /// The UTxO could cover the payments, but not in the shape this policy
    /// demands.
    #[error("no suitable inputs for this policy")]
    NoSuitableInputs,
}
