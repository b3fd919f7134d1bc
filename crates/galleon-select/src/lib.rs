//! Galleon input-selection study
//!
//! Pure coin-selection policies and a deterministic simulator for comparing
//! them over synthetic event streams. Nothing here persists state or touches
//! the kernel; the only shared contract is the [`InputSelectionPolicy`]
//! trait.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod policy;
pub mod sim;

pub use error::PolicyError;
pub use policy::{
    ExactSingleMatchOnly, InputSelectionPolicy, LargestFirst, PrivacyMode, RandomPolicy,
    Selection, SelectionStats,
};
pub use sim::{CommitPolicy, Histogram, SimConfig, SimReport, Simulator, SlotSample, WalletEvent};
