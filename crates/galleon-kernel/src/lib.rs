//! Galleon wallet kernel
//!
//! The stateful half of the wallet: a transactional in-memory account store
//! fed by prefiltered blocks, the passive kernel that owns key material and
//! drives block ingest, and the active kernel that tracks locally issued
//! transactions and resubmits them over the network until they confirm or
//! give up.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod active;
pub mod clock;
pub mod diffusion;
pub mod error;
pub mod kernel;
pub mod shutdown;
pub mod store;
pub mod submission;

pub use active::{bracket_active_wallet, ActiveConfig, ActiveKernel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use diffusion::{BufferedDiffusion, Diffusion};
pub use error::{CreateHdRootError, NewPendingError, QueryError, SendError};
pub use kernel::PassiveKernel;
pub use shutdown::{ShutdownSignal, ShutdownToken};
pub use store::{
    step, AccountState, Command, CommandError, DbView, RootEntry, StepEffects, WalletStore,
    Wallets,
};
pub use submission::{ResubmitPolicy, Submission, TickOutcome};
