//! Cross-provider authentication synchronization.
//!
//! This crate keeps a secondary DataBackend session in lockstep with the
//! primary IdP session:
//! - Pure evaluation of the (IdP, DataBackend) identity pair into one
//!   corrective action ([`SyncEngine`])
//! - An explicit phase FSM guaranteeing one action in flight and sign-out
//!   before sign-in on account switches
//! - A per-UI-root [`SyncContext`] driver that reacts to identity observers
//!   and discards late results after teardown

mod config;
mod context;
mod engine;
mod error;
mod executor;
mod facade;
mod identity;
mod sync_fsm;

#[cfg(test)]
mod tests;

pub use config::{RetryConfig, SyncConfig};
pub use context::{ContextId, SyncContext, SyncHandle, SyncStatus};
pub use engine::{classify, CorrectiveAction, Evaluation, SyncCondition, SyncEngine, SyncSnapshot};
pub use error::{SyncError, SyncErrorKind, SyncResult, TransitionError};
pub use facade::{ProviderFacade, Token};
pub use identity::{IdentityState, Readiness, UserId};
pub use sync_fsm::sync_machine;
pub use sync_fsm::{SyncMachine, SyncMachineInput, SyncMachineState, SyncPhase};
