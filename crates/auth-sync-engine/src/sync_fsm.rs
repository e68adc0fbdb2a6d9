//! Action phase state machine using rust-fsm.
//!
//! The phase tracks the single corrective action that may be in flight. Any
//! phase other than `Idle` means "in flight"; the transition table is what
//! forbids starting a second action and what forces the account-switch path
//! through sign-out and settling before sign-in.
//!
//! ## State Diagram
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │             Idle             │ (initial)
//!                 └──┬───────────┬────────────┬──┘
//!      StartSignOut  │ StartSignIn│            │ StartSwitch
//!                    ▼           │            ▼
//!          ┌──────────────┐      │   ┌──────────────────┐
//!          │  SigningOut  │      │   │ SwitchSigningOut │
//!          └──────┬───────┘      │   └────────┬─────────┘
//!  SignOutSettled │              │            │ SignOutSettled
//!                 ▼              │            ▼
//!               Idle             │   ┌──────────────────┐
//!                                │   │     Settling     │
//!                                │   └────────┬─────────┘
//!                                │            │ SettleElapsed
//!                                ▼            ▼
//!                         ┌─────────────────────────┐
//!                         │        SigningIn        │
//!                         └────────────┬────────────┘
//!                                      │ SignInSettled
//!                                      ▼
//!                                    Idle
//! ```

use rust_fsm::*;
use serde::Serialize;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub sync_machine(Idle)

    Idle => {
        StartSignOut => SigningOut,
        StartSignIn => SigningIn,
        StartSwitch => SwitchSigningOut
    },
    SigningOut => {
        SignOutSettled => Idle
    },
    SwitchSigningOut => {
        // Sign-out resolved (either way); sign-in must wait for settling
        SignOutSettled => Settling
    },
    Settling => {
        SettleElapsed => SigningIn
    },
    SigningIn => {
        SignInSettled => Idle
    }
}

pub use sync_machine::Input as SyncMachineInput;
pub use sync_machine::State as SyncMachineState;
pub use sync_machine::StateMachine as SyncMachine;

/// Externally visible phase of the in-flight action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    SigningOut,
    SwitchSigningOut,
    Settling,
    SigningIn,
}

impl SyncPhase {
    /// Returns true while a sign-in or sign-out action is executing.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self, SyncPhase::Idle)
    }
}

impl From<&SyncMachineState> for SyncPhase {
    fn from(state: &SyncMachineState) -> Self {
        match state {
            SyncMachineState::Idle => SyncPhase::Idle,
            SyncMachineState::SigningOut => SyncPhase::SigningOut,
            SyncMachineState::SwitchSigningOut => SyncPhase::SwitchSigningOut,
            SyncMachineState::Settling => SyncPhase::Settling,
            SyncMachineState::SigningIn => SyncPhase::SigningIn,
        }
    }
}
