//! Pure evaluation of the (IdP, DataBackend) identity pair.
//!
//! [`SyncEngine`] owns the synchronization state and decides the single
//! corrective action to take. It never performs I/O: the owning context
//! executes the action and reports its outcome back through the `record_*`
//! methods.

use crate::error::{SyncError, SyncResult, TransitionError};
use crate::identity::{IdentityState, Readiness, UserId};
use crate::sync_fsm::{SyncMachine, SyncMachineInput, SyncPhase};
use tracing::{debug, warn};

/// Combined condition derived from both identity states and the last
/// synchronized user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCondition {
    /// IdP absent, DataBackend absent.
    IdleSignedOut,
    /// IdP absent, DataBackend still holds a session.
    ForeignSession,
    /// Both present but for different users.
    AccountMismatch { idp: UserId, backend: UserId },
    /// IdP present; DataBackend absent or not yet confirmed for this user.
    NeedsSignIn(UserId),
    /// IdP and DataBackend agree and the engine signed this user in.
    Synchronized(UserId),
}

impl SyncCondition {
    pub fn action(&self) -> CorrectiveAction {
        match self {
            SyncCondition::IdleSignedOut | SyncCondition::Synchronized(_) => CorrectiveAction::None,
            SyncCondition::ForeignSession => CorrectiveAction::SignOutDataBackend,
            SyncCondition::AccountMismatch { idp, .. } => {
                CorrectiveAction::SignOutThenSignIn(idp.clone())
            }
            SyncCondition::NeedsSignIn(user_id) => {
                CorrectiveAction::SignInDataBackend(user_id.clone())
            }
        }
    }

    /// Stable conditions need no action for this identity pair.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            SyncCondition::IdleSignedOut | SyncCondition::Synchronized(_)
        )
    }
}

/// The one side-effecting operation chosen by an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrectiveAction {
    None,
    SignOutDataBackend,
    SignOutThenSignIn(UserId),
    SignInDataBackend(UserId),
}

impl CorrectiveAction {
    fn start_input(&self) -> Option<SyncMachineInput> {
        match self {
            CorrectiveAction::None => None,
            CorrectiveAction::SignOutDataBackend => Some(SyncMachineInput::StartSignOut),
            CorrectiveAction::SignOutThenSignIn(_) => Some(SyncMachineInput::StartSwitch),
            CorrectiveAction::SignInDataBackend(_) => Some(SyncMachineInput::StartSignIn),
        }
    }
}

/// Classify an identity pair.
pub fn classify(
    idp: &IdentityState,
    backend: &IdentityState,
    last_synchronized: Option<&UserId>,
) -> SyncCondition {
    match (idp, backend) {
        (IdentityState::Absent, IdentityState::Absent) => SyncCondition::IdleSignedOut,
        (IdentityState::Absent, IdentityState::Present(_)) => SyncCondition::ForeignSession,
        (IdentityState::Present(u), IdentityState::Present(v)) if u != v => {
            SyncCondition::AccountMismatch {
                idp: u.clone(),
                backend: v.clone(),
            }
        }
        (IdentityState::Present(u), IdentityState::Present(_)) if last_synchronized == Some(u) => {
            SyncCondition::Synchronized(u.clone())
        }
        (IdentityState::Present(u), _) => SyncCondition::NeedsSignIn(u.clone()),
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Nothing to do.
    Stable(SyncCondition),
    /// The action was started; the caller must execute it.
    Act(CorrectiveAction),
    /// An action is already in flight; this one was dropped.
    Suppressed(CorrectiveAction),
}

/// Point-in-time copy of the engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub last_synchronized_user_id: Option<UserId>,
    pub phase: SyncPhase,
    pub last_error: Option<SyncError>,
}

impl SyncSnapshot {
    pub fn in_flight(&self) -> bool {
        self.phase.is_in_flight()
    }

    /// Human-readable form of the last error for display.
    pub fn last_error_message(&self) -> Option<String> {
        self.last_error.as_ref().map(|e| e.to_string())
    }
}

/// Synchronization state for one context.
pub struct SyncEngine {
    last_synchronized_user_id: Option<UserId>,
    last_error: Option<SyncError>,
    machine: SyncMachine,
    deferred: bool,
    torn_down: bool,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("last_synchronized_user_id", &self.last_synchronized_user_id)
            .field("last_error", &self.last_error)
            .field("phase", &self.phase())
            .field("deferred", &self.deferred)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            last_synchronized_user_id: None,
            last_error: None,
            machine: SyncMachine::new(),
            deferred: false,
            torn_down: false,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from(self.machine.state())
    }

    pub fn in_flight(&self) -> bool {
        self.phase().is_in_flight()
    }

    pub fn last_synchronized_user_id(&self) -> Option<&UserId> {
        self.last_synchronized_user_id.as_ref()
    }

    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            last_synchronized_user_id: self.last_synchronized_user_id.clone(),
            phase: self.phase(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn condition(&self, idp: &IdentityState, backend: &IdentityState) -> SyncCondition {
        classify(idp, backend, self.last_synchronized_user_id.as_ref())
    }

    /// Evaluate the identity pair and start at most one action.
    ///
    /// A stable evaluation with nothing in flight clears the last error and
    /// leaves every other field unchanged.
    pub fn evaluate(
        &mut self,
        idp: &IdentityState,
        backend: &IdentityState,
    ) -> Result<Evaluation, TransitionError> {
        self.ensure_live()?;

        let condition = self.condition(idp, backend);
        let action = condition.action();

        let Some(input) = action.start_input() else {
            if !self.in_flight() && self.last_error.is_some() {
                debug!(?condition, "Stable evaluation clears last error");
                self.last_error = None;
            }
            return Ok(Evaluation::Stable(condition));
        };

        if self.in_flight() {
            debug!(?action, phase = ?self.phase(), "Action suppressed while another is in flight");
            self.deferred = true;
            return Ok(Evaluation::Suppressed(action));
        }

        self.consume(input)?;
        debug!(?condition, ?action, "Starting corrective action");
        Ok(Evaluation::Act(action))
    }

    /// Record completion of a sign-out, standalone or as the first half of an
    /// account switch.
    pub fn record_sign_out(&mut self, result: SyncResult<()>) -> Result<(), TransitionError> {
        self.ensure_live()?;
        self.consume(SyncMachineInput::SignOutSettled)?;

        match result {
            Ok(()) => {
                self.last_synchronized_user_id = None;
                self.last_error = None;
            }
            Err(e) => {
                warn!(error = %e, "DataBackend sign-out failed");
                self.last_error = Some(e);
            }
        }
        Ok(())
    }

    /// Record that the settling delay of an account switch has elapsed.
    pub fn record_settled(&mut self) -> Result<(), TransitionError> {
        self.ensure_live()?;
        self.consume(SyncMachineInput::SettleElapsed)
    }

    /// Record completion of a sign-in for `user_id`.
    pub fn record_sign_in(
        &mut self,
        user_id: &UserId,
        result: SyncResult<()>,
    ) -> Result<(), TransitionError> {
        self.ensure_live()?;
        self.consume(SyncMachineInput::SignInSettled)?;

        match result {
            Ok(()) => {
                self.last_synchronized_user_id = Some(user_id.clone());
                self.last_error = None;
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "DataBackend sign-in failed");
                self.last_synchronized_user_id = None;
                self.last_error = Some(e);
            }
        }
        Ok(())
    }

    /// Record a sign-in abandoned after the token fetch because the IdP no
    /// longer holds `user_id`. Nothing was signed in, so no error is recorded
    /// and a re-evaluation is queued for the current IdP identity.
    pub fn record_sign_in_superseded(&mut self, user_id: &UserId) -> Result<(), TransitionError> {
        self.ensure_live()?;
        self.consume(SyncMachineInput::SignInSettled)?;

        debug!(user_id = %user_id, "Sign-in superseded by IdP change");
        self.last_synchronized_user_id = None;
        self.deferred = true;
        Ok(())
    }

    /// Take the flag set when a trigger was suppressed during the last action.
    pub fn take_deferred(&mut self) -> bool {
        std::mem::take(&mut self.deferred)
    }

    /// Stop accepting evaluations and reports.
    pub fn teardown(&mut self) {
        self.torn_down = true;
        self.deferred = false;
    }

    /// Combined identity for dependent UI.
    pub fn readiness(&self, idp: &IdentityState, backend: &IdentityState) -> Readiness {
        if self.in_flight() {
            return Readiness::NotReady;
        }
        match self.condition(idp, backend) {
            SyncCondition::IdleSignedOut => Readiness::SignedOut,
            SyncCondition::Synchronized(user_id) => Readiness::Ready(user_id),
            _ => Readiness::NotReady,
        }
    }

    fn ensure_live(&self) -> Result<(), TransitionError> {
        if self.torn_down {
            return Err(TransitionError::TornDown);
        }
        Ok(())
    }

    fn consume(&mut self, input: SyncMachineInput) -> Result<(), TransitionError> {
        let phase = self.phase();
        self.machine
            .consume(&input)
            .map(|_| ())
            .map_err(|_| TransitionError::Invalid {
                input: format!("{:?}", input),
                phase: format!("{:?}", phase),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absent() -> IdentityState {
        IdentityState::Absent
    }

    fn present(id: &str) -> IdentityState {
        IdentityState::present(id)
    }

    fn uid(id: &str) -> UserId {
        UserId::from(id)
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(&absent(), &absent(), None), SyncCondition::IdleSignedOut);
        assert_eq!(
            classify(&absent(), &present("u1"), Some(&uid("u1"))),
            SyncCondition::ForeignSession
        );
        assert_eq!(
            classify(&present("u2"), &present("u1"), Some(&uid("u1"))),
            SyncCondition::AccountMismatch {
                idp: uid("u2"),
                backend: uid("u1"),
            }
        );
        assert_eq!(
            classify(&present("u1"), &absent(), None),
            SyncCondition::NeedsSignIn(uid("u1"))
        );
        // DataBackend agrees but the engine never confirmed a sign-in
        assert_eq!(
            classify(&present("u1"), &present("u1"), None),
            SyncCondition::NeedsSignIn(uid("u1"))
        );
        // DataBackend dropped its session
        assert_eq!(
            classify(&present("u1"), &absent(), Some(&uid("u1"))),
            SyncCondition::NeedsSignIn(uid("u1"))
        );
        assert_eq!(
            classify(&present("u1"), &present("u1"), Some(&uid("u1"))),
            SyncCondition::Synchronized(uid("u1"))
        );
    }

    #[test]
    fn test_condition_actions() {
        assert_eq!(SyncCondition::IdleSignedOut.action(), CorrectiveAction::None);
        assert_eq!(
            SyncCondition::ForeignSession.action(),
            CorrectiveAction::SignOutDataBackend
        );
        assert_eq!(
            SyncCondition::AccountMismatch {
                idp: uid("u2"),
                backend: uid("u1")
            }
            .action(),
            CorrectiveAction::SignOutThenSignIn(uid("u2"))
        );
        assert_eq!(
            SyncCondition::NeedsSignIn(uid("u1")).action(),
            CorrectiveAction::SignInDataBackend(uid("u1"))
        );
        assert!(SyncCondition::Synchronized(uid("u1")).is_stable());
    }

    #[test]
    fn test_evaluate_starts_sign_in() {
        let mut engine = SyncEngine::new();
        let eval = engine.evaluate(&present("u1"), &absent()).unwrap();

        assert_eq!(eval, Evaluation::Act(CorrectiveAction::SignInDataBackend(uid("u1"))));
        assert_eq!(engine.phase(), SyncPhase::SigningIn);
        assert!(engine.in_flight());
    }

    #[test]
    fn test_second_action_suppressed_while_in_flight() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();

        let eval = engine.evaluate(&present("u1"), &absent()).unwrap();
        assert_eq!(
            eval,
            Evaluation::Suppressed(CorrectiveAction::SignInDataBackend(uid("u1")))
        );
        assert_eq!(engine.phase(), SyncPhase::SigningIn);
        assert!(engine.take_deferred());
        assert!(!engine.take_deferred());
    }

    #[test]
    fn test_sign_in_success_synchronizes() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine.record_sign_in(&uid("u1"), Ok(())).unwrap();

        assert_eq!(engine.last_synchronized_user_id(), Some(&uid("u1")));
        assert!(!engine.in_flight());
        assert_eq!(
            engine.evaluate(&present("u1"), &present("u1")).unwrap(),
            Evaluation::Stable(SyncCondition::Synchronized(uid("u1")))
        );
    }

    #[test]
    fn test_sign_in_failure_records_error_and_clears_user() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine
            .record_sign_in(&uid("u1"), Err(SyncError::Unauthenticated))
            .unwrap();

        assert_eq!(engine.last_synchronized_user_id(), None);
        assert_eq!(engine.last_error(), Some(&SyncError::Unauthenticated));
        assert!(!engine.in_flight());

        // Same pair re-evaluates to the same action on the next trigger
        assert_eq!(
            engine.evaluate(&present("u1"), &absent()).unwrap(),
            Evaluation::Act(CorrectiveAction::SignInDataBackend(uid("u1")))
        );
    }

    #[test]
    fn test_superseded_sign_in_records_nothing_and_requests_replay() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine.record_sign_in_superseded(&uid("u1")).unwrap();

        assert_eq!(engine.last_synchronized_user_id(), None);
        assert_eq!(engine.last_error(), None);
        assert!(!engine.in_flight());
        assert!(engine.take_deferred());
        assert_eq!(
            engine.evaluate(&present("u2"), &absent()).unwrap(),
            Evaluation::Act(CorrectiveAction::SignInDataBackend(uid("u2")))
        );
    }

    #[test]
    fn test_sign_out_failure_keeps_last_user() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine.record_sign_in(&uid("u1"), Ok(())).unwrap();

        engine.evaluate(&absent(), &present("u1")).unwrap();
        engine
            .record_sign_out(Err(SyncError::BackendSignOutFailed("offline".into())))
            .unwrap();

        assert_eq!(engine.last_synchronized_user_id(), Some(&uid("u1")));
        assert_eq!(
            engine.last_error().map(|e| e.kind()),
            Some(crate::SyncErrorKind::BackendSignOutFailed)
        );
        assert!(!engine.in_flight());
    }

    #[test]
    fn test_sign_out_success_clears_last_user() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine.record_sign_in(&uid("u1"), Ok(())).unwrap();

        assert_eq!(
            engine.evaluate(&absent(), &present("u1")).unwrap(),
            Evaluation::Act(CorrectiveAction::SignOutDataBackend)
        );
        engine.record_sign_out(Ok(())).unwrap();

        assert_eq!(engine.last_synchronized_user_id(), None);
        assert_eq!(
            engine.evaluate(&absent(), &absent()).unwrap(),
            Evaluation::Stable(SyncCondition::IdleSignedOut)
        );
    }

    #[test]
    fn test_switch_rejects_sign_in_before_sign_out() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine.record_sign_in(&uid("u1"), Ok(())).unwrap();

        assert_eq!(
            engine.evaluate(&present("u2"), &present("u1")).unwrap(),
            Evaluation::Act(CorrectiveAction::SignOutThenSignIn(uid("u2")))
        );

        let err = engine.record_sign_in(&uid("u2"), Ok(())).unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
        assert_eq!(engine.last_synchronized_user_id(), Some(&uid("u1")));

        engine.record_sign_out(Ok(())).unwrap();
        assert_eq!(engine.phase(), SyncPhase::Settling);
        assert_eq!(engine.last_synchronized_user_id(), None);

        engine.record_settled().unwrap();
        engine.record_sign_in(&uid("u2"), Ok(())).unwrap();
        assert_eq!(engine.last_synchronized_user_id(), Some(&uid("u2")));
        assert_eq!(engine.phase(), SyncPhase::Idle);
    }

    #[test]
    fn test_repeated_stable_evaluations_do_not_mutate() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine.record_sign_in(&uid("u1"), Ok(())).unwrap();

        let before = engine.snapshot();
        for _ in 0..5 {
            assert_eq!(
                engine.evaluate(&present("u1"), &present("u1")).unwrap(),
                Evaluation::Stable(SyncCondition::Synchronized(uid("u1")))
            );
        }
        assert_eq!(engine.snapshot(), before);

        let mut idle = SyncEngine::new();
        let before = idle.snapshot();
        for _ in 0..5 {
            idle.evaluate(&absent(), &absent()).unwrap();
        }
        assert_eq!(idle.snapshot(), before);
    }

    #[test]
    fn test_stable_evaluation_clears_error_only_when_idle() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine
            .record_sign_in(&uid("u1"), Err(SyncError::TokenExchangeFailed("HTTP 502".into())))
            .unwrap();
        assert!(engine.last_error().is_some());

        engine.evaluate(&absent(), &absent()).unwrap();
        assert!(engine.last_error().is_none());
    }

    #[test]
    fn test_readiness_distinguishes_not_ready_from_signed_out() {
        let mut engine = SyncEngine::new();
        assert_eq!(engine.readiness(&absent(), &absent()), Readiness::SignedOut);
        assert_eq!(engine.readiness(&present("u1"), &absent()), Readiness::NotReady);

        engine.evaluate(&present("u1"), &absent()).unwrap();
        assert_eq!(
            engine.readiness(&present("u1"), &present("u1")),
            Readiness::NotReady
        );

        engine.record_sign_in(&uid("u1"), Ok(())).unwrap();
        assert_eq!(
            engine.readiness(&present("u1"), &present("u1")),
            Readiness::Ready(uid("u1"))
        );
    }

    #[test]
    fn test_teardown_rejects_further_mutation() {
        let mut engine = SyncEngine::new();
        engine.evaluate(&present("u1"), &absent()).unwrap();
        engine.teardown();

        assert_eq!(
            engine.record_sign_in(&uid("u1"), Ok(())),
            Err(TransitionError::TornDown)
        );
        assert_eq!(
            engine.evaluate(&present("u1"), &absent()),
            Err(TransitionError::TornDown)
        );
        assert_eq!(engine.last_synchronized_user_id(), None);
        assert!(engine.is_torn_down());
    }
}
