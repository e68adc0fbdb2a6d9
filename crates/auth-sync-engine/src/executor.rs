//! Corrective action execution.
//!
//! The executor runs one action against the [`ProviderFacade`] and streams
//! its progress back to the owning context as [`ActionReport`]s. After every
//! suspension point it checks the context's teardown flag and stops without
//! reporting once the context is gone.

use crate::context::ContextId;
use crate::engine::CorrectiveAction;
use crate::error::SyncResult;
use crate::facade::ProviderFacade;
use crate::identity::{IdentityState, UserId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Progress of the action currently in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReportKind {
    SignedOut(SyncResult<()>),
    /// Settling delay elapsed; the sign-in half of a switch is starting.
    SignInStarted,
    SignedIn {
        user_id: UserId,
        result: SyncResult<()>,
    },
    /// The IdP moved off `user_id` while its token was being fetched; the
    /// token was dropped without signing in.
    SignInSuperseded { user_id: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ActionReport {
    pub context_id: ContextId,
    pub kind: ReportKind,
}

pub(crate) struct ActionExecutor {
    context_id: ContextId,
    facade: Arc<dyn ProviderFacade>,
    idp: watch::Receiver<IdentityState>,
    reports: mpsc::UnboundedSender<ActionReport>,
    torn_down: Arc<AtomicBool>,
    settle_delay: Duration,
}

impl ActionExecutor {
    pub fn new(
        context_id: ContextId,
        facade: Arc<dyn ProviderFacade>,
        idp: watch::Receiver<IdentityState>,
        reports: mpsc::UnboundedSender<ActionReport>,
        torn_down: Arc<AtomicBool>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            context_id,
            facade,
            idp,
            reports,
            torn_down,
            settle_delay,
        }
    }

    pub async fn run(self, action: CorrectiveAction) {
        match action {
            CorrectiveAction::None => {}
            CorrectiveAction::SignOutDataBackend => {
                self.sign_out().await;
            }
            CorrectiveAction::SignInDataBackend(user_id) => {
                self.sign_in(user_id).await;
            }
            CorrectiveAction::SignOutThenSignIn(user_id) => {
                if !self.sign_out().await {
                    return;
                }
                if !self.settle_delay.is_zero() {
                    tokio::time::sleep(self.settle_delay).await;
                }
                if !self.report(ReportKind::SignInStarted) {
                    return;
                }
                self.sign_in(user_id).await;
            }
        }
    }

    /// Returns false if the context was torn down.
    async fn sign_out(&self) -> bool {
        debug!(context_id = %self.context_id, "Signing out of DataBackend");
        let result = self.facade.sign_out().await;
        if result.is_ok() {
            info!(context_id = %self.context_id, "DataBackend signed out");
        }
        self.report(ReportKind::SignedOut(result))
    }

    async fn sign_in(&self, user_id: UserId) -> bool {
        debug!(context_id = %self.context_id, user_id = %user_id, "Requesting DataBackend token");
        let result = match self.facade.request_token().await {
            Ok(token) => {
                if self.is_torn_down() {
                    debug!(context_id = %self.context_id, "Context torn down after token fetch");
                    return false;
                }
                if !self.idp_holds(&user_id) {
                    debug!(
                        context_id = %self.context_id,
                        user_id = %user_id,
                        "IdP changed during token fetch; dropping token"
                    );
                    return self.report(ReportKind::SignInSuperseded { user_id });
                }
                self.facade.sign_in(token).await
            }
            Err(e) => Err(e),
        };
        if result.is_ok() {
            info!(context_id = %self.context_id, user_id = %user_id, "DataBackend signed in");
        }
        self.report(ReportKind::SignedIn { user_id, result })
    }

    fn idp_holds(&self, user_id: &UserId) -> bool {
        matches!(&*self.idp.borrow(), IdentityState::Present(current) if current == user_id)
    }

    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn report(&self, kind: ReportKind) -> bool {
        if self.is_torn_down() {
            debug!(context_id = %self.context_id, ?kind, "Discarding late result");
            return false;
        }
        self.reports
            .send(ActionReport {
                context_id: self.context_id,
                kind,
            })
            .is_ok()
    }
}
