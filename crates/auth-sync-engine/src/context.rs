//! Synchronization context: one per active UI session root.
//!
//! [`SyncContext::spawn`] starts a driver task that exclusively owns the
//! [`SyncEngine`]. The driver reacts to the two identity observers, starts at
//! most one corrective action at a time, and feeds action reports back into
//! the engine. Dropping or shutting down the returned [`SyncHandle`] tears the
//! context down; any result arriving afterwards is discarded.

use crate::config::SyncConfig;
use crate::engine::{Evaluation, SyncEngine, SyncSnapshot};
use crate::executor::{ActionExecutor, ActionReport, ReportKind};
use crate::facade::ProviderFacade;
use crate::identity::{IdentityState, Readiness};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique identifier of one synchronization context instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable state of a context, published after every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub context_id: ContextId,
    pub idp: IdentityState,
    pub backend: IdentityState,
    pub snapshot: SyncSnapshot,
    pub readiness: Readiness,
    pub torn_down: bool,
}

enum Command {
    Retry,
    Shutdown,
}

/// Builder for a synchronization context.
pub struct SyncContext {
    idp: watch::Receiver<IdentityState>,
    backend: watch::Receiver<IdentityState>,
    facade: Arc<dyn ProviderFacade>,
    config: SyncConfig,
}

impl SyncContext {
    /// Creates a context over the given observer handles and facade.
    pub fn new(
        idp: watch::Receiver<IdentityState>,
        backend: watch::Receiver<IdentityState>,
        facade: Arc<dyn ProviderFacade>,
    ) -> Self {
        Self {
            idp,
            backend,
            facade,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the driver task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> SyncHandle {
        let id = ContextId::new();
        let torn_down = Arc::new(AtomicBool::new(false));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (driver, status_rx) = self.into_driver(id, torn_down.clone(), commands_rx);
        let task = tokio::spawn(driver.run());

        SyncHandle {
            id,
            commands: commands_tx,
            status: status_rx,
            torn_down,
            task: Some(task),
        }
    }

    fn into_driver(
        self,
        id: ContextId,
        torn_down: Arc<AtomicBool>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> (Driver, watch::Receiver<SyncStatus>) {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();

        let engine = SyncEngine::new();
        let idp = self.idp.borrow().clone();
        let backend = self.backend.borrow().clone();
        let initial = SyncStatus {
            context_id: id,
            readiness: engine.readiness(&idp, &backend),
            snapshot: engine.snapshot(),
            idp: idp.clone(),
            backend,
            torn_down: false,
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let driver = Driver {
            id,
            engine,
            idp: self.idp,
            backend: self.backend,
            facade: self.facade,
            config: self.config,
            torn_down,
            reports_tx,
            reports_rx,
            commands,
            status: status_tx,
            action_task: None,
            retry_attempt: 0,
            retry_at: None,
            last_idp: idp,
        };
        (driver, status_rx)
    }
}

/// Owner handle of a running context.
pub struct SyncHandle {
    id: ContextId,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SyncStatus>,
    torn_down: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Latest published status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Explicit external retry trigger: re-evaluates the current pair.
    pub fn retry(&self) {
        let _ = self.commands.send(Command::Retry);
    }

    /// Tears the context down and waits for the driver to stop.
    pub async fn shutdown(mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct Driver {
    id: ContextId,
    engine: SyncEngine,
    idp: watch::Receiver<IdentityState>,
    backend: watch::Receiver<IdentityState>,
    facade: Arc<dyn ProviderFacade>,
    config: SyncConfig,
    torn_down: Arc<AtomicBool>,
    reports_tx: mpsc::UnboundedSender<ActionReport>,
    reports_rx: mpsc::UnboundedReceiver<ActionReport>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SyncStatus>,
    action_task: Option<JoinHandle<()>>,
    retry_attempt: u32,
    retry_at: Option<Instant>,
    /// IdP identity seen at the last trigger; a change resets the retry budget.
    last_idp: IdentityState,
}

impl Driver {
    async fn run(mut self) {
        info!(context_id = %self.id, "Synchronization context started");
        self.idp.mark_unchanged();
        self.backend.mark_unchanged();
        self.evaluate("initial");

        let mut idp_open = true;
        let mut backend_open = true;

        loop {
            let retry_at = self.retry_at;

            tokio::select! {
                changed = self.idp.changed(), if idp_open => {
                    if changed.is_err() {
                        debug!(context_id = %self.id, "IdP observer closed");
                        idp_open = false;
                        continue;
                    }
                    self.on_idp_changed();
                }
                changed = self.backend.changed(), if backend_open => {
                    if changed.is_err() {
                        debug!(context_id = %self.id, "DataBackend observer closed");
                        backend_open = false;
                        continue;
                    }
                    self.evaluate("backend_changed");
                }
                Some(report) = self.reports_rx.recv() => {
                    self.on_report(report);
                }
                _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    self.retry_at = None;
                    self.evaluate("scheduled_retry");
                }
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Retry) => self.evaluate("explicit_retry"),
                        Some(Command::Shutdown) | None => {
                            self.teardown();
                            break;
                        }
                    }
                }
            }
        }
    }

    fn on_idp_changed(&mut self) {
        let idp = self.idp.borrow_and_update().clone();
        if idp != self.last_idp {
            debug!(context_id = %self.id, from = %self.last_idp, to = %idp, "IdP identity changed");
            self.retry_attempt = 0;
            self.retry_at = None;
            self.last_idp = idp;
        }
        self.evaluate("idp_changed");
    }

    /// Set by the owning handle as soon as teardown begins, before the
    /// driver sees the shutdown command.
    fn teardown_requested(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn evaluate(&mut self, trigger: &'static str) {
        if self.teardown_requested() {
            debug!(context_id = %self.id, trigger, "Ignoring trigger after teardown");
            return;
        }
        let idp = self.idp.borrow().clone();
        let backend = self.backend.borrow().clone();

        match self.engine.evaluate(&idp, &backend) {
            Ok(Evaluation::Act(action)) => {
                debug!(context_id = %self.id, trigger, ?action, "Dispatching action");
                self.retry_at = None;
                let executor = ActionExecutor::new(
                    self.id,
                    self.facade.clone(),
                    self.idp.clone(),
                    self.reports_tx.clone(),
                    self.torn_down.clone(),
                    self.config.settle_delay,
                );
                self.action_task = Some(tokio::spawn(executor.run(action)));
            }
            Ok(Evaluation::Stable(condition)) => {
                debug!(context_id = %self.id, trigger, ?condition, "No action needed");
            }
            Ok(Evaluation::Suppressed(action)) => {
                debug!(context_id = %self.id, trigger, ?action, "Deferred until in-flight action completes");
            }
            Err(e) => {
                warn!(context_id = %self.id, trigger, error = %e, "Evaluation rejected");
            }
        }
        self.publish();
    }

    fn on_report(&mut self, report: ActionReport) {
        if report.context_id != self.id {
            warn!(
                context_id = %self.id,
                report_context_id = %report.context_id,
                "Discarding report from another context"
            );
            return;
        }
        if self.teardown_requested() {
            debug!(context_id = %self.id, kind = ?report.kind, "Discarding report after teardown");
            return;
        }

        let recorded = match report.kind {
            ReportKind::SignedOut(result) => self.engine.record_sign_out(result),
            ReportKind::SignInStarted => self.engine.record_settled(),
            ReportKind::SignedIn { user_id, result } => {
                let outcome = result.as_ref().map_err(|e| e.is_retryable()).map(|_| ());
                let recorded = self.engine.record_sign_in(&user_id, result);
                match outcome {
                    Ok(()) => self.retry_attempt = 0,
                    Err(true) => self.schedule_retry(),
                    Err(false) => {}
                }
                recorded
            }
            ReportKind::SignInSuperseded { user_id } => {
                self.engine.record_sign_in_superseded(&user_id)
            }
        };
        if let Err(e) = recorded {
            warn!(context_id = %self.id, error = %e, "Action report rejected");
        }

        if !self.engine.in_flight() {
            self.action_task = None;
            if self.engine.take_deferred() {
                self.evaluate("deferred");
                return;
            }
        }
        self.publish();
    }

    fn schedule_retry(&mut self) {
        let Some(retry) = &self.config.retry else {
            return;
        };
        if self.retry_attempt >= retry.max_retries {
            info!(
                context_id = %self.id,
                attempts = self.retry_attempt,
                "Retry budget exhausted; waiting for next trigger"
            );
            return;
        }
        let delay = retry.delay_for_attempt(self.retry_attempt);
        self.retry_attempt += 1;
        self.retry_at = Some(Instant::now() + delay);
        debug!(
            context_id = %self.id,
            attempt = self.retry_attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduled sign-in retry"
        );
    }

    fn teardown(&mut self) {
        self.torn_down.store(true, Ordering::SeqCst);
        self.engine.teardown();
        if let Some(task) = self.action_task.take() {
            task.abort();
        }
        self.retry_at = None;
        info!(context_id = %self.id, "Synchronization context torn down");
        self.publish();
    }

    fn publish(&self) {
        let idp = self.idp.borrow().clone();
        let backend = self.backend.borrow().clone();
        let status = SyncStatus {
            context_id: self.id,
            readiness: self.engine.readiness(&idp, &backend),
            snapshot: self.engine.snapshot(),
            idp,
            backend,
            torn_down: self.engine.is_torn_down(),
        };
        self.status.send_replace(status);
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(task) = self.action_task.take() {
            task.abort();
        }
    }
}
