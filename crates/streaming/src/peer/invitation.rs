//! Asynchronous peer invitation
//!
//! ```text
//! Queued -> Negotiating -> Resolved | Failed | Cancelled
//! ```
//!
//! Each invitation owns a slot holding its callbacks. The slot lock is held
//! while a callback runs, which gives three guarantees:
//!
//! - callbacks of one invitation never run concurrently
//! - `on_result` runs at most once (it is taken out of the slot)
//! - a cancelling thread waits for a running callback, then delivers
//!   `Cancelled` itself if no result went out yet, so nothing can fire
//!   after `cancel` returns
//!
//! A cancel issued from inside one of the invitation's own callbacks cannot
//! wait for itself; it suppresses every later callback instead.

use super::backend::{BackendDirectory, PeerBackend};
use crate::config::InvitePeerInit;
use crate::ids::PeerId;
use crate::library::LibraryState;
use crate::session::directory::LogicalSession;
use crate::session::PeerOrigin;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

static NEXT_INVITATION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type ResultCallback = Box<dyn FnOnce(Result<PeerId>) + Send>;
pub(crate) type UpdateCallback = Box<dyn FnMut(&str) + Send>;

/// Lifecycle of a peer invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvitationState {
    Queued,
    Negotiating,
    Resolved,
    Failed,
    Cancelled,
}

impl InvitationState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvitationState::Resolved | InvitationState::Failed | InvitationState::Cancelled
        )
    }
}

struct Callbacks {
    on_result: ResultCallback,
    on_update: UpdateCallback,
}

/// Marks the current thread as running a callback of a slot
struct Firing<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> Firing<'a> {
    fn enter(cell: &'a Mutex<Option<ThreadId>>) -> Self {
        *cell.lock() = Some(thread::current().id());
        Self(cell)
    }
}

impl Drop for Firing<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

pub(crate) struct InvitationSlot {
    id: u64,
    connection_string: String,
    state: Mutex<InvitationState>,
    callbacks: Mutex<Option<Callbacks>>,
    firing: Mutex<Option<ThreadId>>,
    suppressed: AtomicBool,
    token: CancellationToken,
}

impl InvitationSlot {
    fn new(
        connection_string: String,
        token: CancellationToken,
        on_result: ResultCallback,
        on_update: UpdateCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_INVITATION_ID.fetch_add(1, Ordering::Relaxed),
            connection_string,
            state: Mutex::new(InvitationState::Queued),
            callbacks: Mutex::new(Some(Callbacks {
                on_result,
                on_update,
            })),
            firing: Mutex::new(None),
            suppressed: AtomicBool::new(false),
            token,
        })
    }

    pub fn state(&self) -> InvitationState {
        *self.state.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Move to `state` unless the invitation already ended
    fn set_state(&self, state: InvitationState) {
        let mut current = self.state.lock();
        if !current.is_terminal() {
            *current = state;
        }
    }

    fn firing_on_current_thread(&self) -> bool {
        *self.firing.lock() == Some(thread::current().id())
    }

    /// Report progress unless the invitation is cancelled
    fn update(&self, message: &str) {
        if self.token.is_cancelled() {
            return;
        }

        let mut callbacks = self.callbacks.lock();
        if self.token.is_cancelled() || self.suppressed.load(Ordering::Acquire) {
            return;
        }

        if let Some(callbacks) = callbacks.as_mut() {
            let _firing = Firing::enter(&self.firing);
            (callbacks.on_update)(message);
        }
    }

    /// Deliver the terminal outcome
    ///
    /// Returns whether `on_result` ran. After cancellation only the
    /// cancelling paths (`force`) may still deliver, and only `Cancelled`.
    fn finish(&self, outcome: Result<PeerId>, force: bool) -> bool {
        let mut callbacks = self.callbacks.lock();

        if self.suppressed.load(Ordering::Acquire) {
            callbacks.take();
            self.set_state(InvitationState::Cancelled);
            return false;
        }

        if !force && self.token.is_cancelled() {
            return false;
        }

        let Some(Callbacks { on_result, .. }) = callbacks.take() else {
            return false;
        };

        self.set_state(match &outcome {
            Ok(_) => InvitationState::Resolved,
            Err(Error::Cancelled(_)) => InvitationState::Cancelled,
            Err(_) => InvitationState::Failed,
        });

        let _firing = Firing::enter(&self.firing);
        on_result(outcome);
        true
    }

    fn cancelled_error(&self) -> Error {
        Error::Cancelled(format!(
            "invitation {} to {} cancelled",
            self.id, self.connection_string
        ))
    }

    /// Cancel the invitation
    ///
    /// When this returns, `on_result` has run (with `Cancelled` unless a
    /// result was already delivered) and no callback will run again.
    pub fn cancel(&self) {
        self.token.cancel();

        if self.firing_on_current_thread() {
            self.suppressed.store(true, Ordering::Release);
            debug!("Invitation {} cancelled from its own callback", self.id);
            return;
        }

        if self.finish(Err(self.cancelled_error()), true) {
            debug!("Invitation {} cancelled", self.id);
        }
    }
}

/// Delivers `Cancelled` if the worker future ends without a result,
/// including when it is dropped unpolled by a shutting-down pool
struct ResultGuard(Arc<InvitationSlot>);

impl Drop for ResultGuard {
    fn drop(&mut self) {
        let slot = &self.0;
        slot.finish(Err(slot.cancelled_error()), true);
    }
}

/// Queue an invitation on the worker pool
pub(crate) fn spawn(
    library: &LibraryState,
    session: Arc<LogicalSession>,
    token: CancellationToken,
    init: InvitePeerInit,
    on_result: ResultCallback,
    on_update: UpdateCallback,
) -> Result<Arc<InvitationSlot>> {
    super::backend::parse_connection_string(&init.connection_string)?;

    let slot = InvitationSlot::new(init.connection_string.clone(), token, on_result, on_update);
    let guard = ResultGuard(Arc::clone(&slot));
    let backends = Arc::clone(&library.backends);

    debug!(
        "Queued invitation {} to {} for session {}",
        slot.id,
        init.connection_string,
        session.id()
    );

    library.spawn(async move {
        let guard = guard;
        run(&guard.0, &backends, &session, &init).await;
    });

    Ok(slot)
}

async fn run(
    slot: &InvitationSlot,
    backends: &BackendDirectory,
    session: &LogicalSession,
    init: &InvitePeerInit,
) {
    slot.set_state(InvitationState::Negotiating);
    slot.update(&format!("negotiating with {}", init.connection_string));

    let outcome = tokio::select! {
        biased;
        _ = slot.token.cancelled() => return,
        outcome = tokio::time::timeout(
            init.negotiation_timeout(),
            negotiate(slot, backends, session, init),
        ) => outcome.unwrap_or_else(|_| {
            Err(Error::ConnectionFailed(format!(
                "negotiation with {} timed out after {:?}",
                init.connection_string,
                init.negotiation_timeout()
            )))
        }),
    };

    match &outcome {
        Ok(peer_id) => info!(
            "Invitation {} resolved: {} joined session {} as peer {}",
            slot.id,
            init.connection_string,
            session.id(),
            peer_id
        ),
        Err(e) => warn!("Invitation {} failed: {}", slot.id, e),
    }

    let added = outcome.as_ref().ok().copied();
    if !slot.finish(outcome, false) {
        // Cancelled between resolution and delivery
        if let Some(peer_id) = added {
            session.peers.remove(peer_id);
        }
    }
}

fn connect(
    backends: &BackendDirectory,
    session: &LogicalSession,
    connection_string: &str,
) -> Result<Arc<dyn PeerBackend>> {
    let backend = backends.lookup(connection_string).ok_or_else(|| {
        Error::ConnectionFailed(format!("no backend reachable at {}", connection_string))
    })?;

    if session.is_closed() {
        return Err(Error::Cancelled(format!(
            "session {} closed during negotiation",
            session.id()
        )));
    }

    Ok(backend)
}

async fn negotiate(
    slot: &InvitationSlot,
    backends: &BackendDirectory,
    session: &LogicalSession,
    init: &InvitePeerInit,
) -> Result<PeerId> {
    let mut attempt = 0;
    let backend = loop {
        let result = match connect(backends, session, &init.connection_string) {
            Ok(backend) => {
                let latency = backend.handshake_latency();
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                backend.accept(session.id()).map(|()| backend)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(backend) => break backend,
            Err(e) if e.is_retryable() && init.retry.should_retry(attempt) => {
                let delay = init.retry.calculate_backoff(attempt);
                slot.update(&format!(
                    "attempt {} failed ({}), retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                ));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    };

    slot.update(&format!("'{}' accepted the invitation", backend.display_name()));

    let display_name = backend.display_name().to_string();
    let sink = Arc::clone(&backend).frame_sink();
    session.peers.add(&display_name, PeerOrigin::Remote, sink)
}
