//! Joined session handles
//!
//! A [`Session`] is one peer's membership in a logical session. Several
//! handles may share a logical session (host and guest joining from copies
//! of one invite); they see the same peers and scene objects.

pub(crate) mod directory;
pub mod invite;
pub mod peers;

pub use invite::{Invite, INVITE_PAYLOAD_LENGTH};
pub use peers::{Peer, PeerOrigin};

use crate::config::{InvitePeerInit, SessionJoinInit};
use crate::ids::{PeerId, SessionId};
use crate::library;
use crate::peer::invitation::{self, InvitationSlot};
use crate::render::sender::SenderCore;
use crate::scene::{AppVolumes, GuiPanels, SceneEvent};
use crate::{Error, Result};
use directory::LogicalSession;
use invite::{unix_now, InvitePayload};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct SessionInner {
    pub shared: Arc<LogicalSession>,
    pub local_peer: PeerId,
    /// Child of the logical session token, parent of invitations and senders
    pub cancel: CancellationToken,
    invitations: Mutex<Vec<Arc<InvitationSlot>>>,
    senders: Mutex<Vec<Weak<SenderCore>>>,
    destroyed: AtomicBool,
}

impl SessionInner {
    /// Fail unless both this handle and its logical session are alive
    pub fn ensure_active(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::InvalidState("session has been destroyed".to_string()));
        }
        if self.shared.is_closed() {
            return Err(Error::ConnectionFailed(format!(
                "session {} is closed",
                self.shared.id()
            )));
        }
        Ok(())
    }

    pub fn track_sender(&self, sender: Weak<SenderCore>) {
        let mut senders = self.senders.lock();
        senders.retain(|s| s.strong_count() > 0);
        senders.push(sender);
    }
}

/// A joined peer's handle to a session
///
/// Dropping the handle destroys it.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Join the session referenced by an invite payload
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`library::init`]
    /// - `InvalidArgument` for an invalid peer spec
    /// - `InvalidInvite` if the payload is malformed, tampered with or expired
    /// - `ConnectionFailed` if the session cannot be reached
    /// - `CapacityExceeded` if the session is full
    pub fn join(init: &SessionJoinInit) -> Result<Self> {
        let library = library::state()?;
        init.validate()?;

        let payload = InvitePayload::decode(&init.invite_data, unix_now())?;
        let shared = library.sessions.lookup(&payload.session_id).ok_or_else(|| {
            Error::ConnectionFailed(format!(
                "no rendezvous for session {}",
                payload.session_id
            ))
        })?;

        if !shared.accepts(&payload.secret) {
            return Err(Error::InvalidInvite(format!(
                "invite does not match session {}",
                payload.session_id
            )));
        }

        if shared.is_closed() {
            return Err(Error::ConnectionFailed(format!(
                "session {} is closed",
                payload.session_id
            )));
        }

        let display_name = &init.peer_spec_init.display_name;
        let local_peer = shared.peers.add(display_name, PeerOrigin::Local, None)?;
        let cancel = shared.cancel_token().child_token();

        info!(
            "'{}' joined session {} as peer {}",
            display_name, payload.session_id, local_peer
        );

        Ok(Self {
            inner: Arc::new(SessionInner {
                shared,
                local_peer,
                cancel,
                invitations: Mutex::new(Vec::new()),
                senders: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
            }),
        })
    }

    pub(crate) fn inner(&self) -> &Arc<SessionInner> {
        &self.inner
    }

    /// Id of the logical session
    pub fn id(&self) -> SessionId {
        self.inner.shared.id()
    }

    /// Peer created by this handle's join
    pub fn local_peer(&self) -> PeerId {
        self.inner.local_peer
    }

    /// Snapshot of every peer in the session
    pub fn peers(&self) -> Vec<Peer> {
        self.inner.shared.peers.snapshot()
    }

    pub fn peer(&self, peer_id: PeerId) -> Result<Peer> {
        self.inner
            .shared
            .peers
            .get(peer_id)
            .ok_or_else(|| Error::not_found("peer", peer_id))
    }

    /// GUI panels shared by every peer
    pub fn gui_panels(&self) -> GuiPanels {
        GuiPanels::new(Arc::clone(&self.inner.shared.gui_panels))
    }

    /// App volumes shared by every peer
    pub fn app_volumes(&self) -> AppVolumes {
        AppVolumes::new(Arc::clone(&self.inner.shared.app_volumes))
    }

    /// Receive scene change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SceneEvent> {
        self.inner.shared.subscribe()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Invite a backend, addressed by connection string, into the session
    ///
    /// Returns once the invitation is queued. The outcome arrives later:
    /// `on_update` may fire any number of times with progress text, then
    /// `on_result` fires exactly once with the new remote peer's id or the
    /// failure. Both run on the library's worker pool, never concurrently
    /// for the same invitation.
    ///
    /// If the session is destroyed while the invitation is pending,
    /// `on_result` receives `Cancelled` before [`Session::destroy`] returns
    /// and nothing fires afterwards.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a malformed connection string or options
    /// - `CapacityExceeded` if too many invitations are pending
    /// - `InvalidState` / `ConnectionFailed` if the session is gone
    pub fn invite_peer_async<R, U>(
        &self,
        init: &InvitePeerInit,
        on_result: R,
        on_update: U,
    ) -> Result<()>
    where
        R: FnOnce(Result<PeerId>) + Send + 'static,
        U: FnMut(&str) + Send + 'static,
    {
        init.validate()?;
        let library = library::state()?;

        // Checked under the lock so a concurrent destroy either sees this
        // invitation or makes us fail
        let mut invitations = self.inner.invitations.lock();
        self.inner.ensure_active()?;
        invitations.retain(|slot| !slot.is_finished());

        let limit = self.inner.shared.config().max_pending_invitations as usize;
        if invitations.len() >= limit {
            return Err(Error::CapacityExceeded(format!(
                "{} peer invitations already pending",
                invitations.len()
            )));
        }

        let slot = invitation::spawn(
            &library,
            Arc::clone(&self.inner.shared),
            self.inner.cancel.child_token(),
            init.clone(),
            Box::new(on_result),
            Box::new(on_update),
        )?;
        invitations.push(slot);
        Ok(())
    }

    /// Leave the session
    ///
    /// Cancels this handle's pending invitations (delivering `Cancelled`
    /// before returning), stops its render senders and removes its local
    /// peer. The logical session and its scene objects stay alive for the
    /// other handles. Calling destroy again is a no-op.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.cancel.cancel();

        let invitations: Vec<_> = self.inner.invitations.lock().drain(..).collect();
        for slot in &invitations {
            slot.cancel();
        }

        let senders: Vec<_> = self.inner.senders.lock().drain(..).collect();
        for sender in senders.iter().filter_map(Weak::upgrade) {
            sender.stop();
        }

        if self
            .inner
            .shared
            .peers
            .remove(self.inner.local_peer)
            .is_none()
            && !self.inner.shared.is_closed()
        {
            warn!(
                "Local peer {} was already gone from session {}",
                self.inner.local_peer,
                self.id()
            );
        }

        debug!(
            "Session handle for peer {} destroyed ({} invitations cancelled)",
            self.inner.local_peer,
            invitations.len()
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("local_peer", &self.inner.local_peer)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
