//! Rendezvous of live logical sessions
//!
//! A logical session is created by a runtime and outlives the individual
//! [`Session`](super::Session) handles joined to it. Its registries and
//! peer set are shared by every handle with the same session id.

use super::invite::{secrets_match, JoinSecret};
use super::peers::PeerSet;
use crate::config::SessionCreateInit;
use crate::ids::SessionId;
use crate::scene::{AppVolumeKind, GuiPanelKind, ObjectRegistry, SceneEvent};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Buffered scene events per subscriber before old ones are dropped
const SCENE_EVENT_CAPACITY: usize = 256;

/// State shared by every joined handle of one session
pub(crate) struct LogicalSession {
    id: SessionId,
    secret: JoinSecret,
    config: SessionCreateInit,
    pub peers: PeerSet,
    pub gui_panels: Arc<ObjectRegistry<GuiPanelKind>>,
    pub app_volumes: Arc<ObjectRegistry<AppVolumeKind>>,
    events: broadcast::Sender<SceneEvent>,
    /// Parent of every handle, invitation and sender token
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl LogicalSession {
    pub fn new(id: SessionId, secret: JoinSecret, config: SessionCreateInit) -> Arc<Self> {
        let (events, _) = broadcast::channel(SCENE_EVENT_CAPACITY);
        Arc::new(Self {
            id,
            secret,
            peers: PeerSet::new(id, config.max_peers as usize),
            gui_panels: ObjectRegistry::new(id, config.max_gui_panels as usize, events.clone()),
            app_volumes: ObjectRegistry::new(id, config.max_app_volumes as usize, events.clone()),
            config,
            events,
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionCreateInit {
        &self.config
    }

    /// Whether `secret` is this session's join secret
    pub fn accepts(&self, secret: &JoinSecret) -> bool {
        secrets_match(&self.secret, secret)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SceneEvent> {
        self.events.subscribe()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Release the session for every handle
    ///
    /// Cancels outstanding work, closes every scene object and drops all
    /// peers. Calling it again is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.cancel.cancel();
        self.gui_panels.close_all();
        self.app_volumes.close_all();
        self.peers.close();
        info!("Session {} closed", self.id);
    }
}

/// Process-wide map from session id to logical session
pub(crate) struct SessionDirectory {
    sessions: RwLock<HashMap<SessionId, Arc<LogicalSession>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, session: Arc<LogicalSession>) {
        self.sessions.write().insert(session.id(), session);
    }

    pub fn lookup(&self, id: &SessionId) -> Option<Arc<LogicalSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn remove(&self, id: &SessionId) -> Option<Arc<LogicalSession>> {
        self.sessions.write().remove(id)
    }

    /// Remove every session
    pub fn drain(&self) -> Vec<Arc<LogicalSession>> {
        self.sessions.write().drain().map(|(_, s)| s).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
