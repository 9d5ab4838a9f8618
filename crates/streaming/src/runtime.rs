//! Runtime: backend discovery and session factory

use crate::config::{RuntimeInit, SessionCreateInit};
use crate::ids::SessionId;
use crate::library;
use crate::render::{available_backends, GraphicsApi};
use crate::session::directory::{LogicalSession, SessionDirectory};
use crate::session::invite::{generate_secret, unix_now, Invite, InvitePayload};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

pub(crate) struct RuntimeInner {
    binaries_folder: PathBuf,
    sessions: Mutex<Vec<Arc<LogicalSession>>>,
    destroyed: AtomicBool,
}

impl RuntimeInner {
    /// Close every logical session created by this runtime
    pub fn close_sessions(&self, directory: Option<&SessionDirectory>) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        let sessions: Vec<_> = self.sessions.lock().drain(..).collect();
        for session in sessions {
            if let Some(directory) = directory {
                directory.remove(&session.id());
            }
            session.close();
        }
    }
}

/// Binds to a backend binaries folder and creates sessions
///
/// Dropping the runtime destroys it.
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime
    ///
    /// # Errors
    ///
    /// - `NotInitialized` before [`library::init`]
    /// - `InvalidArgument` if the binaries folder does not exist
    pub fn create(init: &RuntimeInit) -> Result<Self> {
        let library = library::state()?;
        let binaries_folder = init.resolve_binaries_folder()?;

        let inner = Arc::new(RuntimeInner {
            binaries_folder,
            sessions: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        });
        library.track_runtime(Arc::downgrade(&inner));

        info!(
            "Runtime created (binaries folder: {})",
            inner.binaries_folder.display()
        );
        Ok(Self { inner })
    }

    /// Folder used for backend discovery
    pub fn binaries_folder(&self) -> &Path {
        &self.inner.binaries_folder
    }

    /// Graphics backends render senders may select
    pub fn graphics_backends(&self) -> Vec<GraphicsApi> {
        available_backends().to_vec()
    }

    /// Number of sessions created by this runtime that are still open
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Allocate a new logical session and return its invite
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `init` does not validate
    /// - `InvalidState` after [`Runtime::destroy`]
    /// - `NotInitialized` after [`library::destroy`]
    pub fn create_session(&self, init: &SessionCreateInit) -> Result<Invite> {
        init.validate()?;

        if self.inner.destroyed.load(Ordering::Acquire) {
            return Err(Error::InvalidState("runtime has been destroyed".to_string()));
        }
        let library = library::state()?;

        let session_id = SessionId::generate();
        let payload = InvitePayload {
            session_id,
            secret: generate_secret(),
            expires_at: init
                .invite_ttl()
                .map(|ttl| unix_now().saturating_add(ttl.as_secs())),
        };

        let session = LogicalSession::new(session_id, payload.secret, init.clone());
        library.sessions.register(Arc::clone(&session));
        self.inner.sessions.lock().push(session);

        info!(
            "Created session {} (max peers: {}, invite ttl: {:?})",
            session_id,
            init.max_peers,
            init.invite_ttl()
        );
        Ok(Invite::new(&payload))
    }

    /// Destroy the runtime, closing every session it created
    ///
    /// Joined session handles stay valid objects but their session is gone:
    /// new joins fail with `ConnectionFailed` and scene operations with
    /// `NotFound`. Calling destroy again is a no-op.
    pub fn destroy(&self) {
        let directory = library::state().ok();
        self.inner
            .close_sessions(directory.as_ref().map(|l| &l.sessions));
        debug!("Runtime destroyed");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("binaries_folder", &self.inner.binaries_folder)
            .field("destroyed", &self.inner.destroyed.load(Ordering::Relaxed))
            .finish()
    }
}
