//! Peer backends addressed by connection strings
//!
//! A connection string is an out-of-band token of the form
//! `<scheme>://<token>`. It addresses a backend (for example a remote
//! visualizer) that can be invited into a session; it is never used to
//! join one.

use crate::ids::SessionId;
use crate::render::FrameSink;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Scheme of in-process visualizer connection strings
pub const VISUALIZER_SCHEME: &str = "qar+visualizer";

/// Endpoint that can be invited into a session as a remote peer
pub trait PeerBackend: Send + Sync {
    /// Printable connection string addressing this backend
    fn connection_string(&self) -> &str;

    /// Name the backend appears under in peer lists
    fn display_name(&self) -> &str;

    /// Simulated handshake round trip before [`PeerBackend::accept`]
    fn handshake_latency(&self) -> Duration {
        Duration::ZERO
    }

    /// Accept an invitation into `session_id`
    ///
    /// Runs on the worker pool and must not block. Retryable errors
    /// (`ConnectionFailed`) are retried under the invitation's policy.
    fn accept(&self, session_id: SessionId) -> Result<()>;

    /// Where frames for this peer are delivered, if it receives frames
    fn frame_sink(self: Arc<Self>) -> Option<Arc<dyn FrameSink>>;
}

/// Check that `connection_string` is a well-formed `<scheme>://<token>`
pub fn parse_connection_string(connection_string: &str) -> Result<Url> {
    let url = Url::parse(connection_string).map_err(|e| {
        Error::InvalidArgument(format!(
            "malformed connection string '{}': {}",
            connection_string, e
        ))
    })?;

    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::InvalidArgument(format!(
            "connection string '{}' has no backend token",
            connection_string
        )));
    }

    Ok(url)
}

/// Registered backends, keyed by connection string
pub(crate) struct BackendDirectory {
    backends: RwLock<HashMap<String, Arc<dyn PeerBackend>>>,
}

impl BackendDirectory {
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    /// Register a backend and return its connection string
    pub fn register(&self, backend: Arc<dyn PeerBackend>) -> Result<String> {
        let connection_string = backend.connection_string().to_string();
        parse_connection_string(&connection_string)?;

        let mut backends = self.backends.write();
        if backends.contains_key(&connection_string) {
            return Err(Error::InvalidArgument(format!(
                "a backend is already registered at {}",
                connection_string
            )));
        }

        info!(
            "Registered peer backend '{}' at {}",
            backend.display_name(),
            connection_string
        );
        backends.insert(connection_string.clone(), backend);
        Ok(connection_string)
    }

    pub fn unregister(&self, connection_string: &str) -> bool {
        let removed = self.backends.write().remove(connection_string).is_some();
        if removed {
            debug!("Unregistered peer backend at {}", connection_string);
        }
        removed
    }

    pub fn lookup(&self, connection_string: &str) -> Option<Arc<dyn PeerBackend>> {
        self.backends.read().get(connection_string).cloned()
    }

    pub fn clear(&self) {
        self.backends.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedBackend(String);

    impl PeerBackend for NamedBackend {
        fn connection_string(&self) -> &str {
            &self.0
        }

        fn display_name(&self) -> &str {
            "named"
        }

        fn accept(&self, _session_id: SessionId) -> Result<()> {
            Ok(())
        }

        fn frame_sink(self: Arc<Self>) -> Option<Arc<dyn FrameSink>> {
            None
        }
    }

    #[test]
    fn test_parse_connection_string() {
        assert!(parse_connection_string("qar+visualizer://0a1b2c").is_ok());
        assert!(parse_connection_string("no scheme here").is_err());
        assert!(parse_connection_string("qar+visualizer:").is_err());
    }

    #[test]
    fn test_register_and_lookup() {
        let directory = BackendDirectory::new();
        let backend = Arc::new(NamedBackend("qar+visualizer://abc".to_string()));

        let cs = directory.register(backend.clone()).unwrap();
        assert_eq!(cs, "qar+visualizer://abc");
        assert!(directory.lookup(&cs).is_some());
        assert!(directory.register(backend).is_err());

        assert!(directory.unregister(&cs));
        assert!(!directory.unregister(&cs));
        assert!(directory.lookup(&cs).is_none());
    }

    #[test]
    fn test_register_rejects_malformed_strings() {
        let directory = BackendDirectory::new();
        let backend = Arc::new(NamedBackend("garbage".to_string()));
        assert!(matches!(
            directory.register(backend),
            Err(Error::InvalidArgument(_))
        ));
    }
}
