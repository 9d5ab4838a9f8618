//! Remote peers: backends, connection strings and invitations
//!
//! Backends are registered with the library and addressed by their
//! connection string. [`Session::invite_peer_async`](crate::Session::invite_peer_async)
//! resolves a connection string to a backend on the worker pool and, once
//! the backend accepts, adds it to the session as a remote peer.

pub mod backend;
pub(crate) mod invitation;
pub mod visualizer;

pub use backend::{parse_connection_string, PeerBackend, VISUALIZER_SCHEME};
pub use invitation::InvitationState;
pub use visualizer::{ReceivedFrame, VisualizerBackend};

use crate::library;
use crate::Result;
use std::sync::Arc;

/// Make `backend` invitable and return its connection string
///
/// # Errors
///
/// - `NotInitialized` before `library::init`
/// - `InvalidArgument` for a malformed or already registered connection string
pub fn register_backend(backend: Arc<dyn PeerBackend>) -> Result<String> {
    library::state()?.backends.register(backend)
}

/// Remove a backend; returns whether one was registered
pub fn unregister_backend(connection_string: &str) -> Result<bool> {
    Ok(library::state()?.backends.unregister(connection_string))
}

/// Register a fresh in-process visualizer and return its connection string
pub fn connection_string_visualizer() -> Result<String> {
    register_backend(Arc::new(VisualizerBackend::new()))
}

/// Register `visualizer` and return its connection string
///
/// Keeps a handle for inspecting the frames it receives.
pub fn register_visualizer(visualizer: Arc<VisualizerBackend>) -> Result<String> {
    register_backend(visualizer)
}
