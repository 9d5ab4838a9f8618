//! QAR Streaming - session and render streaming core
//!
//! This crate establishes invite-based multi-peer AR/VR sessions, keeps the
//! scene objects (GUI panels, app volumes) every peer shares, and streams
//! rendered frames to remote peers in order and with backpressure.
//!
//! # Architecture
//!
//! ```text
//! library::init ── worker pool, logging, session + backend directories
//!   └─ Runtime ── create_session ──> Invite (opaque bytes)
//!        └─ Session::join(invite) ── one handle per joined peer
//!             ├─ peers()            shared peer set
//!             ├─ gui_panels()       ObjectRegistry<GuiPanelKind>
//!             ├─ app_volumes()      ObjectRegistry<AppVolumeKind>
//!             ├─ invite_peer_async  connection string ──> remote peer
//!             └─ RenderSender       begin ─> populate ─> show ─> delivery worker ─> FrameSink
//! ```
//!
//! Synchronous calls return [`Result`]; asynchronous work (peer invitation,
//! frame delivery) runs on the library's worker pool and reports back
//! through callbacks or counters.
//!
//! # Example
//!
//! ```ignore
//! use qar_streaming::{library, LibraryInit, Runtime, RuntimeInit, Session, SessionCreateInit, SessionJoinInit};
//!
//! fn main() -> qar_streaming::Result<()> {
//!     library::init(&LibraryInit::default().with_console_logging(true))?;
//!
//!     let runtime = Runtime::create(&RuntimeInit::default())?;
//!     let invite = runtime.create_session(&SessionCreateInit::default())?;
//!
//!     let host = Session::join(&SessionJoinInit::new(invite.to_bytes(), "Host"))?;
//!     let guest = Session::join(&SessionJoinInit::new(invite.to_bytes(), "Guest"))?;
//!     assert_eq!(host.peers().len(), 2);
//!
//!     drop((guest, host, runtime));
//!     library::destroy()
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod ids;
pub mod library;
pub mod peer;
pub mod render;
pub mod retry;
pub mod runtime;
pub mod scene;
pub mod session;

pub use config::{
    InvitePeerInit, LibraryInit, PeerSpecInit, RenderSenderInit, RuntimeInit, SessionCreateInit,
    SessionJoinInit,
};
pub use error::{result_code, Error, Result, ResultCode};
pub use ids::{AppVolumeId, GuiPanelId, PeerId, SessionId};
pub use peer::{InvitationState, PeerBackend, VisualizerBackend};
pub use render::{
    BackendConfig, FrameInfo, FrameLayout, FrameShow, FrameSink, GraphicsApi, NearFar,
    RenderSender, RenderStats,
};
pub use retry::RetryPolicy;
pub use runtime::Runtime;
pub use scene::{
    AppVolumeInit, AppVolumeSize, GuiPanelInit, GuiPanelSize, GuiPanelState, Pose, SceneEvent,
};
pub use session::{Invite, Peer, PeerOrigin, Session};

/// Version of the streaming core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
