//! Shared helpers for integration tests
//!
//! The library is process-wide, so every test binary initializes it once
//! and never destroys it (except the lifecycle tests, which own their
//! process).

#![allow(dead_code)]

use qar_streaming::{
    library, Error, InvitePeerInit, LibraryInit, PeerId, Result, Runtime, RuntimeInit, Session,
    SessionCreateInit, SessionJoinInit,
};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::time::Duration;

/// Generous bound for anything crossing the worker pool
pub const WAIT: Duration = Duration::from_secs(10);

static LOG_DIR: OnceLock<tempfile::TempDir> = OnceLock::new();

/// Initialize the library for this test binary
pub fn init_library() {
    let log_dir = LOG_DIR.get_or_init(|| tempfile::tempdir().expect("temp log dir"));
    let config = LibraryInit::default()
        .with_log_folder(log_dir.path())
        .with_log_filter("qar_streaming=debug")
        .with_worker_threads(4);

    match library::init(&config) {
        Ok(()) | Err(Error::AlreadyInitialized) => {}
        Err(e) => panic!("library init failed: {}", e),
    }
}

pub fn runtime() -> Runtime {
    init_library();
    Runtime::create(&RuntimeInit::default()).expect("runtime")
}

/// Create a session and join it as "Host"; returns the host and invite bytes
pub fn host_session(runtime: &Runtime, init: &SessionCreateInit) -> (Session, Vec<u8>) {
    let invite = runtime.create_session(init).expect("create session");
    let data = invite.to_bytes();
    let host = Session::join(&SessionJoinInit::new(data.clone(), "Host")).expect("host join");
    (host, data)
}

/// Invite `connection_string` into `session` and block for the result
pub fn invite_and_wait(session: &Session, connection_string: &str) -> Result<PeerId> {
    let (tx, rx) = mpsc::channel();
    session.invite_peer_async(
        &InvitePeerInit::new(connection_string),
        move |result| {
            let _ = tx.send(result);
        },
        |_| {},
    )?;
    rx.recv_timeout(WAIT).expect("invitation result")
}

/// Poll `condition` until it holds or `WAIT` elapses
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
