//! Integration tests for process library init and destroy
//!
//! Kept to a single test: the library is process-wide and this binary
//! walks it through its whole lifecycle.

use qar_streaming::library::{self, LOG_FILE_NAME};
use qar_streaming::peer::{self, VisualizerBackend};
use qar_streaming::{
    Error, InvitePeerInit, LibraryInit, ResultCode, Runtime, RuntimeInit, Session,
    SessionCreateInit, SessionJoinInit,
};
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[test]
fn test_library_lifecycle() {
    // ------------------------------------------------------------------
    // Before init
    // ------------------------------------------------------------------
    assert!(!library::is_initialized());
    let err = Runtime::create(&RuntimeInit::default()).unwrap_err();
    assert!(matches!(err, Error::NotInitialized));
    assert_eq!(err.code(), ResultCode::NotInitialized);
    assert!(matches!(library::destroy(), Err(Error::NotInitialized)));

    // ------------------------------------------------------------------
    // Init
    // ------------------------------------------------------------------
    let log_dir = tempfile::tempdir().unwrap();
    let log_folder = log_dir.path().join("logs");
    let config = LibraryInit::default()
        .with_log_folder(&log_folder)
        .with_log_filter("qar_streaming=debug");

    assert!(matches!(
        library::init(&LibraryInit::default().with_worker_threads(0)),
        Err(Error::InvalidArgument(_))
    ));
    library::init(&config).unwrap();
    assert!(library::is_initialized());
    assert!(log_folder.join(LOG_FILE_NAME).is_file());
    assert!(matches!(
        library::init(&config),
        Err(Error::AlreadyInitialized)
    ));

    // ------------------------------------------------------------------
    // Live objects at destroy time
    // ------------------------------------------------------------------
    let runtime = Runtime::create(&RuntimeInit::default()).unwrap();
    let invite = runtime.create_session(&SessionCreateInit::default()).unwrap();
    let host = Session::join(&SessionJoinInit::new(invite.to_bytes(), "Host")).unwrap();

    let slow = VisualizerBackend::new().with_handshake_latency(Duration::from_secs(5));
    let connection_string = peer::register_visualizer(Arc::new(slow)).unwrap();
    let (tx, rx) = mpsc::channel();
    host.invite_peer_async(
        &InvitePeerInit::new(&connection_string),
        move |result| {
            let _ = tx.send(result);
        },
        |_| {},
    )
    .unwrap();

    library::destroy().unwrap();
    assert!(!library::is_initialized());

    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(result, Err(Error::Cancelled(_))), "Got {:?}", result);

    // ------------------------------------------------------------------
    // After destroy
    // ------------------------------------------------------------------
    assert!(matches!(
        Session::join(&SessionJoinInit::new(invite.to_bytes(), "Guest")),
        Err(Error::NotInitialized)
    ));
    assert!(runtime
        .create_session(&SessionCreateInit::default())
        .unwrap_err()
        .is_lifecycle_error());
    assert!(matches!(
        peer::connection_string_visualizer(),
        Err(Error::NotInitialized)
    ));
    drop(host);
    drop(runtime);

    // ------------------------------------------------------------------
    // Re-init
    // ------------------------------------------------------------------
    library::init(&config).unwrap();
    let runtime = Runtime::create(&RuntimeInit::default()).unwrap();
    assert_eq!(runtime.session_count(), 0);
    drop(runtime);
    library::destroy().unwrap();
    assert!(matches!(library::destroy(), Err(Error::NotInitialized)));
}
