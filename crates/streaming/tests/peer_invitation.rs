//! Integration tests for asynchronous peer invitation

mod common;

use common::{host_session, invite_and_wait, runtime, WAIT};
use parking_lot::Mutex;
use qar_streaming::peer::{self, VisualizerBackend};
use qar_streaming::{
    Error, InvitePeerInit, PeerId, PeerOrigin, Result, RetryPolicy, Session, SessionCreateInit,
    SessionJoinInit,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

fn slow_visualizer(latency: Duration) -> String {
    let visualizer = VisualizerBackend::new().with_handshake_latency(latency);
    peer::register_visualizer(Arc::new(visualizer)).unwrap()
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_visualizer_joins_as_remote_peer() {
    let runtime = runtime();
    let (host, payload) = host_session(&runtime, &SessionCreateInit::default());
    let guest = Session::join(&SessionJoinInit::new(payload, "Guest")).unwrap();

    let visualizer = Arc::new(VisualizerBackend::new().with_display_name("Headset"));
    let connection_string = peer::register_visualizer(Arc::clone(&visualizer)).unwrap();
    assert!(connection_string.starts_with("qar+visualizer://"));

    let updates = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    {
        let updates = Arc::clone(&updates);
        host.invite_peer_async(
            &InvitePeerInit::new(&connection_string),
            move |result| {
                let _ = tx.send(result);
            },
            move |_| {
                updates.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
    }

    let peer_id = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert!(updates.load(Ordering::SeqCst) >= 1, "Progress was reported");
    assert_eq!(visualizer.sessions(), vec![host.id()]);

    let remote = guest.peer(peer_id).unwrap();
    assert_eq!(remote.display_name, "Headset");
    assert_eq!(remote.origin, PeerOrigin::Remote);
    assert_eq!(host.peers().len(), 3);
}

#[test]
fn test_connection_string_visualizer_is_invitable() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());

    let connection_string = peer::connection_string_visualizer().unwrap();
    let peer_id = invite_and_wait(&host, &connection_string).unwrap();
    assert_eq!(host.peer(peer_id).unwrap().display_name, "Visualizer");

    assert!(peer::unregister_backend(&connection_string).unwrap());
    assert!(!peer::unregister_backend(&connection_string).unwrap());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_malformed_connection_string_fails_synchronously() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());

    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    let err = host
        .invite_peer_async(
            &InvitePeerInit::new("definitely not a connection string"),
            move |_| flag.store(true, Ordering::SeqCst),
            |_| {},
        )
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)), "Got {:?}", err);
    std::thread::sleep(Duration::from_millis(50));
    assert!(!fired.load(Ordering::SeqCst), "No callback for a rejected call");
}

#[test]
fn test_unknown_backend_reports_connection_failed() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());

    let (tx, rx) = mpsc::channel();
    let init = InvitePeerInit::new("qar+visualizer://00000000000000000000000000000000")
        .with_retry(RetryPolicy::no_retry());
    host.invite_peer_async(
        &init,
        move |result| {
            let _ = tx.send(result);
        },
        |_| {},
    )
    .unwrap();

    let result = rx.recv_timeout(WAIT).unwrap();
    assert!(matches!(result, Err(Error::ConnectionFailed(_))), "Got {:?}", result);
    assert_eq!(host.peers().len(), 1);
}

#[test]
fn test_negotiation_is_bounded_by_timeout() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let connection_string = slow_visualizer(Duration::from_secs(5));

    let (tx, rx) = mpsc::channel();
    let init =
        InvitePeerInit::new(&connection_string).with_negotiation_timeout(Duration::from_millis(100));
    host.invite_peer_async(
        &init,
        move |result| {
            let _ = tx.send(result);
        },
        |_| {},
    )
    .unwrap();

    let result = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(result, Err(Error::ConnectionFailed(_))), "Got {:?}", result);
}

#[test]
fn test_pending_invitations_are_limited() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let connection_string = slow_visualizer(Duration::from_secs(5));
    let limit = SessionCreateInit::default().max_pending_invitations;

    let cancelled = Arc::new(AtomicUsize::new(0));
    for _ in 0..limit {
        let cancelled = Arc::clone(&cancelled);
        host.invite_peer_async(
            &InvitePeerInit::new(&connection_string),
            move |result: Result<PeerId>| {
                if matches!(result, Err(Error::Cancelled(_))) {
                    cancelled.fetch_add(1, Ordering::SeqCst);
                }
            },
            |_| {},
        )
        .unwrap();
    }

    let err = host
        .invite_peer_async(&InvitePeerInit::new(&connection_string), |_| {}, |_| {})
        .unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded(_)));

    host.destroy();
    assert_eq!(cancelled.load(Ordering::SeqCst), limit as usize);
}

// ============================================================================
// Cancellation safety
// ============================================================================

#[derive(Debug, PartialEq)]
enum Observed {
    Result { cancelled: bool, after_destroy: bool },
    Update { after_destroy: bool },
}

#[test]
fn test_destroy_with_pending_invitation() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let connection_string = slow_visualizer(Duration::from_millis(300));

    let destroyed = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(Mutex::new(Vec::new()));

    {
        let (destroyed_r, observed_r) = (Arc::clone(&destroyed), Arc::clone(&observed));
        let (destroyed_u, observed_u) = (Arc::clone(&destroyed), Arc::clone(&observed));
        host.invite_peer_async(
            &InvitePeerInit::new(&connection_string),
            move |result| {
                observed_r.lock().push(Observed::Result {
                    cancelled: matches!(result, Err(Error::Cancelled(_))),
                    after_destroy: destroyed_r.load(Ordering::SeqCst),
                });
            },
            move |_| {
                observed_u.lock().push(Observed::Update {
                    after_destroy: destroyed_u.load(Ordering::SeqCst),
                });
            },
        )
        .unwrap();
    }

    host.destroy();
    destroyed.store(true, Ordering::SeqCst);

    // Longer than the handshake, so a leaked worker would have fired by now
    std::thread::sleep(Duration::from_millis(600));

    let observed = observed.lock();
    let results: Vec<_> = observed
        .iter()
        .filter(|o| matches!(o, Observed::Result { .. }))
        .collect();
    assert_eq!(
        results,
        vec![&Observed::Result {
            cancelled: true,
            after_destroy: false
        }],
        "Exactly one Cancelled result, delivered before destroy returned"
    );
    assert!(
        observed.iter().all(|o| match o {
            Observed::Result { after_destroy, .. } | Observed::Update { after_destroy } =>
                !after_destroy,
        }),
        "Nothing fired after destroy returned: {:?}",
        *observed
    );
}

#[test]
fn test_resolved_result_is_not_followed_by_cancel() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let connection_string = peer::connection_string_visualizer().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();
    {
        let calls = Arc::clone(&calls);
        host.invite_peer_async(
            &InvitePeerInit::new(&connection_string),
            move |result| {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(result.is_ok());
            },
            |_| {},
        )
        .unwrap();
    }

    assert!(rx.recv_timeout(WAIT).unwrap());
    host.destroy();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invite_after_destroy_is_rejected() {
    let runtime = runtime();
    let (host, _) = host_session(&runtime, &SessionCreateInit::default());
    let connection_string = peer::connection_string_visualizer().unwrap();

    host.destroy();
    let err = host
        .invite_peer_async(&InvitePeerInit::new(&connection_string), |_| {}, |_| {})
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}
