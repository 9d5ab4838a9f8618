//! Peer membership of a logical session

use crate::ids::{PeerId, SessionId};
use crate::render::FrameSink;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// How a peer entered the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerOrigin {
    /// Joined through an invite payload
    Local,
    /// Added by a resolved peer invitation
    Remote,
}

/// Participant of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub peer_id: PeerId,
    pub display_name: String,
    pub origin: PeerOrigin,
}

struct PeerEntry {
    peer: Peer,
    /// Where frames for this peer go (remote peers only)
    sink: Option<Arc<dyn FrameSink>>,
}

#[derive(Default)]
struct PeerTable {
    entries: Vec<PeerEntry>,
    /// Set once the session closes; no peer is admitted afterwards
    closed: bool,
}

/// Bounded set of peers shared by every handle to a session
pub(crate) struct PeerSet {
    session_id: SessionId,
    max_peers: usize,
    peers: RwLock<PeerTable>,
}

impl PeerSet {
    pub fn new(session_id: SessionId, max_peers: usize) -> Self {
        Self {
            session_id,
            max_peers,
            peers: RwLock::new(PeerTable::default()),
        }
    }

    /// Admit a peer
    ///
    /// Fails with `CapacityExceeded` when the session is full and with
    /// `ConnectionFailed` once it has closed.
    pub fn add(
        &self,
        display_name: &str,
        origin: PeerOrigin,
        sink: Option<Arc<dyn FrameSink>>,
    ) -> Result<PeerId> {
        let mut table = self.peers.write();
        if table.closed {
            return Err(Error::ConnectionFailed(format!(
                "session {} is closed",
                self.session_id
            )));
        }

        let peers = &mut table.entries;
        if peers.len() >= self.max_peers {
            return Err(Error::CapacityExceeded(format!(
                "session {} already has {} peers",
                self.session_id, self.max_peers
            )));
        }

        let peer_id = PeerId::generate();
        peers.push(PeerEntry {
            peer: Peer {
                peer_id,
                display_name: display_name.to_string(),
                origin,
            },
            sink,
        });

        info!(
            "Peer {} ('{}', {:?}) joined session {} ({}/{})",
            peer_id,
            display_name,
            origin,
            self.session_id,
            peers.len(),
            self.max_peers
        );
        Ok(peer_id)
    }

    pub fn remove(&self, peer_id: PeerId) -> Option<Peer> {
        let mut table = self.peers.write();
        let index = table
            .entries
            .iter()
            .position(|e| e.peer.peer_id == peer_id)?;
        let entry = table.entries.remove(index);
        debug!("Peer {} left session {}", peer_id, self.session_id);
        Some(entry.peer)
    }

    pub fn snapshot(&self) -> Vec<Peer> {
        self.peers
            .read()
            .entries
            .iter()
            .map(|e| e.peer.clone())
            .collect()
    }

    pub fn get(&self, peer_id: PeerId) -> Option<Peer> {
        self.peers
            .read()
            .entries
            .iter()
            .find(|e| e.peer.peer_id == peer_id)
            .map(|e| e.peer.clone())
    }

    pub fn len(&self) -> usize {
        self.peers.read().entries.len()
    }

    /// Frame sinks of every remote peer
    pub fn sinks(&self) -> Vec<(PeerId, Arc<dyn FrameSink>)> {
        self.peers
            .read()
            .entries
            .iter()
            .filter_map(|e| e.sink.as_ref().map(|s| (e.peer.peer_id, Arc::clone(s))))
            .collect()
    }

    /// Drop every peer and refuse new ones
    pub fn close(&self) {
        let mut table = self.peers.write();
        table.closed = true;
        table.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_enforced() {
        let set = PeerSet::new(SessionId::generate(), 2);
        set.add("Host", PeerOrigin::Local, None).unwrap();
        set.add("Guest", PeerOrigin::Local, None).unwrap();

        let err = set.add("Late", PeerOrigin::Local, None).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded(_)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_frees_a_seat() {
        let set = PeerSet::new(SessionId::generate(), 1);
        let host = set.add("Host", PeerOrigin::Local, None).unwrap();
        assert_eq!(set.get(host).unwrap().display_name, "Host");

        assert!(set.remove(host).is_some());
        assert!(set.remove(host).is_none());
        assert!(set.add("Guest", PeerOrigin::Local, None).is_ok());
    }

    #[test]
    fn test_only_remote_peers_have_sinks() {
        let set = PeerSet::new(SessionId::generate(), 4);
        set.add("Host", PeerOrigin::Local, None).unwrap();
        assert!(set.sinks().is_empty());
        assert_eq!(set.snapshot()[0].origin, PeerOrigin::Local);
    }

    #[test]
    fn test_closed_set_admits_no_one() {
        let set = PeerSet::new(SessionId::generate(), 4);
        set.add("Host", PeerOrigin::Local, None).unwrap();

        set.close();
        assert_eq!(set.len(), 0);
        let err = set.add("Late", PeerOrigin::Local, None).unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed(_)), "Got {:?}", err);
        assert!(set.snapshot().is_empty());
    }
}
