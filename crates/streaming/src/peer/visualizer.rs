//! In-process visualizer backend
//!
//! Stands in for a remote viewer: it can be invited into sessions through
//! its connection string and records every frame delivered to it.

use super::backend::{PeerBackend, VISUALIZER_SCHEME};
use crate::ids::SessionId;
use crate::render::{FrameSink, NearFar, OutgoingFrame};
use crate::{Error, Result};
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Frames kept for inspection
const FRAME_HISTORY: usize = 256;

/// Summary of one frame received by a visualizer
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedFrame {
    pub session_id: SessionId,
    pub sender_id: u64,
    pub frame_index: u64,
    pub near_far: NearFar,
    pub texture_count: usize,
    /// First pixel of the first CPU texture, if any
    pub first_pixel: Option<[u8; 4]>,
}

/// Visualizer peer backend
pub struct VisualizerBackend {
    connection_string: String,
    display_name: String,
    handshake_latency: Duration,
    sessions: Mutex<Vec<SessionId>>,
    frames: Mutex<VecDeque<ReceivedFrame>>,
    frames_received: AtomicU64,
    failures_remaining: AtomicU32,
}

impl VisualizerBackend {
    /// Create a visualizer with a fresh random connection string
    pub fn new() -> Self {
        let mut token = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut token);

        Self {
            connection_string: format!("{}://{}", VISUALIZER_SCHEME, hex::encode(token)),
            display_name: "Visualizer".to_string(),
            handshake_latency: Duration::ZERO,
            sessions: Mutex::new(Vec::new()),
            frames: Mutex::new(VecDeque::new()),
            frames_received: AtomicU64::new(0),
            failures_remaining: AtomicU32::new(0),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Delay every handshake by `latency`
    pub fn with_handshake_latency(mut self, latency: Duration) -> Self {
        self.handshake_latency = latency;
        self
    }

    /// Reject the next `count` deliveries with a retryable error
    pub fn fail_next_deliveries(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::Release);
    }

    /// Sessions this visualizer has been invited into
    pub fn sessions(&self) -> Vec<SessionId> {
        self.sessions.lock().clone()
    }

    /// Total frames received
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Acquire)
    }

    /// The most recent frames, oldest first
    pub fn received_frames(&self) -> Vec<ReceivedFrame> {
        self.frames.lock().iter().cloned().collect()
    }
}

impl Default for VisualizerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerBackend for VisualizerBackend {
    fn connection_string(&self) -> &str {
        &self.connection_string
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn handshake_latency(&self) -> Duration {
        self.handshake_latency
    }

    fn accept(&self, session_id: SessionId) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if !sessions.contains(&session_id) {
            sessions.push(session_id);
        }
        Ok(())
    }

    fn frame_sink(self: Arc<Self>) -> Option<Arc<dyn FrameSink>> {
        Some(self)
    }
}

impl FrameSink for VisualizerBackend {
    fn deliver(&self, frame: &OutgoingFrame<'_>) -> Result<()> {
        let injected = self
            .failures_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::ConnectionFailed(format!(
                "visualizer dropped frame {}",
                frame.frame_index
            )));
        }

        let first_pixel = frame
            .planes
            .first()
            .and_then(|plane| plane.cpu_bytes())
            .and_then(|bytes| bytes.get(..4))
            .map(|px| [px[0], px[1], px[2], px[3]]);

        let received = ReceivedFrame {
            session_id: frame.session_id,
            sender_id: frame.sender_id,
            frame_index: frame.frame_index,
            near_far: frame.near_far,
            texture_count: frame.planes.len(),
            first_pixel,
        };
        trace!("Visualizer received frame {}", received.frame_index);

        let mut frames = self.frames.lock();
        if frames.len() == FRAME_HISTORY {
            frames.pop_front();
        }
        frames.push_back(received);
        self.frames_received.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_format() {
        let a = VisualizerBackend::new();
        let b = VisualizerBackend::new();
        assert!(a.connection_string().starts_with("qar+visualizer://"));
        assert_ne!(a.connection_string(), b.connection_string());
        assert!(super::super::backend::parse_connection_string(a.connection_string()).is_ok());
    }

    #[test]
    fn test_accept_records_session_once() {
        let visualizer = VisualizerBackend::new();
        let id = SessionId::generate();
        visualizer.accept(id).unwrap();
        visualizer.accept(id).unwrap();
        assert_eq!(visualizer.sessions(), vec![id]);
    }
}
