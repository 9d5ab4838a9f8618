//! Ordered frame delivery to remote peers
//!
//! Every render sender owns one delivery task fed by an unbounded channel.
//! Frames are taken in show order and handed to each remote peer's
//! [`FrameSink`] one at a time, so no peer ever sees frames out of order.
//! The frame's buffers go back to the sender's pool once every peer has
//! been served or has given up. A peer that holds a frame past the delivery
//! timeout is skipped until its pending call returns.

use super::backend::TextureStorage;
use super::layout::FrameLayout;
use super::pool::{FrameBuffers, FramePool};
use super::sender::NearFar;
use crate::ids::{PeerId, SessionId};
use crate::retry::RetryPolicy;
use crate::session::directory::LogicalSession;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Receiving side of a remote peer
pub trait FrameSink: Send + Sync {
    /// Take one frame
    ///
    /// The planes are only borrowed for the duration of the call. May block;
    /// delivery to the next peer waits until it returns. Retryable errors
    /// (`ConnectionFailed`) are retried under the sender's delivery policy.
    fn deliver(&self, frame: &OutgoingFrame<'_>) -> Result<()>;
}

/// A shown frame on its way to one peer
#[derive(Debug)]
pub struct OutgoingFrame<'a> {
    pub session_id: SessionId,
    pub sender_id: u64,
    pub frame_index: u64,
    pub near_far: NearFar,
    pub layout: &'a FrameLayout,
    /// One buffer per texture, in layout order
    pub planes: &'a [TextureStorage],
}

pub(crate) struct QueuedFrame {
    pub frame_index: u64,
    pub near_far: NearFar,
    pub buffers: FrameBuffers,
}

/// Frame counters of one render sender
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Frames committed with `show_frame`
    pub shown: u64,
    /// Frames every remote peer accepted
    pub delivered: u64,
    /// Frames at least one peer did not receive
    pub dropped: u64,
    /// Frames abandoned before being shown
    pub discarded: u64,
}

#[derive(Debug, Default)]
pub(crate) struct SenderCounters {
    pub shown: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub discarded: AtomicU64,
}

impl SenderCounters {
    pub fn snapshot(&self) -> RenderStats {
        RenderStats {
            shown: self.shown.load(Ordering::Acquire),
            delivered: self.delivered.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            discarded: self.discarded.load(Ordering::Acquire),
        }
    }
}

pub(crate) struct DeliveryContext {
    pub session: Arc<LogicalSession>,
    pub sender_id: u64,
    pub layout: Arc<FrameLayout>,
    pub pool: Arc<FramePool>,
    pub counters: Arc<SenderCounters>,
    pub retry: RetryPolicy,
    pub delivery_timeout: Duration,
    pub token: CancellationToken,
}

/// A shown frame shared with the sink calls serving it
///
/// The buffers go back to the pool when the last holder lets go, which may
/// be a sink call that outlived its delivery timeout.
struct SharedFrame {
    session_id: SessionId,
    sender_id: u64,
    frame_index: u64,
    near_far: NearFar,
    layout: Arc<FrameLayout>,
    buffers: Option<FrameBuffers>,
    pool: Arc<FramePool>,
}

impl SharedFrame {
    fn outgoing(&self) -> OutgoingFrame<'_> {
        OutgoingFrame {
            session_id: self.session_id,
            sender_id: self.sender_id,
            frame_index: self.frame_index,
            near_far: self.near_far,
            layout: &self.layout,
            planes: self.buffers.as_ref().map(|b| b.planes()).unwrap_or(&[]),
        }
    }
}

impl Drop for SharedFrame {
    fn drop(&mut self) {
        if let Some(buffers) = self.buffers.take() {
            self.pool.release(buffers);
        }
    }
}

/// Peers whose sink call outlived the delivery timeout
///
/// A stalled peer is skipped until its pending call returns.
#[derive(Default)]
struct StalledPeers {
    calls: HashMap<PeerId, JoinHandle<Result<()>>>,
}

impl StalledPeers {
    fn is_stalled(&mut self, peer_id: PeerId) -> bool {
        match self.calls.get(&peer_id) {
            Some(call) if call.is_finished() => {
                self.calls.remove(&peer_id);
                debug!("Peer {} recovered from a stalled delivery", peer_id);
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

enum Delivery {
    Delivered,
    Failed,
    Stalled(JoinHandle<Result<()>>),
}

/// Deliver queued frames until the sender stops
pub(crate) async fn run_delivery(
    mut queue: mpsc::UnboundedReceiver<QueuedFrame>,
    ctx: DeliveryContext,
) {
    debug!("Delivery worker for render sender {} started", ctx.sender_id);
    let mut stalled = StalledPeers::default();

    loop {
        let frame = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let index = frame.frame_index;
        let shared = Arc::new(SharedFrame {
            session_id: ctx.session.id(),
            sender_id: ctx.sender_id,
            frame_index: frame.frame_index,
            near_far: frame.near_far,
            layout: Arc::clone(&ctx.layout),
            buffers: Some(frame.buffers),
            pool: Arc::clone(&ctx.pool),
        });

        if deliver_to_peers(&ctx, &shared, &mut stalled).await {
            ctx.counters.delivered.fetch_add(1, Ordering::AcqRel);
            trace!("Frame {} of sender {} delivered", index, ctx.sender_id);
        } else {
            ctx.counters.dropped.fetch_add(1, Ordering::AcqRel);
        }
    }

    if ctx.token.is_cancelled() {
        ctx.pool.close();
    }

    // Frames shown but never delivered
    queue.close();
    let mut abandoned = 0u64;
    while let Ok(frame) = queue.try_recv() {
        ctx.pool.release(frame.buffers);
        abandoned += 1;
    }
    if abandoned > 0 {
        ctx.counters.dropped.fetch_add(abandoned, Ordering::AcqRel);
        debug!(
            "Render sender {} stopped with {} undelivered frames",
            ctx.sender_id, abandoned
        );
    }

    debug!("Delivery worker for render sender {} stopped", ctx.sender_id);
}

/// Hand `frame` to every remote peer, returning whether all took it
async fn deliver_to_peers(
    ctx: &DeliveryContext,
    frame: &Arc<SharedFrame>,
    stalled: &mut StalledPeers,
) -> bool {
    let mut all_delivered = true;
    for (peer_id, sink) in ctx.session.peers.sinks() {
        if stalled.is_stalled(peer_id) {
            trace!(
                "Skipping frame {} for stalled peer {}",
                frame.frame_index,
                peer_id
            );
            all_delivered = false;
            continue;
        }

        match deliver_with_retry(ctx, peer_id, sink, frame).await {
            Delivery::Delivered => {}
            Delivery::Failed => all_delivered = false,
            Delivery::Stalled(call) => {
                stalled.calls.insert(peer_id, call);
                all_delivered = false;
            }
        }
    }
    all_delivered
}

async fn deliver_with_retry(
    ctx: &DeliveryContext,
    peer_id: PeerId,
    sink: Arc<dyn FrameSink>,
    frame: &Arc<SharedFrame>,
) -> Delivery {
    let mut attempt = 0;
    loop {
        if ctx.token.is_cancelled() {
            return Delivery::Failed;
        }

        // Sinks may block; run them off the async workers
        let mut call = {
            let sink = Arc::clone(&sink);
            let frame = Arc::clone(frame);
            tokio::task::spawn_blocking(move || sink.deliver(&frame.outgoing()))
        };

        let joined = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => return Delivery::Failed,
            joined = tokio::time::timeout(ctx.delivery_timeout, &mut call) => joined,
        };

        let result = match joined {
            Err(_) => {
                warn!(
                    "Peer {} held frame {} of sender {} past {:?}; skipping it until it returns",
                    peer_id, frame.frame_index, ctx.sender_id, ctx.delivery_timeout
                );
                return Delivery::Stalled(call);
            }
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Internal(format!("frame sink task failed: {}", e))),
        };

        match result {
            Ok(()) => return Delivery::Delivered,
            Err(e) if e.is_retryable() && ctx.retry.should_retry(attempt) => {
                let delay = ctx.retry.calculate_backoff(attempt);
                trace!(
                    "Frame {} to peer {} failed ({}), retrying in {:?}",
                    frame.frame_index,
                    peer_id,
                    e,
                    delay
                );
                tokio::select! {
                    biased;
                    _ = ctx.token.cancelled() => return Delivery::Failed,
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    "Dropping frame {} of sender {} for peer {}: {}",
                    frame.frame_index, ctx.sender_id, peer_id, e
                );
                return Delivery::Failed;
            }
        }
    }
}
