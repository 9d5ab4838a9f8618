//! Frame buffer pool
//!
//! Buffers cycle between the caller (between `begin_frame` and
//! `show_frame`) and the delivery worker (until every peer has been served).
//! A caller asking for a buffer while all of them are with the transport
//! blocks until one is released, up to a timeout.

use super::backend::{GraphicsBackend, TextureStorage};
use super::layout::FrameLayout;
use crate::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// One buffer per texture of the layout, in layout order
#[derive(Debug)]
pub struct FrameBuffers {
    slot: usize,
    pub(crate) planes: Vec<TextureStorage>,
}

impl FrameBuffers {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn planes(&self) -> &[TextureStorage] {
        &self.planes
    }
}

struct PoolState {
    free: VecDeque<FrameBuffers>,
    closed: bool,
}

pub(crate) struct FramePool {
    capacity: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl FramePool {
    /// Allocate `count` frames for `layout`; fails without keeping any
    pub fn allocate(
        layout: &FrameLayout,
        backend: &dyn GraphicsBackend,
        count: usize,
    ) -> Result<Self> {
        let mut free = VecDeque::with_capacity(count);
        for slot in 0..count {
            let planes = layout
                .textures()
                .iter()
                .map(|desc| backend.allocate(desc))
                .collect::<Result<Vec<_>>>()?;
            free.push_back(FrameBuffers { slot, planes });
        }

        debug!(
            "Allocated {} frame buffers of {} bytes on the {} backend",
            count,
            layout.frame_bytes(),
            backend.name()
        );

        Ok(Self {
            capacity: count,
            state: Mutex::new(PoolState {
                free,
                closed: false,
            }),
            available: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Buffers not currently held by the caller or the transport
    pub fn available(&self) -> usize {
        self.state.lock().free.len()
    }

    /// Take a free buffer, waiting up to `timeout` for the transport
    ///
    /// Fails with `CapacityExceeded` on timeout and `Cancelled` once the
    /// pool is closed.
    pub fn acquire(&self, timeout: Duration) -> Result<FrameBuffers> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if state.closed {
                return Err(Error::Cancelled("render sender stopped".to_string()));
            }
            if let Some(buffers) = state.free.pop_front() {
                return Ok(buffers);
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                if state.closed {
                    return Err(Error::Cancelled("render sender stopped".to_string()));
                }
                if let Some(buffers) = state.free.pop_front() {
                    return Ok(buffers);
                }
                return Err(Error::CapacityExceeded(format!(
                    "no frame buffer released by the transport within {:?}",
                    timeout
                )));
            }
        }
    }

    /// Return a buffer for reuse
    pub fn release(&self, buffers: FrameBuffers) {
        self.state.lock().free.push_back(buffers);
        self.available.notify_one();
    }

    /// Wake every waiter and refuse further acquisitions
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }
}
