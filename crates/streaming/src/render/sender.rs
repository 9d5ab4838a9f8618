//! Render sender frame lifecycle
//!
//! ```text
//! Idle --begin_frame--> Began --frame_cpu | frame_gpu--> Populated --show_frame--> Idle
//!                         \______________ discard_frame _____________/
//! ```
//!
//! At most one frame is in flight. `begin_frame` takes a buffer from the
//! sender's pool; the buffer comes back only after the delivery worker has
//! served every peer, so a shown frame is never overwritten while the
//! transport still reads it.

use super::backend::{select_backend, BackendConfig, GpuTexture, GraphicsApi};
use super::layout::{FrameLayout, TextureDesc};
use super::pool::{FrameBuffers, FramePool};
use super::transport::{run_delivery, DeliveryContext, QueuedFrame, RenderStats, SenderCounters};
use crate::config::RenderSenderInit;
use crate::ids::SessionId;
use crate::library;
use crate::session::Session;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

static NEXT_SENDER_ID: AtomicU64 = AtomicU64::new(1);

/// Clip planes the peer uses to reconstruct depth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearFar {
    /// Near plane distance in meters, `> 0`
    pub near_plane: f32,
    /// Far plane distance in meters, `> near_plane`
    pub far_plane: f32,
}

impl NearFar {
    pub const fn new(near_plane: f32, far_plane: f32) -> Self {
        Self {
            near_plane,
            far_plane,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.near_plane.is_finite() || !self.far_plane.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "clip planes must be finite, got {}..{}",
                self.near_plane, self.far_plane
            )));
        }
        if self.near_plane <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "near plane must be positive, got {}",
                self.near_plane
            )));
        }
        if self.far_plane <= self.near_plane {
            return Err(Error::InvalidArgument(format!(
                "far plane {} must lie beyond near plane {}",
                self.far_plane, self.near_plane
            )));
        }
        Ok(())
    }
}

impl Default for NearFar {
    fn default() -> Self {
        Self::new(0.1, 10.0)
    }
}

/// Scene metadata attached to a frame when it is shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameShow {
    pub near_far: NearFar,
}

/// The frame slot claimed by `begin_frame`
///
/// The slot is released by `show_frame`, `discard_frame` or dropping the
/// sender, whatever the outcome of the work in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_index: u64,
    pub begun_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameState {
    Idle,
    Began,
    Populated,
}

/// Writable CPU texture of the frame in flight
#[derive(Debug)]
pub struct CpuPlane<'a> {
    desc: TextureDesc,
    data: &'a mut [u8],
}

impl<'a> CpuPlane<'a> {
    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    /// Bytes between the starts of consecutive rows
    pub fn pitch(&self) -> usize {
        self.desc.pitch as usize
    }

    /// Pixel bytes of row `y`, without the padding
    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        if y >= self.desc.height {
            return None;
        }
        let start = y as usize * self.pitch();
        let row_bytes = self.desc.row_bytes();
        self.data.get_mut(start..start + row_bytes)
    }

    /// Pixel bytes of every row, top to bottom
    pub fn rows_mut(&mut self) -> impl Iterator<Item = &mut [u8]> + '_ {
        let row_bytes = self.desc.row_bytes();
        let pitch = self.pitch();
        self.data
            .chunks_exact_mut(pitch)
            .map(move |row| &mut row[..row_bytes])
    }

    /// The whole buffer including row padding
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }
}

/// Buffers of the frame in flight on a CPU sender, in layout order
#[derive(Debug)]
pub struct CpuFrame<'a> {
    pub frame_index: u64,
    pub planes: Vec<CpuPlane<'a>>,
}

struct InFlight {
    info: FrameInfo,
    buffers: FrameBuffers,
    populated: bool,
}

/// Part of a sender its session can stop
pub(crate) struct SenderCore {
    id: u64,
    token: CancellationToken,
    pool: Arc<FramePool>,
}

impl SenderCore {
    /// Stop delivery and fail pending and future `begin_frame` calls
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!("Stopping render sender {}", self.id);
        }
        self.token.cancel();
        self.pool.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Per-session producer of multi-texture frames
///
/// Dropping the sender discards a frame in flight; frames already shown
/// are still delivered.
pub struct RenderSender {
    core: Arc<SenderCore>,
    session_id: SessionId,
    api: GraphicsApi,
    backend_name: String,
    layout: Arc<FrameLayout>,
    acquire_timeout: Duration,
    counters: Arc<SenderCounters>,
    queue: mpsc::UnboundedSender<QueuedFrame>,
    in_flight: Option<InFlight>,
    next_index: u64,
}

impl RenderSender {
    /// Create a sender bound to `session` and one graphics backend
    ///
    /// `backend_config` must carry a device for [`GraphicsApi::Gpu`] and be
    /// `None` or [`BackendConfig::Cpu`] for [`GraphicsApi::Cpu`]. Nothing
    /// is left allocated on failure.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for invalid options, layout or backend config
    /// - `CapacityExceeded` for too many textures or an allocation failure
    /// - `InvalidState` / `ConnectionFailed` if the session is gone
    pub fn create(
        session: &Session,
        init: &RenderSenderInit,
        backend_config: Option<BackendConfig>,
    ) -> Result<Self> {
        init.validate()?;
        let library = library::state()?;
        let inner = session.inner();
        inner.ensure_active()?;

        let backend = select_backend(init.graphics_api, backend_config)?;
        let layout = Arc::new(FrameLayout::negotiate(&init.textures, init.row_alignment)?);
        let pool = Arc::new(FramePool::allocate(
            &layout,
            backend.as_ref(),
            init.buffer_count as usize,
        )?);

        let id = NEXT_SENDER_ID.fetch_add(1, Ordering::Relaxed);
        let token = inner.cancel.child_token();
        let counters = Arc::new(SenderCounters::default());
        let (queue, rx) = mpsc::unbounded_channel();

        library.spawn(run_delivery(
            rx,
            DeliveryContext {
                session: Arc::clone(&inner.shared),
                sender_id: id,
                layout: Arc::clone(&layout),
                pool: Arc::clone(&pool),
                counters: Arc::clone(&counters),
                retry: init.delivery_retry.clone(),
                delivery_timeout: init.delivery_timeout(),
                token: token.clone(),
            },
        ));

        let core = Arc::new(SenderCore { id, token, pool });
        inner.track_sender(Arc::downgrade(&core));

        info!(
            "Render sender {} created for session {} on the {} backend ({} textures, {} buffers)",
            id,
            session.id(),
            backend.name(),
            layout.texture_count(),
            init.buffer_count
        );

        Ok(Self {
            core,
            session_id: session.id(),
            api: init.graphics_api,
            backend_name: backend.name().to_string(),
            layout,
            acquire_timeout: init.acquire_timeout(),
            counters,
            queue,
            in_flight: None,
            next_index: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn graphics_api(&self) -> GraphicsApi {
        self.api
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// The negotiated texture composition every frame conforms to
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn state(&self) -> FrameState {
        match &self.in_flight {
            None => FrameState::Idle,
            Some(frame) if frame.populated => FrameState::Populated,
            Some(_) => FrameState::Began,
        }
    }

    /// The frame currently in flight
    pub fn current_frame(&self) -> Option<FrameInfo> {
        self.in_flight.as_ref().map(|frame| frame.info)
    }

    pub fn stats(&self) -> RenderStats {
        self.counters.snapshot()
    }

    /// Buffers not held by the caller or the transport
    pub fn free_buffers(&self) -> usize {
        self.core.pool.available()
    }

    pub fn buffer_count(&self) -> usize {
        self.core.pool.capacity()
    }

    /// Start a frame
    ///
    /// Blocks until the transport releases a buffer when all of them are
    /// still being delivered.
    ///
    /// # Errors
    ///
    /// - `FrameAlreadyInProgress` if a frame is in flight
    /// - `CapacityExceeded` if no buffer is released within the acquire timeout
    /// - `Cancelled` once the owning session is destroyed
    pub fn begin_frame(&mut self) -> Result<FrameInfo> {
        if let Some(frame) = &self.in_flight {
            return Err(Error::FrameAlreadyInProgress(frame.info.frame_index));
        }
        if self.core.is_stopped() {
            return Err(Error::Cancelled(format!(
                "render sender {} stopped",
                self.core.id
            )));
        }

        let buffers = self.core.pool.acquire(self.acquire_timeout)?;
        let info = FrameInfo {
            frame_index: self.next_index,
            begun_at: Instant::now(),
        };
        self.next_index += 1;
        self.in_flight = Some(InFlight {
            info,
            buffers,
            populated: false,
        });

        trace!("Sender {} began frame {}", self.core.id, info.frame_index);
        Ok(info)
    }

    fn in_flight_mut(&mut self) -> Result<&mut InFlight> {
        self.in_flight
            .as_mut()
            .ok_or_else(|| Error::InvalidState("no frame in flight".to_string()))
    }

    /// Writable CPU buffers of the frame in flight
    ///
    /// Rows must be addressed by pitch; [`CpuPlane::row_mut`] does that.
    pub fn frame_cpu(&mut self) -> Result<CpuFrame<'_>> {
        if self.api != GraphicsApi::Cpu {
            return Err(Error::InvalidArgument(format!(
                "sender {} uses the {} backend, not cpu",
                self.core.id, self.api
            )));
        }

        let frame = self.in_flight_mut()?;
        frame.populated = true;

        let planes = frame
            .buffers
            .planes
            .iter_mut()
            .filter_map(|plane| {
                let desc = *plane.desc();
                plane.cpu_bytes_mut().map(|data| CpuPlane { desc, data })
            })
            .collect();

        Ok(CpuFrame {
            frame_index: frame.info.frame_index,
            planes,
        })
    }

    /// Device textures of the frame in flight, in layout order
    pub fn frame_gpu(&mut self) -> Result<Vec<&GpuTexture>> {
        if self.api != GraphicsApi::Gpu {
            return Err(Error::InvalidArgument(format!(
                "sender {} uses the {} backend, not gpu",
                self.core.id, self.api
            )));
        }

        let frame = self.in_flight_mut()?;
        frame.populated = true;
        Ok(frame
            .buffers
            .planes
            .iter()
            .filter_map(|plane| plane.gpu_texture())
            .collect())
    }

    /// Commit the frame in flight for delivery
    ///
    /// Invalid metadata leaves the frame in flight so it can be shown again
    /// or discarded.
    ///
    /// # Errors
    ///
    /// - `InvalidState` without a populated frame in flight
    /// - `InvalidArgument` for invalid clip planes
    /// - `Cancelled` once the owning session is destroyed (the frame is dropped)
    pub fn show_frame(&mut self, show: &FrameShow) -> Result<()> {
        let frame = self.in_flight_mut()?;
        if !frame.populated {
            return Err(Error::InvalidState(format!(
                "frame {} was never populated",
                frame.info.frame_index
            )));
        }
        show.near_far.validate()?;

        let Some(frame) = self.in_flight.take() else {
            return Err(Error::InvalidState("no frame in flight".to_string()));
        };
        let index = frame.info.frame_index;

        if self.core.is_stopped() {
            self.core.pool.release(frame.buffers);
            self.counters.discarded.fetch_add(1, Ordering::AcqRel);
            return Err(Error::Cancelled(format!(
                "render sender {} stopped",
                self.core.id
            )));
        }

        self.counters.shown.fetch_add(1, Ordering::AcqRel);
        let queued = QueuedFrame {
            frame_index: index,
            near_far: show.near_far,
            buffers: frame.buffers,
        };
        if let Err(mpsc::error::SendError(queued)) = self.queue.send(queued) {
            self.core.pool.release(queued.buffers);
            self.counters.dropped.fetch_add(1, Ordering::AcqRel);
            return Err(Error::Cancelled(format!(
                "delivery for render sender {} has stopped",
                self.core.id
            )));
        }

        trace!("Sender {} showed frame {}", self.core.id, index);
        Ok(())
    }

    /// Abandon the frame in flight and return its buffers
    pub fn discard_frame(&mut self) -> Result<()> {
        let frame = self
            .in_flight
            .take()
            .ok_or_else(|| Error::InvalidState("no frame in flight".to_string()))?;

        self.core.pool.release(frame.buffers);
        self.counters.discarded.fetch_add(1, Ordering::AcqRel);
        debug!(
            "Sender {} discarded frame {}",
            self.core.id, frame.info.frame_index
        );
        Ok(())
    }
}

impl Drop for RenderSender {
    fn drop(&mut self) {
        if self.in_flight.is_some() {
            let _ = self.discard_frame();
        }
        debug!("Render sender {} dropped", self.core.id);
    }
}

impl std::fmt::Debug for RenderSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSender")
            .field("id", &self.core.id)
            .field("session_id", &self.session_id)
            .field("api", &self.api)
            .field("state", &self.state())
            .finish()
    }
}
