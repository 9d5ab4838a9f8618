//! Render frame production and delivery
//!
//! A [`RenderSender`] negotiates a [`FrameLayout`], lends the caller one
//! set of pitch-described buffers per frame and hands shown frames to the
//! delivery worker, which serves every remote peer's [`FrameSink`] in show
//! order.

pub mod backend;
pub mod layout;
pub(crate) mod pool;
pub mod sender;
pub mod transport;

pub use backend::{
    available_backends, BackendConfig, CpuBackend, GpuBackend, GpuBackendConfig, GpuDevice,
    GpuTexture, GpuTextureId, GraphicsApi, GraphicsBackend, TextureStorage,
};
pub use layout::{
    FrameLayout, PixelFormat, TextureDesc, TextureRequest, TextureRole, MAX_TEXTURES_PER_FRAME,
    MAX_TEXTURE_DIMENSION,
};
pub use pool::FrameBuffers;
pub use sender::{CpuFrame, CpuPlane, FrameInfo, FrameShow, FrameState, NearFar, RenderSender};
pub use transport::{FrameSink, OutgoingFrame, RenderStats};
