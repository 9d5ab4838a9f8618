//! Graphics backends for render senders
//!
//! Backends are statically linked and selected when a sender is created:
//!
//! - [`GraphicsApi::Cpu`]: frame buffers are host memory the caller writes
//!   row by row
//! - [`GraphicsApi::Gpu`]: frame buffers are textures created on a caller
//!   supplied [`GpuDevice`]

use super::layout::TextureDesc;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Graphics API a render sender's buffers live on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphicsApi {
    Cpu,
    Gpu,
}

impl fmt::Display for GraphicsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsApi::Cpu => write!(f, "cpu"),
            GraphicsApi::Gpu => write!(f, "gpu"),
        }
    }
}

/// Backends compiled into this build
pub fn available_backends() -> [GraphicsApi; 2] {
    [GraphicsApi::Cpu, GraphicsApi::Gpu]
}

/// Device-side texture name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuTextureId(pub u64);

/// Caller supplied GPU device
///
/// The library never touches texture contents on this path; it only asks
/// the device to create and destroy the textures backing a frame layout.
pub trait GpuDevice: Send + Sync {
    /// Device name for logs
    fn name(&self) -> &str;

    /// Create a texture matching `desc`
    fn create_texture(&self, desc: &TextureDesc) -> Result<GpuTextureId>;

    /// Release a texture created by [`GpuDevice::create_texture`]
    fn destroy_texture(&self, id: GpuTextureId);
}

/// A texture owned by a render sender, destroyed on drop
pub struct GpuTexture {
    device: Arc<dyn GpuDevice>,
    id: GpuTextureId,
    desc: TextureDesc,
}

impl GpuTexture {
    pub fn id(&self) -> GpuTextureId {
        self.id
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.device.destroy_texture(self.id);
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("device", &self.device.name())
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish()
    }
}

/// Storage behind one texture of a frame
#[derive(Debug)]
pub enum TextureStorage {
    /// Host memory, `desc.pitch * desc.height` bytes
    Cpu { desc: TextureDesc, data: Vec<u8> },
    /// Device texture
    Gpu(GpuTexture),
}

impl TextureStorage {
    pub fn desc(&self) -> &TextureDesc {
        match self {
            TextureStorage::Cpu { desc, .. } => desc,
            TextureStorage::Gpu(texture) => texture.desc(),
        }
    }

    /// Pixel bytes of a CPU texture, rows `pitch` bytes apart
    pub fn cpu_bytes(&self) -> Option<&[u8]> {
        match self {
            TextureStorage::Cpu { data, .. } => Some(data),
            TextureStorage::Gpu(_) => None,
        }
    }

    pub fn gpu_texture(&self) -> Option<&GpuTexture> {
        match self {
            TextureStorage::Cpu { .. } => None,
            TextureStorage::Gpu(texture) => Some(texture),
        }
    }

    pub(crate) fn cpu_bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            TextureStorage::Cpu { data, .. } => Some(data),
            TextureStorage::Gpu(_) => None,
        }
    }
}

/// Allocates frame buffers for one graphics API
pub trait GraphicsBackend: Send + Sync {
    fn api(&self) -> GraphicsApi;

    fn name(&self) -> &str;

    /// Allocate storage for one texture of the layout
    fn allocate(&self, desc: &TextureDesc) -> Result<TextureStorage>;
}

/// Host memory backend
#[derive(Debug, Default)]
pub struct CpuBackend;

impl GraphicsBackend for CpuBackend {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Cpu
    }

    fn name(&self) -> &str {
        "cpu"
    }

    fn allocate(&self, desc: &TextureDesc) -> Result<TextureStorage> {
        let len = desc.byte_len();
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            Error::CapacityExceeded(format!(
                "cannot allocate {} bytes for a {:?} texture: {}",
                len, desc.role, e
            ))
        })?;
        data.resize(len, 0);

        Ok(TextureStorage::Cpu { desc: *desc, data })
    }
}

/// Backend creating textures on a caller supplied device
pub struct GpuBackend {
    device: Arc<dyn GpuDevice>,
}

impl GpuBackend {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self { device }
    }
}

impl GraphicsBackend for GpuBackend {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Gpu
    }

    fn name(&self) -> &str {
        self.device.name()
    }

    fn allocate(&self, desc: &TextureDesc) -> Result<TextureStorage> {
        let id = self.device.create_texture(desc)?;
        Ok(TextureStorage::Gpu(GpuTexture {
            device: Arc::clone(&self.device),
            id,
            desc: *desc,
        }))
    }
}

/// GPU device binding for a GPU render sender
#[derive(Clone)]
pub struct GpuBackendConfig {
    pub device: Arc<dyn GpuDevice>,
}

impl fmt::Debug for GpuBackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBackendConfig")
            .field("device", &self.device.name())
            .finish()
    }
}

/// Backend-specific configuration passed to `RenderSender::create`
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Cpu,
    Gpu(GpuBackendConfig),
}

/// Pick the backend for `api`, checking that `config` matches it
pub(crate) fn select_backend(
    api: GraphicsApi,
    config: Option<BackendConfig>,
) -> Result<Box<dyn GraphicsBackend>> {
    match (api, config) {
        (GraphicsApi::Cpu, None | Some(BackendConfig::Cpu)) => Ok(Box::new(CpuBackend)),
        (GraphicsApi::Gpu, Some(BackendConfig::Gpu(gpu))) => {
            Ok(Box::new(GpuBackend::new(gpu.device)))
        }
        (GraphicsApi::Gpu, _) => Err(Error::InvalidArgument(
            "the gpu backend needs a GpuBackendConfig with a device".to_string(),
        )),
        (GraphicsApi::Cpu, Some(BackendConfig::Gpu(_))) => Err(Error::InvalidArgument(
            "a gpu backend config was passed to a cpu sender".to_string(),
        )),
    }
}
