//! Frame layout negotiation
//!
//! A [`FrameLayout`] is the ordered set of textures every frame of a
//! render sender must populate. Rows are addressed by pitch, which is the
//! row size rounded up to the negotiated alignment and may exceed
//! `width * bytes_per_pixel`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum textures in one layout
pub const MAX_TEXTURES_PER_FRAME: usize = 8;

/// Maximum texture edge in pixels
pub const MAX_TEXTURE_DIMENSION: u32 = 8192;

/// Default texture width when no layout is requested
pub const DEFAULT_WIDTH: u32 = 1280;

/// Default texture height when no layout is requested
pub const DEFAULT_HEIGHT: u32 = 720;

/// Pixel format of one texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba8,
    /// 8-bit BGRA, 4 bytes per pixel
    Bgra8,
    /// Single 8-bit channel (alpha masks)
    R8,
    /// 32-bit float depth
    D32Float,
}

impl PixelFormat {
    /// Bytes per pixel of this format
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::D32Float => 4,
            PixelFormat::R8 => 1,
        }
    }
}

/// Role of a texture inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextureRole {
    /// Rendered color
    Color,
    /// Scene depth, reconstructed by the peer with the near/far planes
    Depth,
    /// Separate alpha/coverage mask
    Alpha,
}

/// Requested texture, before pitch negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureRequest {
    /// Texture role
    pub role: TextureRole,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
}

impl TextureRequest {
    /// A color texture in RGBA8
    pub fn color(width: u32, height: u32) -> Self {
        Self {
            role: TextureRole::Color,
            width,
            height,
            format: PixelFormat::Rgba8,
        }
    }

    /// A depth texture in 32-bit float
    pub fn depth(width: u32, height: u32) -> Self {
        Self {
            role: TextureRole::Depth,
            width,
            height,
            format: PixelFormat::D32Float,
        }
    }

    /// A single-channel alpha mask
    pub fn alpha(width: u32, height: u32) -> Self {
        Self {
            role: TextureRole::Alpha,
            width,
            height,
            format: PixelFormat::R8,
        }
    }
}

/// Negotiated texture description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDesc {
    /// Texture role
    pub role: TextureRole,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row, `>= width * bytes_per_pixel`
    pub pitch: u32,
    /// Pixel format
    pub format: PixelFormat,
}

impl TextureDesc {
    /// Bytes of pixel data in one row, without padding
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel() as usize
    }

    /// Total buffer size (`pitch * height`)
    pub fn byte_len(&self) -> usize {
        self.pitch as usize * self.height as usize
    }
}

/// Ordered texture composition every frame must conform to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    textures: Vec<TextureDesc>,
}

impl FrameLayout {
    /// Requests used when the caller asks for no specific layout
    pub fn default_requests() -> Vec<TextureRequest> {
        vec![
            TextureRequest::color(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            TextureRequest::depth(DEFAULT_WIDTH, DEFAULT_HEIGHT),
        ]
    }

    /// Negotiate a layout from requests
    ///
    /// # Arguments
    ///
    /// * `requests` - Textures in frame order (empty selects the default layout)
    /// * `row_alignment` - Pitch alignment in bytes, a power of two
    pub fn negotiate(requests: &[TextureRequest], row_alignment: u32) -> Result<Self> {
        if row_alignment == 0 || !row_alignment.is_power_of_two() {
            return Err(Error::InvalidArgument(format!(
                "row_alignment must be a power of two, got {}",
                row_alignment
            )));
        }

        let defaults;
        let requests = if requests.is_empty() {
            defaults = Self::default_requests();
            &defaults[..]
        } else {
            requests
        };

        if requests.len() > MAX_TEXTURES_PER_FRAME {
            return Err(Error::CapacityExceeded(format!(
                "layout requests {} textures, limit is {}",
                requests.len(),
                MAX_TEXTURES_PER_FRAME
            )));
        }

        let mut textures = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            if request.width == 0
                || request.height == 0
                || request.width > MAX_TEXTURE_DIMENSION
                || request.height > MAX_TEXTURE_DIMENSION
            {
                return Err(Error::InvalidArgument(format!(
                    "texture {} has invalid size {}x{} (1-{} allowed)",
                    index, request.width, request.height, MAX_TEXTURE_DIMENSION
                )));
            }

            if request.role == TextureRole::Depth && request.format != PixelFormat::D32Float {
                return Err(Error::InvalidArgument(format!(
                    "depth texture {} must use D32Float, got {:?}",
                    index, request.format
                )));
            }

            let row_bytes = request.width * request.format.bytes_per_pixel();
            let pitch = row_bytes.div_ceil(row_alignment) * row_alignment;

            textures.push(TextureDesc {
                role: request.role,
                width: request.width,
                height: request.height,
                pitch,
                format: request.format,
            });
        }

        if !textures.iter().any(|t| t.role == TextureRole::Color) {
            return Err(Error::InvalidArgument(
                "layout must contain a color texture".to_string(),
            ));
        }

        Ok(Self { textures })
    }

    /// Textures in frame order
    pub fn textures(&self) -> &[TextureDesc] {
        &self.textures
    }

    /// Number of textures per frame
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// First texture with the given role
    pub fn find(&self, role: TextureRole) -> Option<&TextureDesc> {
        self.textures.iter().find(|t| t.role == role)
    }

    /// Total bytes of one frame across all textures
    pub fn frame_bytes(&self) -> usize {
        self.textures.iter().map(TextureDesc::byte_len).sum()
    }
}
