//! Configuration types for the streaming core
//!
//! Every entry point takes one of these value types and validates it before
//! allocating anything. All of them have a usable `Default` and `with_*`
//! helpers for chaining.

use crate::render::{GraphicsApi, TextureRequest};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted display name, in bytes
pub const MAX_DISPLAY_NAME_LEN: usize = 255;

/// Longest invite lifetime, one year
pub const MAX_INVITE_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Check a peer or scene object display name
pub(crate) fn validate_display_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(format!("{} must not be empty", field)));
    }

    if name.len() > MAX_DISPLAY_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "{} exceeds {} bytes ({} given)",
            field,
            MAX_DISPLAY_NAME_LEN,
            name.len()
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(Error::InvalidArgument(format!(
            "{} must not contain control characters",
            field
        )));
    }

    Ok(())
}

/// Process library options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryInit {
    /// Mirror log records to stdout (default: false)
    pub enable_console_logging: bool,

    /// Folder receiving `qar-streaming.log` (default: no file sink)
    pub log_folder_path: Option<PathBuf>,

    /// Filter directive used when `RUST_LOG` is unset (default: "info")
    pub log_filter: Option<String>,

    /// Worker threads for invitation and frame delivery (default: 2, range: 1-64)
    pub worker_threads: usize,
}

impl Default for LibraryInit {
    fn default() -> Self {
        Self {
            enable_console_logging: false,
            log_folder_path: None,
            log_filter: None,
            worker_threads: 2,
        }
    }
}

impl LibraryInit {
    /// Validate library options
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `worker_threads` is not in range 1-64
    /// - `log_filter` is not a valid filter directive
    /// - `log_folder_path` exists but is not a directory
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 || self.worker_threads > 64 {
            return Err(Error::InvalidArgument(format!(
                "worker_threads must be in range 1-64, got {}",
                self.worker_threads
            )));
        }

        if let Some(filter) = &self.log_filter {
            tracing_subscriber::EnvFilter::try_new(filter).map_err(|e| {
                Error::InvalidArgument(format!("invalid log_filter '{}': {}", filter, e))
            })?;
        }

        if let Some(folder) = &self.log_folder_path {
            if folder.exists() && !folder.is_dir() {
                return Err(Error::InvalidArgument(format!(
                    "log_folder_path {} is not a directory",
                    folder.display()
                )));
            }
        }

        Ok(())
    }

    /// Enable or disable console logging
    pub fn with_console_logging(mut self, enabled: bool) -> Self {
        self.enable_console_logging = enabled;
        self
    }

    /// Write logs into `folder`
    pub fn with_log_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.log_folder_path = Some(folder.into());
        self
    }

    /// Set the fallback log filter
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Set the worker thread count
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }
}

/// Runtime options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeInit {
    /// Folder holding backend binaries (default: folder of the current executable)
    pub runtime_binaries_folder_path: Option<PathBuf>,
}

impl RuntimeInit {
    /// Use `folder` for backend discovery
    pub fn with_binaries_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.runtime_binaries_folder_path = Some(folder.into());
        self
    }

    /// Resolve and check the binaries folder
    pub fn resolve_binaries_folder(&self) -> Result<PathBuf> {
        let folder = match &self.runtime_binaries_folder_path {
            Some(folder) => folder.clone(),
            None => {
                let exe = std::env::current_exe()?;
                exe.parent().map(Path::to_path_buf).ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "cannot derive binaries folder from {}",
                        exe.display()
                    ))
                })?
            }
        };

        if !folder.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "runtime_binaries_folder_path {} is not a directory",
                folder.display()
            )));
        }

        Ok(folder)
    }
}

/// Options for a new logical session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCreateInit {
    /// Maximum peers, local and remote (default: 8, range: 1-32)
    pub max_peers: u32,

    /// Maximum live GUI panels (default: 64, range: 1-1024)
    pub max_gui_panels: u32,

    /// Maximum live app volumes (default: 64, range: 1-1024)
    pub max_app_volumes: u32,

    /// Invite lifetime in seconds (default: none, valid until the session ends,
    /// range: 1-31536000)
    pub invite_ttl_secs: Option<u64>,

    /// Maximum unresolved peer invitations per session handle (default: 4, range: 1-64)
    pub max_pending_invitations: u32,
}

impl Default for SessionCreateInit {
    fn default() -> Self {
        Self {
            max_peers: 8,
            max_gui_panels: 64,
            max_app_volumes: 64,
            invite_ttl_secs: None,
            max_pending_invitations: 4,
        }
    }
}

impl SessionCreateInit {
    /// Validate session options
    pub fn validate(&self) -> Result<()> {
        if self.max_peers == 0 || self.max_peers > 32 {
            return Err(Error::InvalidArgument(format!(
                "max_peers must be in range 1-32, got {}",
                self.max_peers
            )));
        }

        if self.max_gui_panels == 0 || self.max_gui_panels > 1024 {
            return Err(Error::InvalidArgument(format!(
                "max_gui_panels must be in range 1-1024, got {}",
                self.max_gui_panels
            )));
        }

        if self.max_app_volumes == 0 || self.max_app_volumes > 1024 {
            return Err(Error::InvalidArgument(format!(
                "max_app_volumes must be in range 1-1024, got {}",
                self.max_app_volumes
            )));
        }

        if let Some(ttl) = self.invite_ttl_secs {
            if ttl == 0 || ttl > MAX_INVITE_TTL_SECS {
                return Err(Error::InvalidArgument(format!(
                    "invite_ttl_secs must be in range 1-{} when set, got {}",
                    MAX_INVITE_TTL_SECS, ttl
                )));
            }
        }

        if self.max_pending_invitations == 0 || self.max_pending_invitations > 64 {
            return Err(Error::InvalidArgument(format!(
                "max_pending_invitations must be in range 1-64, got {}",
                self.max_pending_invitations
            )));
        }

        Ok(())
    }

    /// Invite lifetime, if bounded
    pub fn invite_ttl(&self) -> Option<Duration> {
        self.invite_ttl_secs.map(Duration::from_secs)
    }

    /// Set the peer limit
    pub fn with_max_peers(mut self, max_peers: u32) -> Self {
        self.max_peers = max_peers;
        self
    }

    /// Set the GUI panel limit
    pub fn with_max_gui_panels(mut self, max: u32) -> Self {
        self.max_gui_panels = max;
        self
    }

    /// Set the app volume limit
    pub fn with_max_app_volumes(mut self, max: u32) -> Self {
        self.max_app_volumes = max;
        self
    }

    /// Expire invites after `ttl`
    pub fn with_invite_ttl(mut self, ttl: Duration) -> Self {
        self.invite_ttl_secs = Some(ttl.as_secs().max(1));
        self
    }
}

/// Description of the local peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSpecInit {
    /// Name shown to other peers
    pub display_name: String,
}

impl PeerSpecInit {
    /// Create a peer spec
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }

    /// Validate the peer spec
    pub fn validate(&self) -> Result<()> {
        validate_display_name("display_name", &self.display_name)
    }
}

/// Join options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionJoinInit {
    /// Copy of an invite payload
    pub invite_data: Vec<u8>,

    /// Local peer description
    pub peer_spec_init: PeerSpecInit,
}

impl SessionJoinInit {
    /// Create join options from invite bytes and a display name
    pub fn new(invite_data: impl Into<Vec<u8>>, display_name: impl Into<String>) -> Self {
        Self {
            invite_data: invite_data.into(),
            peer_spec_init: PeerSpecInit::new(display_name),
        }
    }

    /// Validate join options (the payload itself is checked by join)
    pub fn validate(&self) -> Result<()> {
        if self.invite_data.is_empty() {
            return Err(Error::InvalidInvite("invite payload is empty".to_string()));
        }
        self.peer_spec_init.validate()
    }
}

/// Peer invitation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitePeerInit {
    /// Connection string of the backend to invite
    pub connection_string: String,

    /// Upper bound on negotiation in milliseconds (default: 10000, range: 1-300000)
    pub negotiation_timeout_ms: u64,

    /// Retry policy for rendezvous attempts
    pub retry: RetryPolicy,
}

impl InvitePeerInit {
    /// Create invitation options for a connection string
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            negotiation_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
        }
    }

    /// Validate invitation options
    pub fn validate(&self) -> Result<()> {
        if self.connection_string.is_empty() {
            return Err(Error::InvalidArgument(
                "connection_string must not be empty".to_string(),
            ));
        }

        if !self
            .connection_string
            .chars()
            .all(|c| c.is_ascii_graphic())
        {
            return Err(Error::InvalidArgument(format!(
                "connection_string must be printable ASCII without spaces: {:?}",
                self.connection_string
            )));
        }

        if self.negotiation_timeout_ms == 0 || self.negotiation_timeout_ms > 300_000 {
            return Err(Error::InvalidArgument(format!(
                "negotiation_timeout_ms must be in range 1-300000, got {}",
                self.negotiation_timeout_ms
            )));
        }

        self.retry.validate()
    }

    /// Negotiation timeout
    pub fn negotiation_timeout(&self) -> Duration {
        Duration::from_millis(self.negotiation_timeout_ms)
    }

    /// Set the negotiation timeout
    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Render sender options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSenderInit {
    /// Graphics backend the sender's buffers live on
    pub graphics_api: GraphicsApi,

    /// Requested textures in frame order (empty: color + depth at 1280x720)
    pub textures: Vec<TextureRequest>,

    /// Frame buffers cycling between caller and transport (default: 2, range: 2-8)
    pub buffer_count: u32,

    /// Row pitch alignment in bytes (default: 256, power of two up to 4096)
    pub row_alignment: u32,

    /// How long `begin_frame` waits for a free buffer, in milliseconds (default: 2000)
    pub acquire_timeout_ms: u64,

    /// Longest a single peer may hold a frame, in milliseconds (default: 5000,
    /// range: 1-60000). A peer that exceeds it is skipped until its call returns.
    pub delivery_timeout_ms: u64,

    /// Retry policy for delivery to each peer
    pub delivery_retry: RetryPolicy,
}

impl Default for RenderSenderInit {
    fn default() -> Self {
        Self {
            graphics_api: GraphicsApi::Cpu,
            textures: Vec::new(),
            buffer_count: 2,
            row_alignment: 256,
            acquire_timeout_ms: 2000,
            delivery_timeout_ms: 5000,
            delivery_retry: RetryPolicy::aggressive(),
        }
    }
}

impl RenderSenderInit {
    /// Options for a CPU sender with the default layout
    pub fn cpu() -> Self {
        Self::default()
    }

    /// Options for a GPU sender with the default layout
    pub fn gpu() -> Self {
        Self {
            graphics_api: GraphicsApi::Gpu,
            ..Self::default()
        }
    }

    /// Validate sender options
    ///
    /// Texture sizes are checked during layout negotiation.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_count < 2 || self.buffer_count > 8 {
            return Err(Error::InvalidArgument(format!(
                "buffer_count must be in range 2-8, got {}",
                self.buffer_count
            )));
        }

        if !self.row_alignment.is_power_of_two() || self.row_alignment > 4096 {
            return Err(Error::InvalidArgument(format!(
                "row_alignment must be a power of two up to 4096, got {}",
                self.row_alignment
            )));
        }

        if self.acquire_timeout_ms > 60_000 {
            return Err(Error::InvalidArgument(format!(
                "acquire_timeout_ms must be at most 60000, got {}",
                self.acquire_timeout_ms
            )));
        }

        if self.delivery_timeout_ms == 0 || self.delivery_timeout_ms > 60_000 {
            return Err(Error::InvalidArgument(format!(
                "delivery_timeout_ms must be in range 1-60000, got {}",
                self.delivery_timeout_ms
            )));
        }

        self.delivery_retry.validate()
    }

    /// Buffer acquisition timeout
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Per-peer delivery timeout
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Request specific textures
    pub fn with_textures(mut self, textures: Vec<TextureRequest>) -> Self {
        self.textures = textures;
        self
    }

    /// Set the buffer count
    pub fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    /// Set the row alignment
    pub fn with_row_alignment(mut self, row_alignment: u32) -> Self {
        self.row_alignment = row_alignment;
        self
    }

    /// Set the buffer acquisition timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-peer delivery timeout
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the delivery retry policy
    pub fn with_delivery_retry(mut self, retry: RetryPolicy) -> Self {
        self.delivery_retry = retry;
        self
    }
}
