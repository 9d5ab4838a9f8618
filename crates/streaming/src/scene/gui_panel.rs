//! GUI panels
//!
//! A flat panel hosting external content. Besides the common pose and size
//! operations a panel can be minimized and navigated to a URI.

use super::registry::{ObjectHandle, ObjectRegistry, SceneObject, SceneObjectKind};
use super::{GuiPanelSize, GuiPanelState, Pose, SceneObjectRef};
use crate::ids::GuiPanelId;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Registry kind for GUI panels
#[derive(Debug, Clone, Copy)]
pub struct GuiPanelKind;

/// Panel-specific state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GuiPanelData {
    pub state: GuiPanelState,
    pub uri: Option<Url>,
}

impl SceneObjectKind for GuiPanelKind {
    type Id = GuiPanelId;
    type Size = GuiPanelSize;
    type State = GuiPanelData;

    const NAME: &'static str = "GUI panel";

    fn generate_id() -> GuiPanelId {
        GuiPanelId::generate()
    }

    fn validate_size(size: &GuiPanelSize) -> Result<()> {
        size.validate()
    }

    fn object_ref(id: GuiPanelId) -> SceneObjectRef {
        SceneObjectRef::GuiPanel(id)
    }
}

/// Snapshot of a GUI panel
pub type GuiPanel = SceneObject<GuiPanelKind>;

/// Lease on a GUI panel
pub type GuiPanelHandle = ObjectHandle<GuiPanelKind>;

impl ObjectHandle<GuiPanelKind> {
    /// Visibility state
    pub fn state(&self) -> Result<GuiPanelState> {
        self.snapshot().map(|p| p.state.state)
    }

    /// Current navigation target
    pub fn uri(&self) -> Result<Option<String>> {
        self.snapshot()
            .map(|p| p.state.uri.map(|uri| uri.to_string()))
    }
}

/// Options for a new panel
#[derive(Debug, Clone, PartialEq)]
pub struct GuiPanelInit {
    pub display_name: String,
    pub pose: Pose,
    pub size: GuiPanelSize,
    /// Initial navigation target
    pub uri: Option<String>,
}

impl GuiPanelInit {
    pub fn new(display_name: impl Into<String>, size: GuiPanelSize) -> Self {
        Self {
            display_name: display_name.into(),
            pose: Pose::default(),
            size,
            uri: None,
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }
}

fn parse_uri(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|e| Error::InvalidArgument(format!("invalid URI '{}': {}", uri, e)))
}

/// GUI panels of a session
#[derive(Clone)]
pub struct GuiPanels {
    registry: Arc<ObjectRegistry<GuiPanelKind>>,
}

impl GuiPanels {
    pub(crate) fn new(registry: Arc<ObjectRegistry<GuiPanelKind>>) -> Self {
        Self { registry }
    }

    /// Add a panel visible to every peer
    pub fn add_panel(&self, init: &GuiPanelInit) -> Result<GuiPanelId> {
        let uri = init.uri.as_deref().map(parse_uri).transpose()?;
        self.registry.add(
            &init.display_name,
            init.pose,
            init.size,
            GuiPanelData {
                state: GuiPanelState::Visible,
                uri,
            },
        )
    }

    pub fn count(&self) -> usize {
        self.registry.count()
    }

    /// Snapshot up to `capacity` handles
    pub fn query(&self, capacity: usize) -> Vec<GuiPanelHandle> {
        self.registry.query(capacity)
    }

    /// Fill `out` with handles, returning the number written
    pub fn query_into(&self, out: &mut [Option<GuiPanelHandle>]) -> usize {
        self.registry.query_into(out)
    }

    pub fn handle(&self, id: GuiPanelId) -> Result<GuiPanelHandle> {
        self.registry.handle(id)
    }

    pub fn get(&self, id: GuiPanelId) -> Result<GuiPanel> {
        self.registry.get(id)
    }

    pub fn update_pose(&self, id: GuiPanelId, pose: Pose) -> Result<()> {
        self.registry.update_pose(id, pose)
    }

    pub fn change_size(&self, id: GuiPanelId, size: GuiPanelSize) -> Result<()> {
        self.registry.change_size(id, size)
    }

    /// Switch between `Visible` and `Minimized`
    ///
    /// `Closed` is rejected with `InvalidArgument`; use [`GuiPanels::close_panel`].
    pub fn set_state(&self, id: GuiPanelId, state: GuiPanelState) -> Result<()> {
        if state == GuiPanelState::Closed {
            return Err(Error::InvalidArgument(
                "GUI panels are closed with close_panel, not set_state".to_string(),
            ));
        }

        self.registry.update(id, |panel| {
            panel.state.state = state;
            Ok(())
        })?;
        debug!("GUI panel {} is now {}", id, state);
        Ok(())
    }

    /// Point the panel at a new URI
    pub fn navigate_to_uri(&self, id: GuiPanelId, uri: &str) -> Result<()> {
        let uri = parse_uri(uri)?;
        debug!("GUI panel {} navigating to {}", id, uri);
        self.registry.update(id, |panel| {
            panel.state.uri = Some(uri);
            Ok(())
        })
    }

    /// Close a panel session-wide
    ///
    /// The returned snapshot is the last one that will ever exist and
    /// carries the `Closed` state.
    pub fn close_panel(&self, id: GuiPanelId) -> Result<GuiPanel> {
        let mut panel = self.registry.close(id)?;
        panel.state.state = GuiPanelState::Closed;
        Ok(panel)
    }
}
