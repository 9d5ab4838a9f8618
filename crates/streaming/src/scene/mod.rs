//! Shared scene objects
//!
//! GUI panels and app volumes are both instances of [`ObjectRegistry`],
//! owned by the logical session and visible to every joined peer.
//! Every change is published as a [`SceneEvent`].

pub mod app_volume;
pub mod gui_panel;
pub mod registry;
pub mod types;

pub use app_volume::{AppVolume, AppVolumeHandle, AppVolumeInit, AppVolumeKind, AppVolumes};
pub use gui_panel::{
    GuiPanel, GuiPanelData, GuiPanelHandle, GuiPanelInit, GuiPanelKind, GuiPanels,
};
pub use registry::{ObjectHandle, ObjectRegistry, SceneObject, SceneObjectKind};
pub use types::{AppVolumeSize, GuiPanelSize, GuiPanelState, Pose, Quat, Vec3};

use crate::ids::{AppVolumeId, GuiPanelId};

/// Reference to one scene object of any kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneObjectRef {
    GuiPanel(GuiPanelId),
    AppVolume(AppVolumeId),
}

/// Change notification for a session's scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    /// Object created
    Added(SceneObjectRef),
    /// Pose, size, state or URI changed
    Updated(SceneObjectRef),
    /// Object closed session-wide
    Closed(SceneObjectRef),
}

impl SceneEvent {
    /// Object the event refers to
    pub fn object(&self) -> SceneObjectRef {
        match self {
            SceneEvent::Added(object)
            | SceneEvent::Updated(object)
            | SceneEvent::Closed(object) => *object,
        }
    }
}
