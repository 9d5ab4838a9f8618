//! App volumes
//!
//! A bounded 3D region in which an application renders. Volumes only carry
//! the common pose and size state.

use super::registry::{ObjectHandle, ObjectRegistry, SceneObject, SceneObjectKind};
use super::{AppVolumeSize, Pose, SceneObjectRef};
use crate::ids::AppVolumeId;
use crate::Result;
use std::sync::Arc;

/// Registry kind for app volumes
#[derive(Debug, Clone, Copy)]
pub struct AppVolumeKind;

impl SceneObjectKind for AppVolumeKind {
    type Id = AppVolumeId;
    type Size = AppVolumeSize;
    type State = ();

    const NAME: &'static str = "app volume";

    fn generate_id() -> AppVolumeId {
        AppVolumeId::generate()
    }

    fn validate_size(size: &AppVolumeSize) -> Result<()> {
        size.validate()
    }

    fn object_ref(id: AppVolumeId) -> SceneObjectRef {
        SceneObjectRef::AppVolume(id)
    }
}

/// Snapshot of an app volume
pub type AppVolume = SceneObject<AppVolumeKind>;

/// Lease on an app volume
pub type AppVolumeHandle = ObjectHandle<AppVolumeKind>;

/// Options for a new volume
#[derive(Debug, Clone, PartialEq)]
pub struct AppVolumeInit {
    pub display_name: String,
    pub pose: Pose,
    pub size: AppVolumeSize,
}

impl AppVolumeInit {
    pub fn new(display_name: impl Into<String>, size: AppVolumeSize) -> Self {
        Self {
            display_name: display_name.into(),
            pose: Pose::default(),
            size,
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }
}

/// App volumes of a session
#[derive(Clone)]
pub struct AppVolumes {
    registry: Arc<ObjectRegistry<AppVolumeKind>>,
}

impl AppVolumes {
    pub(crate) fn new(registry: Arc<ObjectRegistry<AppVolumeKind>>) -> Self {
        Self { registry }
    }

    /// Add a volume visible to every peer
    pub fn add_volume(&self, init: &AppVolumeInit) -> Result<AppVolumeId> {
        self.registry
            .add(&init.display_name, init.pose, init.size, ())
    }

    pub fn count(&self) -> usize {
        self.registry.count()
    }

    pub fn query(&self, capacity: usize) -> Vec<AppVolumeHandle> {
        self.registry.query(capacity)
    }

    pub fn query_into(&self, out: &mut [Option<AppVolumeHandle>]) -> usize {
        self.registry.query_into(out)
    }

    pub fn handle(&self, id: AppVolumeId) -> Result<AppVolumeHandle> {
        self.registry.handle(id)
    }

    pub fn get(&self, id: AppVolumeId) -> Result<AppVolume> {
        self.registry.get(id)
    }

    pub fn update_pose(&self, id: AppVolumeId, pose: Pose) -> Result<()> {
        self.registry.update_pose(id, pose)
    }

    pub fn change_size(&self, id: AppVolumeId, size: AppVolumeSize) -> Result<()> {
        self.registry.change_size(id, size)
    }

    /// Close a volume session-wide
    pub fn close_volume(&self, id: AppVolumeId) -> Result<AppVolume> {
        self.registry.close(id)
    }
}
