//! Spatial value types shared by scene objects

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Position in meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Orientation quaternion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quat {
    /// No rotation
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    fn norm_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Position and orientation of a scene object
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Pose at `position` with no rotation
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self::new(Vec3::new(x, y, z), Quat::IDENTITY)
    }

    /// Reject non-finite components and degenerate orientations
    pub fn validate(&self) -> Result<()> {
        if !self.position.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "pose position must be finite: {:?}",
                self.position
            )));
        }

        let norm = self.orientation.norm_squared();
        if !norm.is_finite() || norm < 1e-6 {
            return Err(Error::InvalidArgument(format!(
                "pose orientation must be a non-zero quaternion: {:?}",
                self.orientation
            )));
        }

        Ok(())
    }
}

fn check_dimension(field: &str, meters: f32) -> Result<()> {
    if !meters.is_finite() || meters <= 0.0 {
        return Err(Error::InvalidArgument(format!(
            "{} must be a positive number of meters, got {}",
            field, meters
        )));
    }
    Ok(())
}

/// Size of a GUI panel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuiPanelSize {
    pub width_meters: f32,
    pub height_meters: f32,
}

impl GuiPanelSize {
    pub fn new(width_meters: f32, height_meters: f32) -> Self {
        Self {
            width_meters,
            height_meters,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_dimension("width_meters", self.width_meters)?;
        check_dimension("height_meters", self.height_meters)
    }
}

/// Size of an app volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppVolumeSize {
    pub width_meters: f32,
    pub length_meters: f32,
    pub height_meters: f32,
}

impl AppVolumeSize {
    pub fn new(width_meters: f32, length_meters: f32, height_meters: f32) -> Self {
        Self {
            width_meters,
            length_meters,
            height_meters,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_dimension("width_meters", self.width_meters)?;
        check_dimension("length_meters", self.length_meters)?;
        check_dimension("height_meters", self.height_meters)
    }
}

/// Visibility of a GUI panel
///
/// `Closed` is reached only through `close`; it cannot be requested with
/// `set_state`, and a closed panel can no longer be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuiPanelState {
    #[default]
    Visible,
    Minimized,
    Closed,
}

impl std::fmt::Display for GuiPanelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GuiPanelState::Visible => "VISIBLE",
            GuiPanelState::Minimized => "MINIMIZED",
            GuiPanelState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_validation() {
        assert!(Pose::default().validate().is_ok());
        assert!(Pose::at(0.0, 1.5, -2.0).validate().is_ok());
        assert!(Pose::at(f32::NAN, 0.0, 0.0).validate().is_err());

        let degenerate = Pose::new(Vec3::default(), Quat::new(0.0, 0.0, 0.0, 0.0));
        assert!(degenerate.validate().is_err());
    }

    #[test]
    fn test_sizes_must_be_positive() {
        assert!(GuiPanelSize::new(1.2, 0.7).validate().is_ok());
        assert!(GuiPanelSize::new(0.0, 0.7).validate().is_err());
        assert!(AppVolumeSize::new(1.0, 1.0, -1.0).validate().is_err());
        assert!(AppVolumeSize::new(1.0, f32::INFINITY, 1.0).validate().is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GuiPanelState::Minimized.to_string(), "MINIMIZED");
        assert_eq!(GuiPanelState::default(), GuiPanelState::Visible);
    }
}
