//! Up-axis handling and conversion into the runtime's Y-up frame

use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::str::FromStr;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// The axis an authoring tool considers "up".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpAxis {
    #[serde(rename = "X_UP")]
    XUp,
    #[default]
    #[serde(rename = "Y_UP")]
    YUp,
    #[serde(rename = "Z_UP")]
    ZUp,
}

impl UpAxis {
    /// The token used for this axis in interchange documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpAxis::XUp => "X_UP",
            UpAxis::YUp => "Y_UP",
            UpAxis::ZUp => "Z_UP",
        }
    }
}

impl fmt::Display for UpAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an up-axis token is not one of `X_UP`, `Y_UP` or `Z_UP`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown up axis '{0}'")]
pub struct ParseUpAxisError(pub String);

impl FromStr for UpAxis {
    type Err = ParseUpAxisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X_UP" => Ok(UpAxis::XUp),
            "Y_UP" => Ok(UpAxis::YUp),
            "Z_UP" => Ok(UpAxis::ZUp),
            other => Err(ParseUpAxisError(other.to_string())),
        }
    }
}

/// Remaps positions, rotations and matrices from a document's up axis into Y-up.
///
/// The converter is a plain value: build one per import and pass it by
/// reference into every extraction step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateConverter {
    up_axis: UpAxis,
    realign: Quat,
}

impl CoordinateConverter {
    pub fn new(up_axis: UpAxis) -> Self {
        let realign = match up_axis {
            UpAxis::XUp => Quat::from_rotation_y(-FRAC_PI_2),
            UpAxis::YUp => Quat::IDENTITY,
            UpAxis::ZUp => Quat::from_rotation_x(-FRAC_PI_2),
        };
        Self { up_axis, realign }
    }

    pub fn up_axis(&self) -> UpAxis {
        self.up_axis
    }

    /// Convert a point or direction. Normals go through here too; they only
    /// need the axis permutation, never a pivot.
    pub fn convert_point(&self, v: Vec3) -> Vec3 {
        match self.up_axis {
            UpAxis::XUp => Vec3::new(-v.y, v.x, v.z),
            UpAxis::YUp => v,
            UpAxis::ZUp => Vec3::new(v.x, v.z, -v.y),
        }
    }

    /// Convert a point about `pivot`: move to pivot space, convert, move back.
    pub fn convert_point_about(&self, v: Vec3, pivot: Vec3) -> Vec3 {
        self.convert_point(v - pivot) + pivot
    }

    /// Post-multiply the fixed realignment rotation for this up axis.
    pub fn convert_rotation(&self, rotation: Quat) -> Quat {
        rotation * self.realign
    }

    /// Recompose a matrix from converted translation, converted rotation and
    /// the unconverted scale.
    ///
    /// Scale is not remapped, so the result is exact only for uniform or
    /// axis-aligned scale.
    pub fn convert_matrix(&self, m: Mat4) -> Mat4 {
        let (scale, rotation, translation) = m.to_scale_rotation_translation();
        Mat4::from_scale_rotation_translation(
            scale,
            self.convert_rotation(rotation),
            self.convert_point(translation),
        )
    }

    /// The converted identity matrix, used as the root of every bone chain.
    pub fn root_matrix(&self) -> Mat4 {
        self.convert_matrix(Mat4::IDENTITY)
    }
}

impl Default for CoordinateConverter {
    fn default() -> Self {
        Self::new(UpAxis::default())
    }
}
