//! Model placement in the scene.

use glam::{DMat3, DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Translation, rotation (radians, applied X then Y then Z as `Rx * Ry * Rz`)
/// and uniform scale of a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTransform {
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    pub scale: f64,
}

impl Default for ModelTransform {
    fn default() -> Self {
        Self {
            tx: 0.0,
            ty: 0.0,
            tz: 0.0,
            rx: 0.0,
            ry: 0.0,
            rz: 0.0,
            scale: 1.0,
        }
    }
}

impl ModelTransform {
    /// Uniform scale only (inches to scene units, for instance)
    pub fn scaled(scale: f64) -> Self {
        Self {
            scale,
            ..Default::default()
        }
    }

    /// `T * (scale * Rx * Ry * Rz)`
    pub fn to_matrix(&self) -> DMat4 {
        let rotation = DMat3::from_rotation_x(self.rx)
            * DMat3::from_rotation_y(self.ry)
            * DMat3::from_rotation_z(self.rz);
        let linear = rotation * self.scale;
        let mut m = DMat4::from_mat3(linear);
        m.w_axis = DVec3::new(self.tx, self.ty, self.tz).extend(1.0);
        m
    }
}
