//! Optical calibration parameters and the off-axis projection they define.

use glam::DMat4;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{from_row_major, CameraError};

/// Pixel dimensions of a camera image or render target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn default_z_near() -> f64 {
    100.0
}

fn default_z_far() -> f64 {
    10000.0
}

/// Camera intrinsics as measured by optical calibration.
///
/// Lengths (`dx`, `dy`, `focal_length`) share one unit; `x0`/`y0` are in pixels.
/// The clip planes use the unit of the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Horizontal pixel pitch
    pub dx: f64,
    /// Vertical pixel pitch
    pub dy: f64,
    /// Focal length
    #[serde(alias = "f")]
    pub focal_length: f64,
    /// Principal point, x (pixels)
    pub x0: f64,
    /// Principal point, y (pixels)
    pub y0: f64,
    /// Near clipping plane
    #[serde(default = "default_z_near")]
    pub z_near: f64,
    /// Far clipping plane
    #[serde(default = "default_z_far")]
    pub z_far: f64,
}

impl CameraIntrinsics {
    /// Check the invariants: positive size and pitch, `0 < z_near < z_far`.
    pub fn validate(&self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        let values = [
            ("dx", self.dx),
            ("dy", self.dy),
            ("focal_length", self.focal_length),
            ("x0", self.x0),
            ("y0", self.y0),
            ("z_near", self.z_near),
            ("z_far", self.z_far),
        ];
        if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CameraError::InvalidIntrinsics(format!("{} is not finite", name)));
        }
        if self.dx <= 0.0 || self.dy <= 0.0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "pixel pitch must be positive, got dx={} dy={}",
                self.dx, self.dy
            )));
        }
        if self.focal_length <= 0.0 {
            return Err(CameraError::InvalidIntrinsics(format!(
                "focal length must be positive, got {}",
                self.focal_length
            )));
        }
        if !(self.z_near > 0.0 && self.z_near < self.z_far) {
            return Err(CameraError::InvalidIntrinsics(format!(
                "clip planes must satisfy 0 < near < far, got near={} far={}",
                self.z_near, self.z_far
            )));
        }
        Ok(())
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Off-axis perspective projection (OpenGL clip convention, z in [-1, 1]).
    ///
    /// The frustum is bounded by the sensor extent around the principal point,
    /// so an off-centre principal point shifts the frustum instead of
    /// narrowing a symmetric field of view.
    pub fn projection_matrix(&self) -> DMat4 {
        let width = self.width as f64;
        let height = self.height as f64;
        let r = (width - self.x0) * self.dx;
        let l = -self.x0 * self.dx;
        let t = (height - self.y0) * self.dy;
        let b = -self.y0 * self.dy;
        let (n, f) = (self.z_near, self.z_far);

        let mut rows = [[0.0; 4]; 4];
        rows[0][0] = 2.0 * self.focal_length / (r - l);
        rows[1][1] = 2.0 * self.focal_length / (t - b);
        rows[0][2] = -(l + r) / (l - r);
        rows[1][2] = -(b + t) / (b - t);
        rows[2][2] = (n + f) / (n - f);
        rows[2][3] = 2.0 * f * n / (n - f);
        rows[3][2] = -1.0;
        from_row_major(&rows)
    }
}
