//! Camera geometric model
//!
//! Derives the camera pose and an off-axis perspective projection from either
//! optical calibration parameters (sensor size, pixel pitch, focal length,
//! principal point) or an externally measured 4x4 view matrix.

mod intrinsics;
mod model;
mod pose;

pub use intrinsics::{CameraIntrinsics, Resolution};
pub use model::CameraModel;
pub use pose::{CameraPose, PoseParameters};

use glam::DMat4;

/// Maximum entry of `B * B^T - I` accepted for the rotation block of a view matrix.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-3;

/// Errors raised while building or updating a camera
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    /// Intrinsic parameters violate their invariants
    #[error("invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),
    /// Yaw, pitch, position or world-up contain NaN or infinity
    #[error("non-finite pose parameter: {0}")]
    NonFinitePose(&'static str),
    /// Front is parallel to world-up, so no right vector exists
    #[error("degenerate camera basis: front is parallel to world-up")]
    DegenerateBasis,
    /// The supplied view matrix contains NaN or infinity
    #[error("view matrix contains non-finite entries")]
    NonFiniteViewMatrix,
    /// The rotation block of the view matrix is not orthonormal
    #[error("view matrix rotation block is not orthonormal (max deviation {deviation:.3e})")]
    NotOrthonormal { deviation: f64 },
    /// The rotation block is a reflection rather than a rotation
    #[error("view matrix rotation block is left-handed (determinant {determinant:.6})")]
    NotRightHanded { determinant: f64 },
    /// The position solve did not produce a finite answer
    #[error("camera position solve is ill-conditioned")]
    IllConditioned,
}

/// Build a matrix from rows given in `[row][col]` order.
pub fn from_row_major(rows: &[[f64; 4]; 4]) -> DMat4 {
    DMat4::from_cols_array_2d(rows).transpose()
}

/// Flatten a matrix into `[row][col]` order.
pub fn to_row_major(matrix: &DMat4) -> [[f64; 4]; 4] {
    matrix.transpose().to_cols_array_2d()
}
