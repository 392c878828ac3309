//! Camera model combining a pose with intrinsics.

use glam::{DMat4, DVec3};

use super::{from_row_major, CameraError, CameraIntrinsics, CameraPose, PoseParameters, Resolution};

/// Calibrated camera: pose, intrinsics and the matrices derived from them.
///
/// The view matrix changes only when a new camera is built; replacing the
/// intrinsics recomputes the projection alone.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    pose: CameraPose,
    intrinsics: CameraIntrinsics,
    view: DMat4,
    projection: DMat4,
}

impl CameraModel {
    /// Build a camera from yaw/pitch/position and optical parameters.
    pub fn from_parameters(
        pose: &PoseParameters,
        intrinsics: CameraIntrinsics,
    ) -> Result<Self, CameraError> {
        intrinsics.validate()?;
        let pose = CameraPose::from_parameters(pose)?;
        let view = pose.view_matrix();
        let projection = intrinsics.projection_matrix();

        tracing::debug!(
            position = ?pose.position(),
            front = ?pose.front(),
            resolution = %intrinsics.resolution(),
            "Camera built from parameters"
        );

        Ok(Self {
            pose,
            intrinsics,
            view,
            projection,
        })
    }

    /// Build a camera from an externally measured view matrix.
    ///
    /// The matrix is kept verbatim as the view matrix; the pose is decoded from it.
    pub fn from_view_matrix(
        view: DMat4,
        intrinsics: CameraIntrinsics,
    ) -> Result<Self, CameraError> {
        intrinsics.validate()?;
        let pose = CameraPose::from_view_matrix(&view)?;
        let projection = intrinsics.projection_matrix();

        tracing::debug!(
            position = ?pose.position(),
            front = ?pose.front(),
            resolution = %intrinsics.resolution(),
            "Camera decoded from view matrix"
        );

        Ok(Self {
            pose,
            intrinsics,
            view,
            projection,
        })
    }

    /// Same as [`CameraModel::from_view_matrix`] for a row-major `[row][col]` array.
    pub fn from_row_major_view(
        rows: &[[f64; 4]; 4],
        intrinsics: CameraIntrinsics,
    ) -> Result<Self, CameraError> {
        Self::from_view_matrix(from_row_major(rows), intrinsics)
    }

    /// Replace the intrinsics, keeping the pose. Only the projection is recomputed.
    pub fn set_intrinsics(&mut self, intrinsics: CameraIntrinsics) -> Result<(), CameraError> {
        intrinsics.validate()?;
        self.intrinsics = intrinsics;
        self.projection = intrinsics.projection_matrix();
        Ok(())
    }

    pub fn view_matrix(&self) -> DMat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> DMat4 {
        self.projection
    }

    pub fn pose(&self) -> &CameraPose {
        &self.pose
    }

    pub fn position(&self) -> DVec3 {
        self.pose.position()
    }

    pub fn right(&self) -> DVec3 {
        self.pose.right()
    }

    pub fn up(&self) -> DVec3 {
        self.pose.up()
    }

    pub fn front(&self) -> DVec3 {
        self.pose.front()
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn width(&self) -> u32 {
        self.intrinsics.width
    }

    pub fn height(&self) -> u32 {
        self.intrinsics.height
    }

    pub fn resolution(&self) -> Resolution {
        self.intrinsics.resolution()
    }
}
