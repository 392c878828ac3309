//! Camera pose: position plus an orthonormal Right/Up/Front basis.

use glam::{DMat4, DVec3};
use nalgebra::{Matrix3, Vector3};

use super::{from_row_major, to_row_major, CameraError, ORTHONORMAL_TOLERANCE};

/// Yaw/pitch description of a camera pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseParameters {
    /// Camera position in scene units
    pub position: DVec3,
    /// World up direction used to derive the right vector
    pub world_up: DVec3,
    /// Yaw in degrees (-90 looks down -Z)
    pub yaw_degrees: f64,
    /// Pitch in degrees
    pub pitch_degrees: f64,
}

impl Default for PoseParameters {
    fn default() -> Self {
        Self {
            position: DVec3::new(0.0, 0.0, 3.0),
            world_up: DVec3::Y,
            yaw_degrees: -90.0,
            pitch_degrees: 0.0,
        }
    }
}

/// Immutable camera pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    position: DVec3,
    right: DVec3,
    up: DVec3,
    front: DVec3,
}

impl CameraPose {
    /// Build the pose from Euler angles.
    pub fn from_parameters(params: &PoseParameters) -> Result<Self, CameraError> {
        if !params.yaw_degrees.is_finite() {
            return Err(CameraError::NonFinitePose("yaw"));
        }
        if !params.pitch_degrees.is_finite() {
            return Err(CameraError::NonFinitePose("pitch"));
        }
        if !params.position.is_finite() {
            return Err(CameraError::NonFinitePose("position"));
        }
        if !params.world_up.is_finite() {
            return Err(CameraError::NonFinitePose("world_up"));
        }

        let yaw = params.yaw_degrees.to_radians();
        let pitch = params.pitch_degrees.to_radians();
        let front = DVec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        )
        .normalize();

        let right = front.cross(params.world_up);
        if right.length_squared() < 1e-18 {
            return Err(CameraError::DegenerateBasis);
        }
        let right = right.normalize();
        let up = right.cross(front).normalize();

        Ok(Self {
            position: params.position,
            right,
            up,
            front,
        })
    }

    /// Decode the pose from a view matrix laid out as [`CameraPose::view_matrix`] produces.
    ///
    /// Right, Up and -Front are rows 0-2 of the rotation block. The position is
    /// recovered from the translation column `t` by solving `A * P = t`, where
    /// `A` is the negated rotation block (rows `-Right, -Up, +Front`), through
    /// the normal equations `A^T A P = A^T t` factored with Cholesky.
    pub fn from_view_matrix(view: &DMat4) -> Result<Self, CameraError> {
        let rows = to_row_major(view);
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(CameraError::NonFiniteViewMatrix);
        }

        let block = Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            rows[2][0], rows[2][1], rows[2][2],
        );

        let deviation = (block * block.transpose() - Matrix3::identity()).abs().max();
        if deviation > ORTHONORMAL_TOLERANCE {
            return Err(CameraError::NotOrthonormal { deviation });
        }
        let determinant = block.determinant();
        if determinant <= 0.0 {
            return Err(CameraError::NotRightHanded { determinant });
        }

        let system = -block;
        let translation = Vector3::new(rows[0][3], rows[1][3], rows[2][3]);
        let normal = system.transpose() * system;
        let rhs = system.transpose() * translation;
        let position = normal
            .cholesky()
            .map(|factor| factor.solve(&rhs))
            .ok_or(CameraError::IllConditioned)?;
        if !position.iter().all(|v| v.is_finite()) {
            return Err(CameraError::IllConditioned);
        }

        Ok(Self {
            position: DVec3::new(position.x, position.y, position.z),
            right: DVec3::new(rows[0][0], rows[0][1], rows[0][2]),
            up: DVec3::new(rows[1][0], rows[1][1], rows[1][2]),
            front: -DVec3::new(rows[2][0], rows[2][1], rows[2][2]),
        })
    }

    /// View matrix with rows Right, Up, -Front.
    pub fn view_matrix(&self) -> DMat4 {
        let (r, u, f, p) = (self.right, self.up, self.front, self.position);
        from_row_major(&[
            [r.x, r.y, r.z, -r.dot(p)],
            [u.x, u.y, u.z, -u.dot(p)],
            [-f.x, -f.y, -f.z, f.dot(p)],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn right(&self) -> DVec3 {
        self.right
    }

    pub fn up(&self) -> DVec3 {
        self.up
    }

    pub fn front(&self) -> DVec3 {
        self.front
    }
}
