//! Scene configuration
//!
//! One JSON document describes a render: camera intrinsics, where the pose
//! comes from, model placement, output mode, the optional wing calibration,
//! the optional background image, and logging.

use std::fs;
use std::path::{Path, PathBuf};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::calibration::{
    CalibrationPolynomial, DegenerateBlendPolicy, MeshCalibrator, WingCalibration,
};
use crate::camera::{CameraError, CameraIntrinsics, CameraModel, PoseParameters};
use crate::mesh::ModelTransform;
use crate::render::RenderOptions;
use crate::telemetry::LogConfig;

/// Errors loading or applying a scene configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid scene configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to load background image {path}: {source}")]
    Background {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Camera(#[from] CameraError),
}

fn default_world_up() -> [f64; 3] {
    [0.0, 1.0, 0.0]
}

/// Where the camera pose comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoseSource {
    /// Position and Euler angles
    Parameters {
        position: [f64; 3],
        #[serde(default = "default_world_up")]
        world_up: [f64; 3],
        yaw_degrees: f64,
        pitch_degrees: f64,
    },
    /// Externally measured view matrix, `rows[row][col]`
    ViewMatrix { rows: [[f64; 4]; 4] },
}

impl Default for PoseSource {
    fn default() -> Self {
        let params = PoseParameters::default();
        Self::Parameters {
            position: params.position.to_array(),
            world_up: params.world_up.to_array(),
            yaw_degrees: params.yaw_degrees,
            pitch_degrees: params.pitch_degrees,
        }
    }
}

/// Bench camera pose measured for the reference recording
pub const MEASURED_VIEW_MATRIX: [[f64; 4]; 4] = [
    [-0.9965885877609253, -0.08214690536260605, -0.007943005301058292, -0.02309185080230236],
    [-0.01408948749303818, 0.07451639324426651, 0.9971202611923218, 2.110600709915161],
    [-0.08131846040487289, 0.9938305616378784, -0.0754195973277092, -4556.015625],
    [0.0, 0.0, 0.0, 1.0],
];

/// Wing deflection polynomial measured at the reference gain
pub const MEASURED_WING_SURFACE: [f64; 7] = [
    -6.279e-23, 1.302e-28, 4.245e-14, 2.873e-19, 2.453e-06, -5.177e-11, -54.852,
];

/// Complete description of one render
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub intrinsics: CameraIntrinsics,
    #[serde(default)]
    pub pose: PoseSource,
    #[serde(default)]
    pub model_transform: ModelTransform,
    #[serde(default)]
    pub render: RenderOptions,
    #[serde(default)]
    pub calibration: Option<WingCalibration>,
    #[serde(default)]
    pub degenerate_policy: DegenerateBlendPolicy,
    /// Image drawn behind the models
    #[serde(default)]
    pub background_image: Option<PathBuf>,
    #[serde(default)]
    pub logging: LogConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        let surface = CalibrationPolynomial::new(MEASURED_WING_SURFACE.to_vec());
        Self {
            intrinsics: CameraIntrinsics {
                width: 1920,
                height: 1440,
                dx: 5e-6,
                dy: 5e-6,
                focal_length: 0.6125,
                x0: 970.0,
                y0: 710.0,
                z_near: 100.0,
                z_far: 10000.0,
            },
            pose: PoseSource::ViewMatrix {
                rows: MEASURED_VIEW_MATRIX,
            },
            // Model files are in inches
            model_transform: ModelTransform::scaled(0.0254),
            render: RenderOptions {
                grayscale: true,
                multisample: false,
                ..Default::default()
            },
            calibration: Some(WingCalibration::new(surface.clone(), surface, 2.5)),
            degenerate_policy: DegenerateBlendPolicy::default(),
            background_image: None,
            logging: LogConfig::default(),
        }
    }
}

impl SceneConfig {
    /// Load a scene configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.intrinsics.validate()?;
        tracing::info!(path = %path.display(), resolution = %config.intrinsics.resolution(), "Scene configuration loaded");
        Ok(config)
    }

    /// Save as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the camera described by the intrinsics and pose source.
    pub fn build_camera(&self) -> Result<CameraModel, CameraError> {
        match &self.pose {
            PoseSource::Parameters {
                position,
                world_up,
                yaw_degrees,
                pitch_degrees,
            } => {
                let params = PoseParameters {
                    position: DVec3::from_array(*position),
                    world_up: DVec3::from_array(*world_up),
                    yaw_degrees: *yaw_degrees,
                    pitch_degrees: *pitch_degrees,
                };
                CameraModel::from_parameters(&params, self.intrinsics)
            }
            PoseSource::ViewMatrix { rows } => CameraModel::from_row_major_view(rows, self.intrinsics),
        }
    }

    /// The wing calibrator, if the scene has calibration data.
    pub fn build_calibrator(&self) -> Option<MeshCalibrator> {
        self.calibration
            .clone()
            .map(|c| MeshCalibrator::new(c).with_policy(self.degenerate_policy))
    }

    /// Decode the background image, if one is configured.
    pub fn load_background(&self) -> Result<Option<image::DynamicImage>, ConfigError> {
        self.background_image
            .as_ref()
            .map(|path| {
                image::open(path).map_err(|source| ConfigError::Background {
                    path: path.clone(),
                    source,
                })
            })
            .transpose()
    }
}
