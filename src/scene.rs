//! One-shot scene render
//!
//! Wires a [`SceneConfig`] to the camera, calibrator and compositor: builds the
//! camera, corrects the wing, uploads body, wing and background, draws one
//! frame and reads back every target the frame produced.

use std::sync::Arc;

use image::{GrayImage, Rgb32FImage, RgbImage};

use crate::calibration::{CalibrationError, CalibrationReport};
use crate::camera::CameraError;
use crate::config::{ConfigError, SceneConfig};
use crate::mesh::{Model, Raw};
use crate::render::{DrawRequest, FrameLayout, GpuContext, OffscreenCompositor, RenderError};

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Images read back from one rendered frame
#[derive(Debug, Clone, Default)]
pub struct SceneFrame {
    /// Color frames (plain or multisampled)
    pub color: Option<RgbImage>,
    /// Grayscale frames
    pub grayscale: Option<GrayImage>,
    /// Single-sample frames
    pub world_position: Option<Rgb32FImage>,
    /// Present when the wing was calibrated
    pub calibration: Option<CalibrationReport>,
}

/// Render `body` and `wing` as described by `config`.
pub fn render_scene(
    gpu: Arc<GpuContext>,
    config: &SceneConfig,
    body: &Model<Raw>,
    wing: Model<Raw>,
) -> Result<SceneFrame, SceneError> {
    let camera = config.build_camera()?;
    let mut compositor = OffscreenCompositor::new(gpu, &camera, config.render)?;
    let mut frame = SceneFrame::default();

    let mut meshes = compositor.upload_model(body);
    match config.build_calibrator() {
        Some(calibrator) => {
            let (wing, report) = calibrator.calibrate(wing)?;
            meshes.extend(compositor.upload_model(&wing));
            frame.calibration = Some(report);
        }
        None => meshes.extend(compositor.upload_model(&wing)),
    }

    let mut request = DrawRequest::new(config.model_transform.to_matrix(), meshes);
    if let Some(image) = config.load_background()? {
        request = request.with_background(compositor.upload_background(&image)?);
    }

    compositor.draw(&request)?;
    compositor.resolve()?;

    let resolution = compositor.resolution();
    let (width, height) = (resolution.width, resolution.height);
    match compositor.frame_layout() {
        Some(FrameLayout::Grayscale) => {
            let mut gray = GrayImage::new(width, height);
            compositor.read_grayscale(&mut gray)?;
            frame.grayscale = Some(gray);
        }
        Some(FrameLayout::Color) | Some(FrameLayout::MultisampledColor) => {
            let mut color = RgbImage::new(width, height);
            compositor.read_color(&mut color)?;
            frame.color = Some(color);
        }
        None => return Err(RenderError::NothingDrawn.into()),
    }
    if compositor.frame_layout().is_some_and(FrameLayout::writes_world_position) {
        let mut positions = Rgb32FImage::new(width, height);
        compositor.read_world_position(&mut positions)?;
        frame.world_position = Some(positions);
    }

    tracing::info!(%resolution, "Scene rendered");
    Ok(frame)
}
