//! Offscreen rendering of calibrated models
//!
//! Renders meshes under a [`CameraModel`](crate::camera::CameraModel) into
//! offscreen targets and reads the pixels back synchronously:
//!
//! - color (RGBA8) or grayscale (R8) primary target
//! - world-position target (RGBA32F, model-space position, alpha 1 on geometry)
//! - depth target (Depth32F)
//! - 4x multisampled color and depth for anti-aliased color frames

mod compositor;
mod gpu_context;
mod pipelines;
mod readback;
mod targets;

pub use compositor::{
    BackgroundHandle, DrawRequest, MeshHandle, OffscreenCompositor, RenderOptions,
};
pub use gpu_context::GpuContext;
pub use pipelines::FrameLayout;
pub use targets::SAMPLE_COUNT;

use crate::camera::Resolution;

/// Rendering and readback errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("adapter {adapter} cannot back the render targets: {reason}")]
    UnsupportedAdapter {
        adapter: String,
        reason: &'static str,
    },
    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("grayscale output cannot be combined with multisampling")]
    GrayscaleWithMultisample,
    #[error("camera resolution {actual} does not match render targets {expected}")]
    ResolutionMismatch {
        expected: Resolution,
        actual: Resolution,
    },
    #[error("resolution {resolution} exceeds the device texture limit of {max}")]
    ResolutionTooLarge { resolution: Resolution, max: u32 },
    #[error("unknown mesh handle {0}")]
    UnknownMesh(usize),
    #[error("unknown background handle {0}")]
    UnknownBackground(usize),
    #[error("background image has no pixels")]
    EmptyBackground,
    #[error("{target} target was not rendered by the last frame")]
    TargetNotRendered { target: &'static str },
    #[error("multisampled frame has not been resolved")]
    UnresolvedFrame,
    #[error("nothing has been drawn yet")]
    NothingDrawn,
    #[error("output buffer is {actual}, expected {expected}")]
    BufferSize {
        expected: Resolution,
        actual: Resolution,
    },
    #[error("failed to map readback buffer: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),
    #[error("readback callback was dropped before completing")]
    ReadbackChannel,
}
