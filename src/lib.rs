//! Wingview
//!
//! Synthetic camera images of a calibrated insect body and wing model,
//! rendered offscreen under a measured camera pose for comparison against
//! photographed reference frames.
//!
//! - [`camera`]: pose and off-axis projection from optical calibration or a
//!   measured view matrix
//! - [`calibration`]: one-shot wing surface correction
//! - [`render`]: offscreen color / grayscale / world-position compositor
//! - [`config`]: JSON scene description
//! - [`scene`]: one-call render of a configured scene

pub mod calibration;
pub mod camera;
pub mod config;
pub mod mesh;
pub mod render;
pub mod scene;
pub mod telemetry;
