//! Offscreen compositor tests against a real GPU adapter.
//!
//! Each test returns early when the machine has no adapter able to render
//! every target (downlevel GL adapters cannot render float targets).

use std::sync::Arc;

use glam::DMat4;
use image::{DynamicImage, GrayImage, Rgb, Rgb32FImage, RgbImage};

use wingview::camera::{CameraIntrinsics, CameraModel, PoseParameters};
use wingview::calibration::CalibrationReport;
use wingview::config::{PoseSource, SceneConfig};
use wingview::mesh::{Mesh, MeshArrays, Model, ModelTransform, Raw};
use wingview::render::{
    DrawRequest, GpuContext, OffscreenCompositor, RenderError, RenderOptions,
};
use wingview::scene::render_scene;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn gpu() -> Option<Arc<GpuContext>> {
    match GpuContext::new_headless_blocking() {
        Ok(gpu) => Some(Arc::new(gpu)),
        Err(e) => {
            eprintln!("Skipping GPU test: {}", e);
            None
        }
    }
}

fn intrinsics(width: u32, height: u32) -> CameraIntrinsics {
    CameraIntrinsics {
        width,
        height,
        dx: 1e-3,
        dy: 1e-3,
        focal_length: 0.05,
        x0: width as f64 / 2.0,
        y0: height as f64 / 2.0,
        z_near: 0.1,
        z_far: 100.0,
    }
}

/// Default pose: at (0, 0, 3) looking down -Z
fn camera() -> CameraModel {
    CameraModel::from_parameters(&PoseParameters::default(), intrinsics(WIDTH, HEIGHT)).unwrap()
}

/// Unit quad in the z = 0 plane
fn quad(name: &str, diffuse: [f32; 3]) -> Mesh<Raw> {
    Mesh::from_arrays(MeshArrays {
        name: name.to_string(),
        positions: vec![
            [-0.5, -0.5, 0.0],
            [0.5, -0.5, 0.0],
            [0.5, 0.5, 0.0],
            [-0.5, 0.5, 0.0],
        ],
        normals: Some(vec![[0.0, 0.0, 1.0]; 4]),
        indices: vec![0, 1, 2, 0, 2, 3],
        diffuse,
        ..Default::default()
    })
    .unwrap()
}

fn red_background() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([255, 0, 0])))
}

#[test]
fn test_grayscale_with_multisample_is_rejected_without_submission() {
    let Some(gpu) = gpu() else { return };
    let options = RenderOptions {
        grayscale: true,
        multisample: true,
        ..Default::default()
    };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), options).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));

    let result = compositor.draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh]));
    assert!(matches!(result, Err(RenderError::GrayscaleWithMultisample)));
    assert_eq!(compositor.submission_count(), 0);
    assert_eq!(compositor.frame_layout(), None);
}

#[test]
fn test_rebinding_different_resolution_fails_and_keeps_targets() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));

    let small = CameraModel::from_parameters(&PoseParameters::default(), intrinsics(32, 24)).unwrap();
    match compositor.bind_camera(&small) {
        Err(RenderError::ResolutionMismatch { expected, actual }) => {
            assert_eq!((expected.width, expected.height), (WIDTH, HEIGHT));
            assert_eq!((actual.width, actual.height), (32, 24));
        }
        other => panic!("expected resolution mismatch, got {:?}", other),
    }
    assert_eq!(compositor.resolution().width, WIDTH);
    assert_eq!(compositor.camera(), &camera());

    compositor.draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh])).unwrap();
    let mut color = RgbImage::new(WIDTH, HEIGHT);
    compositor.read_color(&mut color).unwrap();
    assert_eq!(color.get_pixel(32, 24), &Rgb([0, 255, 0]));
}

#[test]
fn test_background_never_occludes_geometry() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));
    let background = compositor.upload_background(&red_background()).unwrap();

    let plain = DrawRequest::new(DMat4::IDENTITY, vec![mesh]);
    compositor.draw(&plain).unwrap();
    let mut without = RgbImage::new(WIDTH, HEIGHT);
    compositor.read_color(&mut without).unwrap();

    compositor.draw(&plain.clone().with_background(background)).unwrap();
    let mut with = RgbImage::new(WIDTH, HEIGHT);
    compositor.read_color(&mut with).unwrap();

    // Quad covers roughly columns 24..40 and rows 16..32
    for y in 20..28 {
        for x in 28..36 {
            assert_eq!(with.get_pixel(x, y), without.get_pixel(x, y), "pixel ({}, {})", x, y);
            assert_eq!(with.get_pixel(x, y), &Rgb([0, 255, 0]));
        }
    }
    assert_eq!(without.get_pixel(0, 0), &Rgb([0, 0, 0]));
    assert_eq!(with.get_pixel(0, 0), &Rgb([255, 0, 0]));
    assert_eq!(compositor.submission_count(), 2);
}

#[test]
fn test_world_position_is_top_row_first() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));
    compositor.draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh])).unwrap();

    let mut positions = Rgb32FImage::new(WIDTH, HEIGHT);
    compositor.read_world_position(&mut positions).unwrap();

    let center = positions.get_pixel(32, 24).0;
    assert!(center[0].abs() < 0.1 && center[1].abs() < 0.1, "{:?}", center);
    assert_eq!(center[2], 0.0);
    // Rows above the centre see +Y, columns left of it see -X
    assert!(positions.get_pixel(32, 19).0[1] > 0.1);
    assert!(positions.get_pixel(27, 24).0[0] < -0.1);
    assert_eq!(positions.get_pixel(0, 0).0, [0.0, 0.0, 0.0]);
}

#[test]
fn test_multisampled_frame_requires_resolve() {
    let Some(gpu) = gpu() else { return };
    let options = RenderOptions {
        multisample: true,
        ..Default::default()
    };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), options).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));

    assert!(matches!(compositor.resolve(), Err(RenderError::NothingDrawn)));

    compositor.draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh])).unwrap();
    let mut color = RgbImage::new(WIDTH, HEIGHT);
    assert!(matches!(
        compositor.read_color(&mut color),
        Err(RenderError::UnresolvedFrame)
    ));
    let mut positions = Rgb32FImage::new(WIDTH, HEIGHT);
    assert!(matches!(
        compositor.read_world_position(&mut positions),
        Err(RenderError::TargetNotRendered { .. })
    ));

    compositor.resolve().unwrap();
    assert_eq!(compositor.submission_count(), 2);
    compositor.read_color(&mut color).unwrap();
    assert_eq!(color.get_pixel(32, 24), &Rgb([0, 255, 0]));
    assert_eq!(color.get_pixel(0, 0), &Rgb([0, 0, 0]));

    // Repeatable
    let mut again = RgbImage::new(WIDTH, HEIGHT);
    compositor.read_color(&mut again).unwrap();
    assert_eq!(again, color);
}

#[test]
fn test_grayscale_frame() {
    let Some(gpu) = gpu() else { return };
    let options = RenderOptions {
        grayscale: true,
        ..Default::default()
    };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), options).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));
    let background = compositor.upload_background(&red_background()).unwrap();
    compositor
        .draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh]).with_background(background))
        .unwrap();

    let mut gray = GrayImage::new(WIDTH, HEIGHT);
    compositor.read_grayscale(&mut gray).unwrap();
    // Rec.601: green 0.587, red 0.299
    assert!((gray.get_pixel(32, 24).0[0] as i32 - 150).abs() <= 1);
    assert!((gray.get_pixel(0, 0).0[0] as i32 - 76).abs() <= 1);

    let mut color = RgbImage::new(WIDTH, HEIGHT);
    assert!(matches!(
        compositor.read_color(&mut color),
        Err(RenderError::TargetNotRendered { target: "color" })
    ));
}

#[test]
fn test_readback_checks_buffer_size_and_frame_state() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));

    let mut color = RgbImage::new(WIDTH, HEIGHT);
    assert!(matches!(compositor.read_color(&mut color), Err(RenderError::NothingDrawn)));

    compositor.draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh])).unwrap();
    let mut wrong = RgbImage::new(WIDTH, HEIGHT + 1);
    assert!(matches!(
        compositor.read_color(&mut wrong),
        Err(RenderError::BufferSize { .. })
    ));

    // Changing the output mode invalidates the frame
    compositor.set_grayscale(true);
    assert!(matches!(compositor.read_color(&mut color), Err(RenderError::NothingDrawn)));
}

#[test]
fn test_handles_belong_to_their_compositor() {
    let Some(gpu) = gpu() else { return };
    let mut first = OffscreenCompositor::new(gpu.clone(), &camera(), RenderOptions::default()).unwrap();
    let mut second = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    first.upload_mesh(&quad("a", [1.0, 0.0, 0.0]));
    let foreign = first.upload_mesh(&quad("b", [1.0, 0.0, 0.0]));
    second.upload_mesh(&quad("c", [1.0, 0.0, 0.0]));

    let result = second.draw(&DrawRequest::new(DMat4::IDENTITY, vec![foreign]));
    assert!(matches!(result, Err(RenderError::UnknownMesh(1))));
    assert_eq!(second.submission_count(), 0);
}

#[test]
fn test_model_matrix_moves_geometry() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let meshes = compositor.upload_model(&Model::new("body", vec![quad("body", [0.0, 1.0, 0.0])]));

    // Shifted right by one unit: centre pixel is background, x = 48 is covered
    let transform = ModelTransform {
        tx: 1.0,
        ..Default::default()
    };
    compositor
        .draw(&DrawRequest::new(transform.to_matrix(), meshes))
        .unwrap();
    let mut color = RgbImage::new(WIDTH, HEIGHT);
    compositor.read_color(&mut color).unwrap();
    assert_eq!(color.get_pixel(32, 24), &Rgb([0, 0, 0]));
    assert_eq!(color.get_pixel(48, 24), &Rgb([0, 255, 0]));
}

#[test]
fn test_render_scene_with_parameter_pose() {
    let Some(gpu) = gpu() else { return };
    let config = SceneConfig {
        intrinsics: intrinsics(WIDTH, HEIGHT),
        pose: PoseSource::Parameters {
            position: [0.0, 0.0, 3.0],
            world_up: [0.0, 1.0, 0.0],
            yaw_degrees: -90.0,
            pitch_degrees: 0.0,
        },
        model_transform: ModelTransform::default(),
        calibration: None,
        ..Default::default()
    };
    let body = Model::new("body", vec![quad("body", [0.0, 1.0, 0.0])]);
    let wing = Model::new("wing", vec![quad("wing", [0.0, 1.0, 0.0])]);

    let frame = render_scene(gpu, &config, &body, wing).unwrap();
    assert!(frame.color.is_none());
    assert!(frame.calibration.is_none());
    let gray = frame.grayscale.unwrap();
    assert!((gray.get_pixel(32, 24).0[0] as i32 - 150).abs() <= 1);
    assert!(frame.world_position.is_some());
}

#[test]
fn test_resize_reallocates_targets() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));
    compositor.draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh])).unwrap();

    let larger = CameraModel::from_parameters(&PoseParameters::default(), intrinsics(100, 80)).unwrap();
    compositor.resize(&larger).unwrap();
    assert_eq!(compositor.resolution().width, 100);
    assert_eq!(compositor.resolution().height, 80);
    assert_eq!(compositor.frame_layout(), None);

    // Uploaded meshes survive the reallocation
    compositor.draw(&DrawRequest::new(DMat4::IDENTITY, vec![mesh])).unwrap();
    let mut color = RgbImage::new(100, 80);
    compositor.read_color(&mut color).unwrap();
    assert_eq!(color.get_pixel(50, 40), &Rgb([0, 255, 0]));
    assert_eq!(color.get_pixel(0, 0), &Rgb([0, 0, 0]));
}

#[test]
fn test_oversized_resolution_is_an_error() {
    let Some(gpu) = gpu() else { return };
    let max = gpu.device.limits().max_texture_dimension_2d;
    let oversized = CameraModel::from_parameters(&PoseParameters::default(), intrinsics(max + 1, 16)).unwrap();

    match OffscreenCompositor::new(gpu.clone(), &oversized, RenderOptions::default()) {
        Err(RenderError::ResolutionTooLarge { resolution, max: limit }) => {
            assert_eq!(resolution.width, max + 1);
            assert_eq!(limit, max);
        }
        Err(other) => panic!("expected resolution too large, got {:?}", other),
        Ok(_) => panic!("expected resolution too large"),
    }

    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    assert!(matches!(
        compositor.resize(&oversized),
        Err(RenderError::ResolutionTooLarge { .. })
    ));
    assert_eq!(compositor.resolution().width, WIDTH);
    assert_eq!(compositor.camera(), &camera());
}

#[test]
fn test_multisample_toggle() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let mesh = compositor.upload_mesh(&quad("body", [0.0, 1.0, 0.0]));
    let request = DrawRequest::new(DMat4::IDENTITY, vec![mesh]);
    compositor.draw(&request).unwrap();

    compositor.set_multisample(true);
    assert!(compositor.options().multisample);
    assert_eq!(compositor.frame_layout(), None);

    compositor.draw(&request).unwrap();
    compositor.resolve().unwrap();
    let mut color = RgbImage::new(WIDTH, HEIGHT);
    compositor.read_color(&mut color).unwrap();
    assert_eq!(color.get_pixel(32, 24), &Rgb([0, 255, 0]));
    let mut positions = Rgb32FImage::new(WIDTH, HEIGHT);
    assert!(matches!(
        compositor.read_world_position(&mut positions),
        Err(RenderError::TargetNotRendered { .. })
    ));
    assert_eq!(compositor.submission_count(), 3);

    // Toggling into grayscale as well fails at draw time
    compositor.set_grayscale(true);
    assert!(matches!(
        compositor.draw(&request),
        Err(RenderError::GrayscaleWithMultisample)
    ));
    assert_eq!(compositor.submission_count(), 3);
    assert_eq!(compositor.frame_layout(), None);
}

#[test]
fn test_empty_background_is_rejected() {
    let Some(gpu) = gpu() else { return };
    let mut compositor = OffscreenCompositor::new(gpu, &camera(), RenderOptions::default()).unwrap();
    let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
    assert!(matches!(
        compositor.upload_background(&empty),
        Err(RenderError::EmptyBackground)
    ));
}

#[test]
fn test_render_scene_calibrates_wing() {
    let Some(gpu) = gpu() else { return };
    let config = SceneConfig {
        intrinsics: intrinsics(WIDTH, HEIGHT),
        pose: PoseSource::Parameters {
            position: [0.0, 0.0, 3.0],
            world_up: [0.0, 1.0, 0.0],
            yaw_degrees: -90.0,
            pitch_degrees: 0.0,
        },
        model_transform: ModelTransform::default(),
        ..Default::default()
    };
    assert!(config.calibration.is_some());
    let body = Model::new("body", vec![quad("body", [0.0, 1.0, 0.0])]);
    let wing = Model::new("wing", vec![quad("wing", [0.0, 1.0, 0.0])]);

    let frame = render_scene(gpu, &config, &body, wing).unwrap();
    let report: CalibrationReport = frame.calibration.unwrap();
    assert_eq!(report.corrected, 4);
    assert_eq!(report.extrapolated, 0);
    assert_eq!(report.degenerate, 0);
    assert!(report.max_abs_correction > 0.0);

    let gray = frame.grayscale.unwrap();
    assert!((gray.get_pixel(32, 24).0[0] as i32 - 150).abs() <= 1);
}
