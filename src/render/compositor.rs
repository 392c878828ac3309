//! Offscreen compositor
//!
//! Owns the render targets for one camera resolution, the uploaded meshes and
//! background images, and the state of the last frame. A frame is drawn with
//! [`OffscreenCompositor::draw`], multisampled frames are resolved with
//! [`OffscreenCompositor::resolve`], and any target the frame produced can then
//! be read back as often as needed.

use std::sync::Arc;

use glam::{DMat4, DVec4};
use image::{DynamicImage, GrayImage, Rgb32FImage, RgbImage};
use serde::{Deserialize, Serialize};
use wgpu::util::DeviceExt;

use crate::camera::{CameraModel, Resolution};
use crate::mesh::{Mesh, Model};

use super::gpu_context::check_adapter;
use super::pipelines::{FrameLayout, FrameUniforms, MaterialUniforms, Pipelines};
use super::readback::read_texture;
use super::targets::RenderTargetSet;
use super::{GpuContext, RenderError};

/// Maps OpenGL clip depth (z/w in [-1, 1]) onto the wgpu range [0, 1].
fn gl_to_wgpu_depth() -> DMat4 {
    DMat4::from_cols(
        DVec4::new(1.0, 0.0, 0.0, 0.0),
        DVec4::new(0.0, 1.0, 0.0, 0.0),
        DVec4::new(0.0, 0.0, 0.5, 0.0),
        DVec4::new(0.0, 0.0, 0.5, 1.0),
    )
}

fn check_resolution(device: &wgpu::Device, resolution: Resolution) -> Result<(), RenderError> {
    let max = device.limits().max_texture_dimension_2d;
    if resolution.width > max || resolution.height > max {
        return Err(RenderError::ResolutionTooLarge { resolution, max });
    }
    Ok(())
}

/// Output mode of the compositor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Write Rec.601 luma to an 8-bit target instead of RGB color
    pub grayscale: bool,
    /// Render color with 4x multisampling
    pub multisample: bool,
    /// Clear color (linear RGBA, 0..1) where neither background nor geometry lands
    pub clear_color: [f64; 4],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            grayscale: false,
            multisample: false,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RenderOptions {
    fn clear_color(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }

    fn clear_gray(&self) -> wgpu::Color {
        let [r, g, b, _] = self.clear_color;
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        wgpu::Color {
            r: luma,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        }
    }
}

/// Handle of a mesh uploaded to a compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(usize);

/// Handle of a background image uploaded to a compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackgroundHandle(usize);

/// Everything one frame draws
#[derive(Debug, Clone)]
pub struct DrawRequest {
    /// Image stretched behind all geometry; `None` leaves the clear color
    pub background: Option<BackgroundHandle>,
    /// Model-to-world transform shared by every mesh of the request
    pub model_matrix: DMat4,
    pub meshes: Vec<MeshHandle>,
}

impl DrawRequest {
    pub fn new(model_matrix: DMat4, meshes: Vec<MeshHandle>) -> Self {
        Self {
            background: None,
            model_matrix,
            meshes,
        }
    }

    pub fn with_background(mut self, background: BackgroundHandle) -> Self {
        self.background = Some(background);
        self
    }
}

struct GpuMesh {
    name: String,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    material_bind_group: wgpu::BindGroup,
}

struct GpuBackground {
    // Keeps the texture alive for the bind group
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// The last frame drawn and whether its multisampled color has been resolved
#[derive(Debug, Clone, Copy)]
struct FrameRecord {
    layout: FrameLayout,
    resolved: bool,
}

/// Renders meshes under a calibrated camera into offscreen targets.
pub struct OffscreenCompositor {
    gpu: Arc<GpuContext>,
    options: RenderOptions,
    camera: CameraModel,
    targets: RenderTargetSet,
    pipelines: Pipelines,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    meshes: Vec<GpuMesh>,
    backgrounds: Vec<GpuBackground>,
    frame: Option<FrameRecord>,
    submissions: u64,
}

impl OffscreenCompositor {
    /// Allocate targets at the camera resolution and build every pipeline.
    ///
    /// Fails when the adapter cannot render every target format or the
    /// resolution exceeds the device's texture limit.
    pub fn new(
        gpu: Arc<GpuContext>,
        camera: &CameraModel,
        options: RenderOptions,
    ) -> Result<Self, RenderError> {
        check_adapter(&gpu.adapter)?;
        let device = &gpu.device;
        check_resolution(device, camera.resolution())?;
        let targets = RenderTargetSet::new(device, camera.resolution());
        let pipelines = Pipelines::new(device);

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Uniform Buffer"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &pipelines.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Background Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        tracing::info!(
            resolution = %camera.resolution(),
            grayscale = options.grayscale,
            multisample = options.multisample,
            "Offscreen compositor configured"
        );

        Ok(Self {
            gpu,
            options,
            camera: camera.clone(),
            targets,
            pipelines,
            frame_buffer,
            frame_bind_group,
            sampler,
            meshes: Vec::new(),
            backgrounds: Vec::new(),
            frame: None,
            submissions: 0,
        })
    }

    /// Render target resolution
    pub fn resolution(&self) -> Resolution {
        self.targets.resolution
    }

    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    /// Command buffers submitted by `draw` and `resolve`
    pub fn submission_count(&self) -> u64 {
        self.submissions
    }

    /// Layout of the last frame, if one has been drawn since the last reset
    pub fn frame_layout(&self) -> Option<FrameLayout> {
        self.frame.map(|f| f.layout)
    }

    /// Use `camera` for the following frames.
    ///
    /// The resolution must match the targets; on mismatch nothing changes.
    pub fn bind_camera(&mut self, camera: &CameraModel) -> Result<(), RenderError> {
        let actual = camera.resolution();
        if actual != self.targets.resolution {
            return Err(RenderError::ResolutionMismatch {
                expected: self.targets.resolution,
                actual,
            });
        }
        self.camera = camera.clone();
        Ok(())
    }

    /// Reallocate every target for `camera`'s resolution and bind it.
    ///
    /// A resolution beyond the device limit is an error that changes nothing.
    pub fn resize(&mut self, camera: &CameraModel) -> Result<(), RenderError> {
        let resolution = camera.resolution();
        if resolution != self.targets.resolution {
            check_resolution(&self.gpu.device, resolution)?;
            tracing::info!(from = %self.targets.resolution, to = %resolution, "Resizing render targets");
            self.targets = RenderTargetSet::new(&self.gpu.device, resolution);
        }
        self.camera = camera.clone();
        self.frame = None;
        Ok(())
    }

    pub fn set_grayscale(&mut self, grayscale: bool) {
        if self.options.grayscale != grayscale {
            self.options.grayscale = grayscale;
            self.frame = None;
        }
    }

    pub fn set_multisample(&mut self, multisample: bool) {
        if self.options.multisample != multisample {
            self.options.multisample = multisample;
            self.frame = None;
        }
    }

    /// Upload one mesh's vertices, indices and diffuse color.
    pub fn upload_mesh<S>(&mut self, mesh: &Mesh<S>) -> MeshHandle {
        let device = &self.gpu.device;

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", mesh.name())),
            contents: bytemuck::cast_slice(mesh.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", mesh.name())),
            contents: bytemuck::cast_slice(mesh.indices()),
            usage: wgpu::BufferUsages::INDEX,
        });

        let [r, g, b] = mesh.diffuse();
        let material = MaterialUniforms {
            diffuse: [r, g, b, 1.0],
        };
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", mesh.name())),
            contents: bytemuck::bytes_of(&material),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let material_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Material Bind Group"),
            layout: &self.pipelines.material_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: material_buffer.as_entire_binding(),
            }],
        });

        tracing::debug!(
            mesh = mesh.name(),
            vertices = mesh.vertex_count(),
            indices = mesh.index_count(),
            "Mesh uploaded"
        );

        self.meshes.push(GpuMesh {
            name: mesh.name().to_string(),
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
            material_bind_group,
        });
        MeshHandle(self.meshes.len() - 1)
    }

    /// Upload every mesh of a model, in order.
    pub fn upload_model<S>(&mut self, model: &Model<S>) -> Vec<MeshHandle> {
        model.meshes().iter().map(|mesh| self.upload_mesh(mesh)).collect()
    }

    /// Upload a decoded image for use as a frame background.
    pub fn upload_background(
        &mut self,
        image: &DynamicImage,
    ) -> Result<BackgroundHandle, RenderError> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyBackground);
        }

        let device = &self.gpu.device;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Background Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&Default::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Background Bind Group"),
            layout: &self.pipelines.background_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        tracing::debug!(width, height, "Background uploaded");

        self.backgrounds.push(GpuBackground {
            _texture: texture,
            bind_group,
        });
        Ok(BackgroundHandle(self.backgrounds.len() - 1))
    }

    /// Draw one frame: clear, background at the far plane, then each mesh.
    ///
    /// The output mode and every handle are checked before any GPU work.
    pub fn draw(&mut self, request: &DrawRequest) -> Result<(), RenderError> {
        let layout = FrameLayout::from_flags(self.options.grayscale, self.options.multisample)?;

        let background = request
            .background
            .map(|BackgroundHandle(i)| {
                self.backgrounds
                    .get(i)
                    .ok_or(RenderError::UnknownBackground(i))
            })
            .transpose()?;
        let meshes = request
            .meshes
            .iter()
            .map(|&MeshHandle(i)| self.meshes.get(i).ok_or(RenderError::UnknownMesh(i)))
            .collect::<Result<Vec<_>, _>>()?;

        let view_proj =
            gl_to_wgpu_depth() * self.camera.projection_matrix() * self.camera.view_matrix();
        let uniforms = FrameUniforms {
            view_proj: view_proj.as_mat4().to_cols_array_2d(),
            model: request.model_matrix.as_mat4().to_cols_array_2d(),
        };
        self.gpu
            .queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniforms));

        let targets = &self.targets;
        let (primary_view, primary_clear, depth_view) = match layout {
            FrameLayout::Color => (&targets.color.view, self.options.clear_color(), &targets.depth.view),
            FrameLayout::Grayscale => (&targets.gray.view, self.options.clear_gray(), &targets.depth.view),
            FrameLayout::MultisampledColor => (
                &targets.msaa_color.view,
                self.options.clear_color(),
                &targets.msaa_depth.view,
            ),
        };

        let mut color_attachments = vec![Some(wgpu::RenderPassColorAttachment {
            view: primary_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(primary_clear),
                store: wgpu::StoreOp::Store,
            },
        })];
        if layout.writes_world_position() {
            color_attachments.push(Some(wgpu::RenderPassColorAttachment {
                view: &targets.position.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            }));
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Render Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let pipelines = self.pipelines.get(layout);

            if let Some(background) = background {
                render_pass.set_pipeline(&pipelines.background);
                render_pass.set_bind_group(0, &background.bind_group, &[]);
                render_pass.draw(0..6, 0..1);
            }

            render_pass.set_pipeline(&pipelines.mesh);
            render_pass.set_bind_group(0, &self.frame_bind_group, &[]);
            for mesh in &meshes {
                render_pass.set_bind_group(1, &mesh.material_bind_group, &[]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }
        self.gpu.queue.submit(Some(encoder.finish()));

        tracing::debug!(
            ?layout,
            meshes = ?meshes.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            background = background.is_some(),
            "Frame drawn"
        );

        self.submissions += 1;
        self.frame = Some(FrameRecord {
            layout,
            resolved: layout.sample_count() == 1,
        });
        Ok(())
    }

    /// Resolve a multisampled frame into the single-sample color target.
    ///
    /// Single-sample frames need no resolve and are left as they are.
    pub fn resolve(&mut self) -> Result<(), RenderError> {
        let frame = self.frame.ok_or(RenderError::NothingDrawn)?;
        if frame.layout != FrameLayout::MultisampledColor || frame.resolved {
            return Ok(());
        }

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Resolve Encoder"),
            });
        {
            // Empty pass; the resolve happens when the pass ends
            let _resolve_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Multisample Resolve Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets.msaa_color.view,
                    resolve_target: Some(&self.targets.color.view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.gpu.queue.submit(Some(encoder.finish()));

        self.submissions += 1;
        self.frame = Some(FrameRecord {
            resolved: true,
            ..frame
        });
        tracing::debug!("Multisampled frame resolved");
        Ok(())
    }

    fn check_output(&self, actual: Resolution) -> Result<(), RenderError> {
        let expected = self.targets.resolution;
        if actual != expected {
            return Err(RenderError::BufferSize { expected, actual });
        }
        Ok(())
    }

    fn last_frame(&self) -> Result<FrameRecord, RenderError> {
        self.frame.ok_or(RenderError::NothingDrawn)
    }

    fn read(&self, texture: &wgpu::Texture, bytes_per_pixel: u32) -> Result<Vec<u8>, RenderError> {
        read_texture(
            &self.gpu.device,
            &self.gpu.queue,
            texture,
            self.targets.resolution,
            bytes_per_pixel,
        )
    }

    /// Copy the color of the last frame into `out`, top row first.
    pub fn read_color(&self, out: &mut RgbImage) -> Result<(), RenderError> {
        let frame = self.last_frame()?;
        match frame.layout {
            FrameLayout::Grayscale => return Err(RenderError::TargetNotRendered { target: "color" }),
            FrameLayout::MultisampledColor if !frame.resolved => {
                return Err(RenderError::UnresolvedFrame)
            }
            _ => {}
        }
        let (width, height) = out.dimensions();
        self.check_output(Resolution::new(width, height))?;

        let rgba = self.read(&self.targets.color.texture, 4)?;
        for (dst, src) in out.chunks_exact_mut(3).zip(rgba.chunks_exact(4)) {
            dst.copy_from_slice(&src[..3]);
        }
        Ok(())
    }

    /// Copy the grayscale target of the last frame into `out`, top row first.
    pub fn read_grayscale(&self, out: &mut GrayImage) -> Result<(), RenderError> {
        let frame = self.last_frame()?;
        if frame.layout != FrameLayout::Grayscale {
            return Err(RenderError::TargetNotRendered { target: "grayscale" });
        }
        let (width, height) = out.dimensions();
        self.check_output(Resolution::new(width, height))?;

        let gray = self.read(&self.targets.gray.texture, 1)?;
        out.copy_from_slice(&gray);
        Ok(())
    }

    /// Copy the model-space position of the last frame into `out`, top row first.
    ///
    /// Pixels not covered by geometry read as zero.
    pub fn read_world_position(&self, out: &mut Rgb32FImage) -> Result<(), RenderError> {
        let frame = self.last_frame()?;
        if !frame.layout.writes_world_position() {
            return Err(RenderError::TargetNotRendered {
                target: "world position",
            });
        }
        let (width, height) = out.dimensions();
        self.check_output(Resolution::new(width, height))?;

        let bytes = self.read(&self.targets.position.texture, 16)?;
        let texels = bytes.chunks_exact(16).map(|texel| {
            [0, 4, 8].map(|offset| bytemuck::pod_read_unaligned::<f32>(&texel[offset..offset + 4]))
        });
        for (dst, src) in out.chunks_exact_mut(3).zip(texels) {
            dst.copy_from_slice(&src);
        }
        Ok(())
    }
}
