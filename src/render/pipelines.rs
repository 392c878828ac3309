//! Render pipelines for each frame layout.

use bytemuck::{Pod, Zeroable};

use crate::mesh::MeshVertex;

use super::targets::{COLOR_FORMAT, DEPTH_FORMAT, GRAY_FORMAT, POSITION_FORMAT, SAMPLE_COUNT};
use super::RenderError;

/// Per-frame transform uniforms
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct FrameUniforms {
    /// Depth-remapped projection * view
    pub view_proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
}

/// Per-mesh material uniforms
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct MaterialUniforms {
    pub diffuse: [f32; 4],
}

/// Which targets a frame writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameLayout {
    /// RGBA8 color plus world position, single sample
    Color,
    /// R8 luma plus world position, single sample
    Grayscale,
    /// 4x multisampled RGBA8 color only
    MultisampledColor,
}

impl FrameLayout {
    /// Grayscale output has no multisampled counterpart.
    pub fn from_flags(grayscale: bool, multisample: bool) -> Result<Self, RenderError> {
        match (grayscale, multisample) {
            (false, false) => Ok(Self::Color),
            (true, false) => Ok(Self::Grayscale),
            (false, true) => Ok(Self::MultisampledColor),
            (true, true) => Err(RenderError::GrayscaleWithMultisample),
        }
    }

    pub fn sample_count(self) -> u32 {
        match self {
            Self::MultisampledColor => SAMPLE_COUNT,
            _ => 1,
        }
    }

    pub fn writes_world_position(self) -> bool {
        !matches!(self, Self::MultisampledColor)
    }

    fn fragment_entry(self) -> &'static str {
        match self {
            Self::Color => "fs_color",
            Self::Grayscale => "fs_gray",
            Self::MultisampledColor => "fs_color_msaa",
        }
    }

    fn primary_format(self) -> wgpu::TextureFormat {
        match self {
            Self::Grayscale => GRAY_FORMAT,
            _ => COLOR_FORMAT,
        }
    }

    /// Color targets in attachment order. `position_writes` masks the world-position target.
    fn color_targets(self, position_writes: wgpu::ColorWrites) -> Vec<Option<wgpu::ColorTargetState>> {
        let mut targets = vec![Some(wgpu::ColorTargetState {
            format: self.primary_format(),
            blend: None,
            write_mask: wgpu::ColorWrites::ALL,
        })];
        if self.writes_world_position() {
            targets.push(Some(wgpu::ColorTargetState {
                format: POSITION_FORMAT,
                blend: None,
                write_mask: position_writes,
            }));
        }
        targets
    }
}

/// The mesh and background pipelines for one layout
pub(crate) struct PipelineSet {
    pub mesh: wgpu::RenderPipeline,
    pub background: wgpu::RenderPipeline,
}

/// All pipelines and bind group layouts used by the compositor
pub(crate) struct Pipelines {
    pub frame_layout: wgpu::BindGroupLayout,
    pub material_layout: wgpu::BindGroupLayout,
    pub background_layout: wgpu::BindGroupLayout,
    color: PipelineSet,
    grayscale: PipelineSet,
    multisampled: PipelineSet,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let object_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Object Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/object.wgsl").into()),
        });
        let background_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Background Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/background.wgsl").into()),
        });

        let uniform_entry = |visibility| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[uniform_entry(wgpu::ShaderStages::VERTEX)],
        });
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[uniform_entry(wgpu::ShaderStages::FRAGMENT)],
        });

        // Bind group layout: [0] background texture, [1] sampler
        let background_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Background Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let mesh_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&frame_layout, &material_layout],
            push_constant_ranges: &[],
        });
        let background_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Background Pipeline Layout"),
                bind_group_layouts: &[&background_layout],
                push_constant_ranges: &[],
            });

        let build = |layout: FrameLayout| PipelineSet {
            mesh: create_mesh_pipeline(device, &mesh_pipeline_layout, &object_shader, layout),
            background: create_background_pipeline(
                device,
                &background_pipeline_layout,
                &background_shader,
                layout,
            ),
        };

        Self {
            color: build(FrameLayout::Color),
            grayscale: build(FrameLayout::Grayscale),
            multisampled: build(FrameLayout::MultisampledColor),
            frame_layout,
            material_layout,
            background_layout,
        }
    }

    pub fn get(&self, layout: FrameLayout) -> &PipelineSet {
        match layout {
            FrameLayout::Color => &self.color,
            FrameLayout::Grayscale => &self.grayscale,
            FrameLayout::MultisampledColor => &self.multisampled,
        }
    }
}

fn primitive_state() -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        strip_index_format: None,
        front_face: wgpu::FrontFace::Ccw,
        // Wing membranes are single-sided geometry seen from both sides
        cull_mode: None,
        unclipped_depth: false,
        polygon_mode: wgpu::PolygonMode::Fill,
        conservative: false,
    }
}

fn create_mesh_pipeline(
    device: &wgpu::Device,
    pipeline_layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    layout: FrameLayout,
) -> wgpu::RenderPipeline {
    let targets = layout.color_targets(wgpu::ColorWrites::ALL);
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("Mesh Pipeline ({:?})", layout)),
        layout: Some(pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[MeshVertex::buffer_layout()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(layout.fragment_entry()),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: primitive_state(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: layout.sample_count(),
            ..Default::default()
        },
        multiview: None,
        cache: None,
    })
}

/// Full-screen quad at the far plane. It passes `LessEqual` against the cleared
/// depth but never writes depth, so every mesh drawn after it stays in front.
fn create_background_pipeline(
    device: &wgpu::Device,
    pipeline_layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    layout: FrameLayout,
) -> wgpu::RenderPipeline {
    let targets = layout.color_targets(wgpu::ColorWrites::empty());
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("Background Pipeline ({:?})", layout)),
        layout: Some(pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(layout.fragment_entry()),
            targets: &targets,
            compilation_options: Default::default(),
        }),
        primitive: primitive_state(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: layout.sample_count(),
            ..Default::default()
        },
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_flags() {
        assert_eq!(FrameLayout::from_flags(false, false).unwrap(), FrameLayout::Color);
        assert_eq!(FrameLayout::from_flags(true, false).unwrap(), FrameLayout::Grayscale);
        assert_eq!(
            FrameLayout::from_flags(false, true).unwrap(),
            FrameLayout::MultisampledColor
        );
        assert!(matches!(
            FrameLayout::from_flags(true, true),
            Err(RenderError::GrayscaleWithMultisample)
        ));
    }

    #[test]
    fn test_multisampled_frames_skip_world_position() {
        assert_eq!(FrameLayout::MultisampledColor.sample_count(), 4);
        assert!(!FrameLayout::MultisampledColor.writes_world_position());
        assert!(FrameLayout::Grayscale.writes_world_position());

        let targets = FrameLayout::Color.color_targets(wgpu::ColorWrites::empty());
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].as_ref().unwrap().format, COLOR_FORMAT);
        assert_eq!(targets[1].as_ref().unwrap().write_mask, wgpu::ColorWrites::empty());
        assert_eq!(FrameLayout::MultisampledColor.color_targets(wgpu::ColorWrites::ALL).len(), 1);
    }

    #[test]
    fn test_uniform_sizes() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 128);
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 16);
    }
}
