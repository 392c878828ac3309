//! Offscreen render targets sized to the camera resolution.

use crate::camera::Resolution;

pub(crate) const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub(crate) const GRAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
pub(crate) const POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Samples per pixel of the multisampled targets
pub const SAMPLE_COUNT: u32 = 4;

pub(crate) struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl RenderTarget {
    fn new(
        device: &wgpu::Device,
        label: &str,
        resolution: Resolution,
        format: wgpu::TextureFormat,
        sample_count: u32,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution.width,
                height: resolution.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        Self { texture, view }
    }
}

/// Every target one frame can write, allocated together.
pub(crate) struct RenderTargetSet {
    pub resolution: Resolution,
    pub color: RenderTarget,
    pub gray: RenderTarget,
    pub position: RenderTarget,
    pub depth: RenderTarget,
    pub msaa_color: RenderTarget,
    pub msaa_depth: RenderTarget,
}

impl RenderTargetSet {
    pub fn new(device: &wgpu::Device, resolution: Resolution) -> Self {
        let readable = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
        let attachment = wgpu::TextureUsages::RENDER_ATTACHMENT;

        tracing::debug!(%resolution, "Allocating render targets");

        Self {
            resolution,
            color: RenderTarget::new(device, "Color Target", resolution, COLOR_FORMAT, 1, readable),
            gray: RenderTarget::new(device, "Grayscale Target", resolution, GRAY_FORMAT, 1, readable),
            position: RenderTarget::new(
                device,
                "World Position Target",
                resolution,
                POSITION_FORMAT,
                1,
                readable,
            ),
            depth: RenderTarget::new(device, "Depth Target", resolution, DEPTH_FORMAT, 1, attachment),
            msaa_color: RenderTarget::new(
                device,
                "Multisampled Color Target",
                resolution,
                COLOR_FORMAT,
                SAMPLE_COUNT,
                attachment,
            ),
            msaa_depth: RenderTarget::new(
                device,
                "Multisampled Depth Target",
                resolution,
                DEPTH_FORMAT,
                SAMPLE_COUNT,
                attachment,
            ),
        }
    }
}
