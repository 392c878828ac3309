//! Headless GPU context
//!
//! Device and queue without a window surface, shared between compositors
//! through `Arc<GpuContext>`.

use super::targets::{COLOR_FORMAT, DEPTH_FORMAT, POSITION_FORMAT};
use super::RenderError;

/// Shared GPU resources for offscreen rendering.
pub struct GpuContext {
    /// The wgpu instance
    pub instance: wgpu::Instance,
    /// The selected GPU adapter
    pub adapter: wgpu::Adapter,
    /// The GPU device for creating resources
    pub device: wgpu::Device,
    /// The command queue for submitting GPU work
    pub queue: wgpu::Queue,
}

/// First render target capability the given format features lack, if any.
///
/// Downlevel backends (GL, WebGL) cannot render to 32-bit float targets, and
/// some cannot multisample.
pub(crate) fn missing_capability(
    position: wgpu::TextureFormatFeatures,
    color: wgpu::TextureFormatFeatures,
    depth: wgpu::TextureFormatFeatures,
) -> Option<&'static str> {
    use wgpu::TextureFormatFeatureFlags as Flags;

    if !position.allowed_usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
        return Some("Rgba32Float is not renderable");
    }
    if !color.allowed_usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT) {
        return Some("Rgba8Unorm is not renderable");
    }
    if !color.flags.contains(Flags::MULTISAMPLE_X4 | Flags::MULTISAMPLE_RESOLVE) {
        return Some("Rgba8Unorm does not support 4x multisampling");
    }
    if !depth.flags.contains(Flags::MULTISAMPLE_X4) {
        return Some("Depth32Float does not support 4x multisampling");
    }
    None
}

/// Check that `adapter` can back every render target of a compositor.
pub(crate) fn check_adapter(adapter: &wgpu::Adapter) -> Result<(), RenderError> {
    let reason = missing_capability(
        adapter.get_texture_format_features(POSITION_FORMAT),
        adapter.get_texture_format_features(COLOR_FORMAT),
        adapter.get_texture_format_features(DEPTH_FORMAT),
    );
    match reason {
        Some(reason) => Err(RenderError::UnsupportedAdapter {
            adapter: adapter.get_info().name,
            reason,
        }),
        None => Ok(()),
    }
}

impl GpuContext {
    /// Request an adapter and device with no surface attached.
    ///
    /// The preferred adapter is used when it supports every render target;
    /// otherwise the first capable adapter of any backend is taken.
    pub async fn new_headless() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let preferred = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let adapter = match check_adapter(&preferred) {
            Ok(()) => preferred,
            Err(rejected) => {
                tracing::warn!("{}", rejected);
                instance
                    .enumerate_adapters(wgpu::Backends::all())
                    .into_iter()
                    .find(|adapter| check_adapter(adapter).is_ok())
                    .ok_or(rejected)?
            }
        };

        tracing::info!("Using GPU: {}", adapter.get_info().name);
        tracing::info!("Backend: {:?}", adapter.get_info().backend);

        // Without this the device only allows the formats' guaranteed features
        let required_features =
            adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Wingview Device"),
                    required_features,
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Blocking variant of [`GpuContext::new_headless`].
    pub fn new_headless_blocking() -> Result<Self, RenderError> {
        pollster::block_on(Self::new_headless())
    }
}
