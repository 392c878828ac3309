//! Synchronous texture readback.

use crate::camera::Resolution;

use super::RenderError;

/// Row stride of a texture copy, rounded up to `COPY_BYTES_PER_ROW_ALIGNMENT`.
pub(crate) fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * bytes_per_pixel).div_ceil(align) * align
}

/// Strip the per-row padding from a mapped copy.
pub(crate) fn unpad_rows(data: &[u8], unpadded: usize, padded: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(unpadded * height);
    for row in data.chunks(padded).take(height) {
        out.extend_from_slice(&row[..unpadded]);
    }
    out
}

/// Copy a single-sample texture into host memory, rows top to bottom.
///
/// Blocks until the GPU has finished every prior submission.
pub(crate) fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    resolution: Resolution,
    bytes_per_pixel: u32,
) -> Result<Vec<u8>, RenderError> {
    let unpadded_bytes_per_row = resolution.width * bytes_per_pixel;
    let padded = padded_bytes_per_row(resolution.width, bytes_per_pixel);

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size: padded as u64 * resolution.height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(resolution.height),
            },
        },
        wgpu::Extent3d {
            width: resolution.width,
            height: resolution.height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let buffer_slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    rx.recv().map_err(|_| RenderError::ReadbackChannel)??;

    let data = buffer_slice.get_mapped_range();
    let pixels = unpad_rows(
        &data,
        unpadded_bytes_per_row as usize,
        padded as usize,
        resolution.height as usize,
    );
    drop(data);
    staging.unmap();

    Ok(pixels)
}
