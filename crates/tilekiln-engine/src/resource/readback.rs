use crate::device::Gpu;
use crate::error::{GpuError, GpuResult};

/// Row pitch of a copy buffer for `width` RGBA8 pixels.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// Copies a region of an RGBA8 texture into `dest`, blocking until done.
///
/// `(x, y)` addresses the region with a bottom-left origin. The output holds
/// the region's rows bottom-up, so row 0 of `dest` is the region's lowest row.
pub(crate) fn read_region(
    gpu: &Gpu,
    texture: &wgpu::Texture,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    dest: &mut [u8],
) -> GpuResult<()> {
    let row_bytes = (width * 4) as usize;
    let expected = row_bytes * height as usize;
    if dest.len() < expected {
        return Err(GpuError::DestinationTooSmall { expected, actual: dest.len() });
    }
    if width == 0 || height == 0 {
        return Ok(());
    }

    let surface_height = texture.height();
    let top = surface_height - (y + height);
    let bytes_per_row = padded_bytes_per_row(width);

    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("tilekiln readback buffer"),
        size: bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("tilekiln readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y: top, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
    );
    let submission = gpu.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    gpu.device
        .poll(wgpu::PollType::Wait { submission_index: Some(submission), timeout: None })
        .map_err(|e| GpuError::Readback(e.to_string()))?;
    rx.recv()
        .map_err(|e| GpuError::Readback(e.to_string()))?
        .map_err(|e| GpuError::Readback(e.to_string()))?;

    {
        let data = slice.get_mapped_range();
        // Texture rows run top-down; flip to bottom-up and strip the padding.
        for row in 0..height as usize {
            let src_row = height as usize - 1 - row;
            let start = src_row * bytes_per_row as usize;
            dest[row * row_bytes..(row + 1) * row_bytes]
                .copy_from_slice(&data[start..start + row_bytes]);
        }
    }
    staging.unmap();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
        assert_eq!(padded_bytes_per_row(256), 1024);
    }
}
