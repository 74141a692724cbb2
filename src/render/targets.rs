use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use glam::UVec2;

use crate::config::GBufferConfig;
use crate::error::ConfigError;

use super::context::GpuContext;

fn extent(size: UVec2) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.x.max(1),
        height: size.y.max(1),
        depth_or_array_layers: 1,
    }
}

/// Depth attachment shared by every pass of a frame.
pub struct DepthBuffer {
    _texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl DepthBuffer {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    pub fn new(device: &wgpu::Device, size: UVec2) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

/// One color attachment that a later pass reads with `textureLoad`.
pub struct GBufferTarget {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl GBufferTarget {
    fn new(device: &wgpu::Device, label: &str, format: wgpu::TextureFormat, size: UVec2) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.texture.width(), self.texture.height())
    }
}

/// View-space position, albedo and normal written by the geometry pass.
pub struct GBuffer {
    pub position: GBufferTarget,
    pub albedo: GBufferTarget,
    pub normal: GBufferTarget,
}

impl GBuffer {
    /// Checks every configured format against the adapter before
    /// allocating anything.
    pub fn validate_formats(ctx: &GpuContext, config: &GBufferConfig) -> Result<(), ConfigError> {
        for (role, format) in [
            ("position", config.position),
            ("albedo", config.albedo),
            ("normal", config.normal),
        ] {
            let format = format.to_wgpu();
            if !ctx.supports_render_target(format) {
                return Err(ConfigError::UnsupportedTargetFormat { role, format });
            }
        }
        Ok(())
    }

    pub fn new(ctx: &GpuContext, config: &GBufferConfig, size: UVec2) -> Result<Self, ConfigError> {
        Self::validate_formats(ctx, config)?;
        let device = &ctx.device;
        Ok(Self {
            position: GBufferTarget::new(device, "gbuffer-position", config.position.to_wgpu(), size),
            albedo: GBufferTarget::new(device, "gbuffer-albedo", config.albedo.to_wgpu(), size),
            normal: GBufferTarget::new(device, "gbuffer-normal", config.normal.to_wgpu(), size),
        })
    }

    pub fn size(&self) -> UVec2 {
        self.position.size()
    }

    pub fn formats(&self) -> [wgpu::TextureFormat; 3] {
        [
            self.position.format(),
            self.albedo.format(),
            self.normal.format(),
        ]
    }
}

/// RGBA8 color target that can be copied back to the host. Used for
/// off-screen frames and image comparisons.
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    size: UVec2,
}

impl OffscreenTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(device: &wgpu::Device, size: UVec2) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen-target"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
        }
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    /// Copies the target back and returns tightly packed RGBA8 rows.
    pub fn read_pixels(&self, ctx: &GpuContext) -> Result<Vec<[u8; 4]>> {
        let row_bytes = self.size.x * 4;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen-readback"),
            size: padded_row as u64 * self.size.y as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("offscreen-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(self.size.y),
                },
            },
            extent(self.size),
        );
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let bytes = map_buffer(ctx, &staging)?;
        let mut pixels = Vec::with_capacity(self.size.x as usize * self.size.y as usize);
        for row in bytes.chunks_exact(padded_row as usize) {
            pixels.extend(
                row[..row_bytes as usize]
                    .chunks_exact(4)
                    .map(|px| [px[0], px[1], px[2], px[3]]),
            );
        }
        Ok(pixels)
    }
}

/// Blocks until `buffer` is mapped and returns a copy of its contents.
pub(crate) fn map_buffer(ctx: &GpuContext, buffer: &wgpu::Buffer) -> Result<Vec<u8>> {
    let slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    ctx.device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| anyhow!("buffer map callback was dropped"))?
        .context("failed to map readback buffer")?;
    let bytes = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(bytes)
}
