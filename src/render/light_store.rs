use bytemuck::bytes_of;
use log::info;

use crate::error::ConfigError;
use crate::light::{light_set_size, Light, LightSetHeader, LIGHT_SET_HEADER_SIZE};

use super::context::GpuContext;

/// Fixed-capacity light-set storage buffer. Holds no culling logic; the
/// culling pass and the shading passes only read it.
pub struct LightStore {
    buffer: wgpu::Buffer,
    capacity: u32,
    count: u32,
}

impl LightStore {
    pub fn new(ctx: &GpuContext, capacity: u32) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroLightCapacity);
        }
        let size = light_set_size(capacity);
        let limit = ctx.storage_binding_limit();
        if size > limit {
            return Err(ConfigError::BufferTooLarge {
                buffer: "light set",
                required: size,
                limit,
            });
        }
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("light-set"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        info!("light store holds up to {capacity} lights ({size} bytes)");
        Ok(Self {
            buffer,
            capacity,
            count: 0,
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Replaces the resident lights. Slots past `lights.len()` keep stale
    /// data but are never read because the header count excludes them.
    pub fn upload(&mut self, queue: &wgpu::Queue, lights: &[Light]) -> Result<(), ConfigError> {
        if lights.len() > self.capacity as usize {
            return Err(ConfigError::LightCapacityExceeded {
                count: lights.len(),
                capacity: self.capacity,
            });
        }
        self.count = lights.len() as u32;
        queue.write_buffer(&self.buffer, 0, bytes_of(&LightSetHeader::new(self.count)));
        if !lights.is_empty() {
            queue.write_buffer(
                &self.buffer,
                LIGHT_SET_HEADER_SIZE,
                bytemuck::cast_slice(lights),
            );
        }
        Ok(())
    }
}
