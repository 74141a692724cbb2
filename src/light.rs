use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Point light record, laid out exactly as the WGSL `Light` struct
/// (vec3 position, f32 radius, vec3 color, 4 bytes of tail padding).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 3],
    _padding: f32,
}

impl Light {
    pub fn new(position: Vec3, radius: f32, color: Vec3) -> Self {
        Self {
            position: position.into(),
            radius,
            color: color.into(),
            _padding: 0.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn color(&self) -> Vec3 {
        Vec3::from_array(self.color)
    }
}

/// Header of the light-set storage buffer. The light array that follows
/// starts at the 16-byte alignment of `Light`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightSetHeader {
    pub num_lights: u32,
    _padding: [u32; 3],
}

impl LightSetHeader {
    pub fn new(num_lights: u32) -> Self {
        Self {
            num_lights,
            _padding: [0; 3],
        }
    }
}

pub const LIGHT_SET_HEADER_SIZE: u64 = std::mem::size_of::<LightSetHeader>() as u64;

/// Byte size of a light-set buffer holding `capacity` lights.
pub const fn light_set_size(capacity: u32) -> u64 {
    LIGHT_SET_HEADER_SIZE + capacity as u64 * std::mem::size_of::<Light>() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<Light>(), 32);
        assert_eq!(LIGHT_SET_HEADER_SIZE, 16);
        assert_eq!(light_set_size(10), 16 + 320);
    }

    #[test]
    fn accessors_round_trip() {
        let light = Light::new(Vec3::new(1.0, 2.0, 3.0), 4.0, Vec3::new(0.5, 0.25, 1.0));
        assert_eq!(light.position(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(light.color(), Vec3::new(0.5, 0.25, 1.0));
        assert_eq!(light.radius, 4.0);
    }
}
