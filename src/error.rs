use thiserror::Error;

/// Construction-time failures. None of these can occur once a renderer is
/// running; they are reported once and the caller is expected to abort.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cluster grid dimension {axis} must be non-zero")]
    ZeroGridDimension { axis: char },

    #[error("max lights per cluster must be at least 1")]
    ZeroClusterCapacity,

    #[error("cluster grid {dims:?} with {max_lights_per_cluster} lights per cluster does not fit in 32-bit indices")]
    ClusterGridOverflow {
        dims: [u32; 3],
        max_lights_per_cluster: u32,
    },

    #[error("light capacity must be at least 1")]
    ZeroLightCapacity,

    #[error("invalid depth range: near plane {near} must be positive and below far plane {far}")]
    InvalidDepthRange { near: f32, far: f32 },

    #[error("vertical field of view must be between 0 and 180 degrees, got {degrees}")]
    InvalidFieldOfView { degrees: f32 },

    #[error("viewport must have non-zero area, got {width}x{height}")]
    ZeroViewport { width: u32, height: u32 },

    #[error("{buffer} needs {required} bytes but the device allows at most {limit} per storage binding")]
    BufferTooLarge {
        buffer: &'static str,
        required: u64,
        limit: u64,
    },

    #[error("{format:?} cannot be used as the {role} render target on this adapter")]
    UnsupportedTargetFormat {
        role: &'static str,
        format: wgpu::TextureFormat,
    },

    #[error("{count} lights exceed the light store capacity of {capacity}")]
    LightCapacityExceeded { count: usize, capacity: u32 },
}
