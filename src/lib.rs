//! Clustered light culling with forward+ and clustered-deferred shading.
//!
//! The view frustum is cut into a grid of clusters; a compute pass lists
//! the point lights touching each cluster, and either shading path then
//! lights a fragment with only the lights of the cluster it falls in.
//! Everything that does not need a device (grid math, culling, shading,
//! configuration) also runs on the host so it can be tested and used for
//! headless summaries.

pub mod camera;
pub mod cluster;
pub mod config;
pub mod error;
pub mod input;
pub mod light;
pub mod mesh;
pub mod reference;
pub mod render;
pub mod shading;
pub mod stage;

pub use camera::{Camera, CameraUniform, Projection};
pub use cluster::{cull_lights, Aabb, ClusterGrid, ClusterSet, ClusterStats, DepthSplit};
pub use config::{
    CameraConfig, ClusterConfig, GBufferConfig, LightingConfig, RendererConfig, Strategy,
    TargetFormat,
};
pub use error::ConfigError;
pub use input::{FrameInput, InputState, KeyCode, MouseButton, NamedKey};
pub use light::Light;
pub use mesh::MeshData;
pub use render::{GpuContext, MeshScene, OffscreenTarget, Renderer, Scene, SceneBuilder};
pub use shading::{ClusterLighting, Surface};
pub use stage::LightField;
