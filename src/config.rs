use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cluster::DepthSplit;
use crate::error::ConfigError;

/// Which shading pipeline consumes the cluster set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    ForwardPlus,
    ClusteredDeferred,
}

impl Strategy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "forward-plus" | "forward+" => Some(Self::ForwardPlus),
            "clustered-deferred" | "deferred" => Some(Self::ClusteredDeferred),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ForwardPlus => "forward-plus",
            Self::ClusteredDeferred => "clustered-deferred",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::ForwardPlus => Self::ClusteredDeferred,
            Self::ClusteredDeferred => Self::ForwardPlus,
        }
    }
}

/// Top-level renderer configuration. Every field has a default so partial
/// JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub strategy: Strategy,
    pub cluster: ClusterConfig,
    pub max_lights: u32,
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
    pub gbuffer: GBufferConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            cluster: ClusterConfig::default(),
            max_lights: 5000,
            camera: CameraConfig::default(),
            lighting: LightingConfig::default(),
            gbuffer: GBufferConfig::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("invalid renderer configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("failed to load config {}", path.display()))
    }

    /// Checks everything that can be checked without a device.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cluster.validate()?;
        self.camera.validate()?;
        if self.max_lights == 0 {
            return Err(ConfigError::ZeroLightCapacity);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub dims: [u32; 3],
    pub max_lights_per_cluster: u32,
    pub depth_split: DepthSplit,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            dims: [16, 9, 24],
            max_lights_per_cluster: 128,
            depth_split: DepthSplit::Logarithmic,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, dim) in ['x', 'y', 'z'].into_iter().zip(self.dims) {
            if dim == 0 {
                return Err(ConfigError::ZeroGridDimension { axis });
            }
        }
        if self.max_lights_per_cluster == 0 {
            return Err(ConfigError::ZeroClusterCapacity);
        }
        // The whole cluster buffer is addressed with u32 word offsets.
        let [x, y, z] = self.dims;
        let words = x
            .checked_mul(y)
            .and_then(|count| count.checked_mul(z))
            .zip(self.max_lights_per_cluster.checked_add(1))
            .and_then(|(count, record)| count.checked_mul(record));
        if words.is_none() {
            return Err(ConfigError::ClusterGridOverflow {
                dims: self.dims,
                max_lights_per_cluster: self.max_lights_per_cluster,
            });
        }
        Ok(())
    }

    pub fn cluster_count(&self) -> u32 {
        self.dims[0] * self.dims[1] * self.dims[2]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    /// World units per millisecond.
    pub move_speed: f32,
    /// Degrees per pixel of mouse motion.
    pub sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 45.0,
            near_plane: 0.1,
            far_plane: 1000.0,
            move_speed: 0.004,
            sensitivity: 0.15,
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (near, far) = (self.near_plane, self.far_plane);
        if !(near > 0.0 && far > near && far.is_finite()) {
            return Err(ConfigError::InvalidDepthRange { near, far });
        }
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(ConfigError::InvalidFieldOfView {
                degrees: self.fov_y_degrees,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: [f32; 3],
    pub background: [f32; 3],
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: [0.05, 0.05, 0.05],
            background: [0.0, 0.0, 0.0],
        }
    }
}

/// Color formats the G-buffer targets may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Float,
}

impl TargetFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GBufferConfig {
    pub position: TargetFormat,
    pub albedo: TargetFormat,
    pub normal: TargetFormat,
}

impl Default for GBufferConfig {
    fn default() -> Self {
        Self {
            position: TargetFormat::Rgba32Float,
            albedo: TargetFormat::Rgba16Float,
            normal: TargetFormat::Rgba16Float,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cluster.cluster_count(), 16 * 9 * 24);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RendererConfig::from_json_str(
            r#"{ "strategy": "clustered-deferred", "cluster": { "dims": [8, 8, 24] } }"#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::ClusteredDeferred);
        assert_eq!(config.cluster.dims, [8, 8, 24]);
        assert_eq!(config.cluster.max_lights_per_cluster, 128);
        assert_eq!(config.cluster.depth_split, DepthSplit::Logarithmic);
        assert_eq!(config.gbuffer.position, TargetFormat::Rgba32Float);
    }

    #[test]
    fn rejects_zero_sized_grid() {
        let mut config = RendererConfig::default();
        config.cluster.dims = [16, 0, 24];
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroGridDimension { axis: 'y' })
        );
    }

    #[test]
    fn rejects_grids_that_overflow_cluster_indices() {
        let mut config = RendererConfig::default();
        config.cluster.dims = [65536, 65536, 2];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ClusterGridOverflow { dims: [65536, 65536, 2], .. })
        ));

        let mut config = RendererConfig::default();
        config.cluster.max_lights_per_cluster = u32::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ClusterGridOverflow { max_lights_per_cluster: u32::MAX, .. })
        ));

        // Counts fit individually but the word total does not.
        let mut config = RendererConfig::default();
        config.cluster.dims = [1024, 1024, 64];
        config.cluster.max_lights_per_cluster = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_capacities() {
        let mut config = RendererConfig::default();
        config.cluster.max_lights_per_cluster = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroClusterCapacity));

        let mut config = RendererConfig::default();
        config.max_lights = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroLightCapacity));
    }

    #[test]
    fn rejects_inverted_depth_range() {
        let mut config = RendererConfig::default();
        config.camera.near_plane = 10.0;
        config.camera.far_plane = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDepthRange { .. })
        ));
    }

    #[test]
    fn invalid_json_reports_validation_error() {
        let err = RendererConfig::from_json_str(r#"{ "cluster": { "dims": [0, 1, 1] } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("cluster grid dimension x"));
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in [Strategy::ForwardPlus, Strategy::ClusteredDeferred] {
            assert_eq!(Strategy::from_name(strategy.name()), Some(strategy));
        }
        assert_eq!(Strategy::from_name("deferred"), Some(Strategy::ClusteredDeferred));
        assert_eq!(Strategy::from_name("naive"), None);
    }
}
