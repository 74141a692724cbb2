//! Cluster grid geometry shared by the culling pass and both shading paths.
//!
//! Every formula here has a WGSL twin generated by
//! [`crate::render::shaders`]. The fragment stages recompute a fragment's
//! cluster independently of the culling pass, so the two must agree
//! operation for operation.

mod cull;

pub use cull::{cull_lights, ClusterSet, ClusterStats};

use glam::{Mat4, UVec2, UVec3, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::config::{ClusterConfig, RendererConfig};
use crate::error::ConfigError;

/// How the `[near, far]` view depth range is cut into slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthSplit {
    /// `depth(s) = near * (far / near)^(s / slices)`.
    #[default]
    Logarithmic,
    /// `depth(s) = near + (far - near) * s / slices`.
    Linear,
}

impl DepthSplit {
    /// View-space depth of the near boundary of `slice`. `slice == slices`
    /// yields the far plane.
    pub fn slice_depth(self, slice: u32, slices: u32, near: f32, far: f32) -> f32 {
        let t = slice as f32 / slices as f32;
        match self {
            Self::Logarithmic => near * (far / near).powf(t),
            Self::Linear => near + (far - near) * t,
        }
    }

    /// Slice containing `view_depth`, clamped to `[0, slices)`.
    pub fn slice_of(self, view_depth: f32, slices: u32, near: f32, far: f32) -> u32 {
        let t = match self {
            Self::Logarithmic => (view_depth.max(near) / near).ln() / (far / near).ln(),
            Self::Linear => (view_depth - near) / (far - near),
        };
        ((t * slices as f32).floor().max(0.0) as u32).min(slices - 1)
    }
}

/// Axis-aligned box in view space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::MAX),
        max: Vec3::splat(f32::MIN),
    };

    pub fn expand(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.max(self.min).min(self.max)
    }

    /// Closed test: a sphere touching the box surface intersects it.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let offset = self.closest_point(center) - center;
        offset.dot(offset) <= radius * radius
    }
}

/// Grid geometry for one camera configuration. Rebuilt on resize or when
/// the projection changes; the dimensions themselves are fixed for the
/// lifetime of the cluster-set buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterGrid {
    dims: UVec3,
    near_plane: f32,
    far_plane: f32,
    viewport: UVec2,
    split: DepthSplit,
}

impl ClusterGrid {
    pub fn new(
        cluster: &ClusterConfig,
        near_plane: f32,
        far_plane: f32,
        viewport: UVec2,
    ) -> Result<Self, ConfigError> {
        cluster.validate()?;
        if !(near_plane > 0.0 && far_plane > near_plane && far_plane.is_finite()) {
            return Err(ConfigError::InvalidDepthRange {
                near: near_plane,
                far: far_plane,
            });
        }
        check_viewport(viewport)?;
        Ok(Self {
            dims: UVec3::from_array(cluster.dims),
            near_plane,
            far_plane,
            viewport,
            split: cluster.depth_split,
        })
    }

    pub fn from_config(config: &RendererConfig, viewport: UVec2) -> Result<Self, ConfigError> {
        Self::new(
            &config.cluster,
            config.camera.near_plane,
            config.camera.far_plane,
            viewport,
        )
    }

    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    pub fn near_plane(&self) -> f32 {
        self.near_plane
    }

    pub fn far_plane(&self) -> f32 {
        self.far_plane
    }

    pub fn viewport(&self) -> UVec2 {
        self.viewport
    }

    pub fn depth_split(&self) -> DepthSplit {
        self.split
    }

    /// Recomputes the screen-space tiling for a new viewport.
    pub fn resize(&mut self, viewport: UVec2) -> Result<(), ConfigError> {
        check_viewport(viewport)?;
        self.viewport = viewport;
        Ok(())
    }

    pub fn cluster_count(&self) -> u32 {
        self.dims.x * self.dims.y * self.dims.z
    }

    /// `cx + dimsX * (cy + dimsY * cz)`.
    pub fn linear_index(&self, coords: UVec3) -> u32 {
        coords.x + self.dims.x * (coords.y + self.dims.y * coords.z)
    }

    pub fn coords_of(&self, index: u32) -> UVec3 {
        let x = index % self.dims.x;
        let y = (index / self.dims.x) % self.dims.y;
        let z = index / (self.dims.x * self.dims.y);
        UVec3::new(x, y, z)
    }

    pub fn iter_coords(&self) -> impl Iterator<Item = UVec3> + '_ {
        (0..self.cluster_count()).map(|index| self.coords_of(index))
    }

    pub fn slice_depth(&self, slice: u32) -> f32 {
        self.split
            .slice_depth(slice, self.dims.z, self.near_plane, self.far_plane)
    }

    pub fn depth_slice(&self, view_depth: f32) -> u32 {
        self.split
            .slice_of(view_depth, self.dims.z, self.near_plane, self.far_plane)
    }

    /// Screen tile under a framebuffer coordinate (origin top-left, y down).
    /// Tile row 0 is the bottom of the screen, matching NDC.
    pub fn tile_of(&self, frag_coord: Vec2) -> UVec2 {
        let viewport = self.viewport.as_vec2();
        let u = frag_coord.x / viewport.x;
        let v = 1.0 - frag_coord.y / viewport.y;
        let x = ((u * self.dims.x as f32).floor().max(0.0) as u32).min(self.dims.x - 1);
        let y = ((v * self.dims.y as f32).floor().max(0.0) as u32).min(self.dims.y - 1);
        UVec2::new(x, y)
    }

    /// Cluster owning a fragment, from its framebuffer coordinate and its
    /// positive view-space depth.
    pub fn cluster_coords(&self, frag_coord: Vec2, view_depth: f32) -> UVec3 {
        self.tile_of(frag_coord).extend(self.depth_slice(view_depth))
    }

    pub fn cluster_index(&self, frag_coord: Vec2, view_depth: f32) -> u32 {
        self.linear_index(self.cluster_coords(frag_coord, view_depth))
    }

    /// View-space bounds of one cluster: the four tile corners are
    /// unprojected to rays, each ray is cut at the slice's near and far
    /// depth, and the box encloses the eight points.
    pub fn cluster_bounds(&self, coords: UVec3, inv_proj: Mat4) -> Aabb {
        let dims = self.dims.truncate().as_vec2();
        let ndc_min = coords.truncate().as_vec2() / dims * 2.0 - 1.0;
        let ndc_max = (coords.truncate() + UVec2::ONE).as_vec2() / dims * 2.0 - 1.0;
        let near_depth = self.slice_depth(coords.z);
        let far_depth = self.slice_depth(coords.z + 1);

        let corners = [
            Vec2::new(ndc_min.x, ndc_min.y),
            Vec2::new(ndc_max.x, ndc_min.y),
            Vec2::new(ndc_min.x, ndc_max.y),
            Vec2::new(ndc_max.x, ndc_max.y),
        ];
        let mut bounds = Aabb::EMPTY;
        for corner in corners {
            let ray = unproject(inv_proj, corner);
            for depth in [near_depth, far_depth] {
                bounds.expand(ray * (depth / -ray.z));
            }
        }
        bounds
    }
}

fn check_viewport(viewport: UVec2) -> Result<(), ConfigError> {
    if viewport.x == 0 || viewport.y == 0 {
        return Err(ConfigError::ZeroViewport {
            width: viewport.x,
            height: viewport.y,
        });
    }
    Ok(())
}

/// View-space point on the far plane under an NDC position.
fn unproject(inv_proj: Mat4, ndc: Vec2) -> Vec3 {
    let point = inv_proj * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
    point.truncate() / point.w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(dims: [u32; 3], split: DepthSplit) -> ClusterGrid {
        let cluster = ClusterConfig {
            dims,
            max_lights_per_cluster: 16,
            depth_split: split,
        };
        ClusterGrid::new(&cluster, 0.1, 100.0, UVec2::new(800, 600)).unwrap()
    }

    fn projection() -> Mat4 {
        Mat4::perspective_rh(60f32.to_radians(), 800.0 / 600.0, 0.1, 100.0)
    }

    #[test]
    fn linear_index_round_trips() {
        let grid = grid([16, 9, 24], DepthSplit::Logarithmic);
        for index in [0, 1, 15, 16, 143, 144, 3455] {
            assert_eq!(grid.linear_index(grid.coords_of(index)), index);
        }
        assert_eq!(grid.linear_index(UVec3::new(3, 2, 1)), 3 + 16 * (2 + 9));
    }

    #[test]
    fn logarithmic_slices_are_monotonic_and_denser_near_camera() {
        let grid = grid([4, 4, 24], DepthSplit::Logarithmic);
        assert!((grid.slice_depth(0) - 0.1).abs() < 1e-6);
        assert!((grid.slice_depth(24) - 100.0).abs() < 1e-2);
        let widths: Vec<f32> = (0..24)
            .map(|s| grid.slice_depth(s + 1) - grid.slice_depth(s))
            .collect();
        assert!(widths.iter().all(|w| *w > 0.0));
        assert!(widths.windows(2).all(|pair| pair[1] > pair[0]));
    }

    #[test]
    fn depth_slice_inverts_slice_depth() {
        for split in [DepthSplit::Logarithmic, DepthSplit::Linear] {
            let grid = grid([4, 4, 24], split);
            for slice in 0..24 {
                let mid = 0.5 * (grid.slice_depth(slice) + grid.slice_depth(slice + 1));
                assert_eq!(grid.depth_slice(mid), slice, "{split:?} slice {slice}");
            }
            assert_eq!(grid.depth_slice(0.0), 0);
            assert_eq!(grid.depth_slice(5000.0), 23);
        }
    }

    #[test]
    fn tiles_follow_ndc_orientation() {
        let grid = grid([8, 8, 4], DepthSplit::Linear);
        assert_eq!(grid.tile_of(Vec2::new(0.5, 0.5)), UVec2::new(0, 7));
        assert_eq!(grid.tile_of(Vec2::new(799.5, 599.5)), UVec2::new(7, 0));
        assert_eq!(grid.tile_of(Vec2::new(-3.0, 900.0)), UVec2::new(0, 0));
    }

    #[test]
    fn mapping_is_pure() {
        let grid = grid([16, 9, 24], DepthSplit::Logarithmic);
        let frag = Vec2::new(321.5, 77.5);
        let first = grid.cluster_coords(frag, 12.25);
        let second = grid.cluster_coords(frag, 12.25);
        assert_eq!(first, second);
    }

    #[test]
    fn bounds_enclose_fragments_mapped_to_the_cluster() {
        let grid = grid([16, 9, 24], DepthSplit::Logarithmic);
        let proj = projection();
        let inv_proj = proj.inverse();
        for &(x, y, depth) in &[(10.5, 20.5, 0.5), (400.5, 300.5, 7.0), (790.5, 590.5, 60.0)] {
            let frag = Vec2::new(x, y);
            let ndc = Vec2::new(x / 800.0 * 2.0 - 1.0, 1.0 - y / 600.0 * 2.0);
            let view_point = unproject(inv_proj, ndc);
            let view_point = view_point * (depth / -view_point.z);
            let coords = grid.cluster_coords(frag, depth);
            let bounds = grid.cluster_bounds(coords, inv_proj);
            let slack = Vec3::splat(1e-3 * depth);
            let padded = Aabb {
                min: bounds.min - slack,
                max: bounds.max + slack,
            };
            assert!(padded.contains(view_point), "{coords:?} {bounds:?} {view_point:?}");
        }
    }

    #[test]
    fn bounds_span_the_slice_depth_range() {
        let grid = grid([4, 4, 8], DepthSplit::Linear);
        let inv_proj = projection().inverse();
        let bounds = grid.cluster_bounds(UVec3::new(1, 2, 3), inv_proj);
        assert!((bounds.max.z + grid.slice_depth(3)).abs() < 1e-3);
        assert!((bounds.min.z + grid.slice_depth(4)).abs() < 1e-3);
    }

    #[test]
    fn tangent_sphere_intersects() {
        let bounds = Aabb {
            min: Vec3::new(0.0, 0.0, -2.0),
            max: Vec3::new(1.0, 1.0, -1.0),
        };
        assert!(bounds.intersects_sphere(Vec3::new(2.0, 0.5, -1.5), 1.0));
        assert!(!bounds.intersects_sphere(Vec3::new(2.0, 0.5, -1.5), 0.999));
        assert!(bounds.intersects_sphere(Vec3::new(0.5, 0.5, -1.5), 0.01));
    }

    #[test]
    fn resize_recomputes_tiling() {
        let mut grid = grid([8, 8, 4], DepthSplit::Linear);
        assert_eq!(grid.tile_of(Vec2::new(700.5, 10.5)), UVec2::new(7, 7));
        grid.resize(UVec2::new(1600, 1200)).unwrap();
        assert_eq!(grid.viewport(), UVec2::new(1600, 1200));
        assert_eq!(grid.tile_of(Vec2::new(700.5, 10.5)), UVec2::new(3, 7));
        assert_eq!(grid.tile_of(Vec2::new(1599.5, 1199.5)), UVec2::new(7, 0));
        assert!(matches!(
            grid.resize(UVec2::new(0, 10)),
            Err(ConfigError::ZeroViewport { .. })
        ));
    }

    #[test]
    fn rejects_bad_depth_range() {
        let cluster = ClusterConfig::default();
        let err = ClusterGrid::new(&cluster, 0.0, 10.0, UVec2::new(4, 4)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDepthRange { .. }));
    }
}
