//! Host mirror of the clustered lighting loop that both shading paths run on
//! the GPU. Used for validation and for headless frame summaries.

use glam::{Mat4, Vec2, Vec3};

use crate::camera::CameraUniform;
use crate::cluster::{ClusterGrid, ClusterSet};
use crate::light::Light;

const MIN_DISTANCE: f32 = 1e-4;

/// Windowed inverse-square falloff that reaches zero at `radius`.
pub fn range_attenuation(distance: f32, radius: f32) -> f32 {
    let ratio = distance / radius;
    let ratio2 = ratio * ratio;
    (1.0 - ratio2 * ratio2).clamp(0.0, 1.0) / (distance * distance).max(MIN_DISTANCE)
}

/// Lambert term times falloff for one light, all positions in view space.
pub fn light_contribution(
    light_position: Vec3,
    light: &Light,
    surface_position: Vec3,
    normal: Vec3,
) -> Vec3 {
    let to_light = light_position - surface_position;
    let distance = to_light.length();
    let direction = to_light / distance.max(MIN_DISTANCE);
    let lambert = normal.dot(direction).max(0.0);
    light.color() * lambert * range_attenuation(distance, light.radius)
}

/// View-space surface attributes of one pixel or fragment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo: Vec3,
}

/// Everything the lighting loop reads in one frame.
#[derive(Debug, Clone, Copy)]
pub struct ClusterLighting<'a> {
    pub grid: &'a ClusterGrid,
    pub lights: &'a [Light],
    pub clusters: &'a ClusterSet,
    pub ambient: Vec3,
    view: Mat4,
}

impl<'a> ClusterLighting<'a> {
    pub fn new(
        grid: &'a ClusterGrid,
        camera: &CameraUniform,
        lights: &'a [Light],
        clusters: &'a ClusterSet,
        ambient: Vec3,
    ) -> Self {
        Self {
            grid,
            lights,
            clusters,
            ambient,
            view: camera.view_matrix(),
        }
    }

    /// Shades a surface seen at `frag_coord`, looping only over the lights
    /// listed for the cluster that contains it.
    pub fn shade(&self, frag_coord: Vec2, surface: &Surface) -> Vec3 {
        let cluster = self.grid.cluster_index(frag_coord, -surface.position.z);
        let normal = surface.normal.normalize_or_zero();
        let mut total = Vec3::ZERO;
        for &index in self.clusters.lights(cluster) {
            let light = &self.lights[index as usize];
            let light_position = self.view.transform_point3(light.position());
            total += light_contribution(light_position, light, surface.position, normal);
        }
        surface.albedo * (self.ambient + total)
    }
}

#[cfg(test)]
mod tests {
    use glam::UVec2;

    use super::*;
    use crate::cluster::cull_lights;
    use crate::config::RendererConfig;

    #[test]
    fn attenuation_vanishes_at_radius() {
        assert_eq!(range_attenuation(2.0, 2.0), 0.0);
        assert_eq!(range_attenuation(3.0, 2.0), 0.0);
        assert!(range_attenuation(1.0, 2.0) > 0.0);
        assert!(range_attenuation(0.5, 2.0) > range_attenuation(1.0, 2.0));
        assert!(range_attenuation(0.0, 2.0).is_finite());
    }

    #[test]
    fn back_facing_light_contributes_nothing() {
        let light = Light::new(Vec3::ZERO, 5.0, Vec3::ONE);
        let behind = light_contribution(Vec3::new(0.0, 0.0, 1.0), &light, Vec3::ZERO, Vec3::NEG_Z);
        assert_eq!(behind, Vec3::ZERO);
        let front = light_contribution(Vec3::new(0.0, 0.0, 1.0), &light, Vec3::ZERO, Vec3::Z);
        assert!(front.x > 0.0);
    }

    #[test]
    fn no_lights_leaves_ambient_term() {
        let config = RendererConfig::default();
        let viewport = UVec2::new(320, 180);
        let grid = ClusterGrid::from_config(&config, viewport).unwrap();
        let camera = CameraUniform::new(
            Mat4::IDENTITY,
            Mat4::perspective_rh(1.0, 320.0 / 180.0, 0.1, 1000.0),
            viewport,
            0.1,
            1000.0,
        );
        let clusters = cull_lights(&grid, &camera, &[], 128);
        let ambient = Vec3::splat(0.05);
        let lighting = ClusterLighting::new(&grid, &camera, &[], &clusters, ambient);
        let surface = Surface {
            position: Vec3::new(0.0, 0.0, -4.0),
            normal: Vec3::Z,
            albedo: Vec3::new(1.0, 0.5, 0.25),
        };
        let color = lighting.shade(Vec2::new(160.5, 90.5), &surface);
        assert_eq!(color, surface.albedo * ambient);
    }

    #[test]
    fn lit_surface_is_brighter_than_ambient() {
        let config = RendererConfig::default();
        let viewport = UVec2::new(320, 180);
        let grid = ClusterGrid::from_config(&config, viewport).unwrap();
        let camera = CameraUniform::new(
            Mat4::IDENTITY,
            Mat4::perspective_rh(1.0, 320.0 / 180.0, 0.1, 1000.0),
            viewport,
            0.1,
            1000.0,
        );
        let lights = [Light::new(Vec3::new(0.0, 0.0, -3.0), 2.0, Vec3::new(1.0, 0.0, 0.0))];
        let clusters = cull_lights(&grid, &camera, &lights, 128);
        let lighting = ClusterLighting::new(&grid, &camera, &lights, &clusters, Vec3::ZERO);
        let surface = Surface {
            position: Vec3::new(0.0, 0.0, -4.0),
            normal: Vec3::Z,
            albedo: Vec3::ONE,
        };
        let color = lighting.shade(Vec2::new(160.5, 90.5), &surface);
        assert!(color.x > 0.0);
        assert_eq!(color.y, 0.0);
    }
}
