use crate::camera::CameraUniform;
use crate::light::Light;

use super::ClusterGrid;

/// Per-cluster light lists with the same layout as the GPU cluster-set
/// buffer: each record is one `u32` count followed by
/// `max_lights_per_cluster` indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSet {
    max_lights_per_cluster: u32,
    counts: Vec<u32>,
    indices: Vec<u32>,
    dropped: u32,
}

/// Occupancy summary of a cluster set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClusterStats {
    pub non_empty: u32,
    pub max_lights: u32,
    pub total_references: u64,
    pub dropped: u32,
}

impl ClusterSet {
    pub fn new(cluster_count: u32, max_lights_per_cluster: u32) -> Self {
        Self {
            max_lights_per_cluster,
            counts: vec![0; cluster_count as usize],
            indices: vec![0; cluster_count as usize * max_lights_per_cluster as usize],
            dropped: 0,
        }
    }

    /// Words per cluster record in the GPU buffer.
    pub const fn record_words(max_lights_per_cluster: u32) -> u32 {
        1 + max_lights_per_cluster
    }

    /// Size in bytes of the GPU buffer holding `cluster_count` records.
    pub const fn buffer_size(cluster_count: u32, max_lights_per_cluster: u32) -> u64 {
        cluster_count as u64 * Self::record_words(max_lights_per_cluster) as u64 * 4
    }

    /// Parses a readback of the GPU cluster-set buffer.
    pub fn from_words(words: &[u32], cluster_count: u32, max_lights_per_cluster: u32) -> Self {
        let stride = Self::record_words(max_lights_per_cluster) as usize;
        let mut set = Self::new(cluster_count, max_lights_per_cluster);
        for (cluster, record) in words
            .chunks_exact(stride)
            .take(cluster_count as usize)
            .enumerate()
        {
            let count = record[0].min(max_lights_per_cluster);
            set.counts[cluster] = count;
            let start = cluster * max_lights_per_cluster as usize;
            set.indices[start..start + count as usize]
                .copy_from_slice(&record[1..1 + count as usize]);
        }
        set
    }

    pub fn cluster_count(&self) -> u32 {
        self.counts.len() as u32
    }

    pub fn max_lights_per_cluster(&self) -> u32 {
        self.max_lights_per_cluster
    }

    pub fn light_count(&self, cluster: u32) -> u32 {
        self.counts[cluster as usize]
    }

    /// The populated prefix of a cluster's index list.
    pub fn lights(&self, cluster: u32) -> &[u32] {
        let start = cluster as usize * self.max_lights_per_cluster as usize;
        &self.indices[start..start + self.counts[cluster as usize] as usize]
    }

    /// Intersecting lights that did not fit. Host culling only; a GPU
    /// readback always reports zero.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Appends a light, or counts it as dropped when the cluster is full.
    fn push(&mut self, cluster: u32, light: u32) -> bool {
        let count = &mut self.counts[cluster as usize];
        if *count >= self.max_lights_per_cluster {
            self.dropped += 1;
            return false;
        }
        self.indices[cluster as usize * self.max_lights_per_cluster as usize + *count as usize] =
            light;
        *count += 1;
        true
    }

    pub fn stats(&self) -> ClusterStats {
        ClusterStats {
            non_empty: self.counts.iter().filter(|count| **count > 0).count() as u32,
            max_lights: self.counts.iter().copied().max().unwrap_or(0),
            total_references: self.counts.iter().map(|count| *count as u64).sum(),
            dropped: self.dropped,
        }
    }
}

/// Host execution of the light culling pass: for every cluster, tests
/// every light's view-space sphere against the cluster bounds in light
/// order and keeps the first `max_lights_per_cluster` hits.
pub fn cull_lights(
    grid: &ClusterGrid,
    camera: &CameraUniform,
    lights: &[Light],
    max_lights_per_cluster: u32,
) -> ClusterSet {
    let view = camera.view_matrix();
    let inv_proj = camera.inv_proj_matrix();
    let centers: Vec<_> = lights
        .iter()
        .map(|light| view.transform_point3(light.position()))
        .collect();

    let mut set = ClusterSet::new(grid.cluster_count(), max_lights_per_cluster);
    for coords in grid.iter_coords() {
        let cluster = grid.linear_index(coords);
        let bounds = grid.cluster_bounds(coords, inv_proj);
        for (index, (light, center)) in lights.iter().zip(&centers).enumerate() {
            if bounds.intersects_sphere(*center, light.radius) {
                set.push(cluster, index as u32);
            }
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use glam::{Mat4, UVec2, UVec3, Vec3};

    use super::*;
    use crate::cluster::DepthSplit;
    use crate::config::ClusterConfig;

    fn camera(fov_y_degrees: f32, viewport: UVec2) -> CameraUniform {
        let proj = Mat4::perspective_rh(
            fov_y_degrees.to_radians(),
            viewport.x as f32 / viewport.y as f32,
            0.1,
            100.0,
        );
        CameraUniform::new(Mat4::IDENTITY, proj, viewport, 0.1, 100.0)
    }

    fn grid(dims: [u32; 3], viewport: UVec2) -> ClusterGrid {
        let cluster = ClusterConfig {
            dims,
            max_lights_per_cluster: 8,
            depth_split: DepthSplit::Logarithmic,
        };
        ClusterGrid::new(&cluster, 0.1, 100.0, viewport).unwrap()
    }

    fn assert_invariants(set: &ClusterSet, light_count: usize) {
        for cluster in 0..set.cluster_count() {
            let lights = set.lights(cluster);
            assert!(lights.len() as u32 <= set.max_lights_per_cluster());
            let unique: HashSet<_> = lights.iter().collect();
            assert_eq!(unique.len(), lights.len(), "duplicate in cluster {cluster}");
            assert!(lights.iter().all(|index| (*index as usize) < light_count));
        }
    }

    #[test]
    fn single_light_on_axis_hits_central_columns_of_three_slices() {
        let viewport = UVec2::new(800, 800);
        let grid = grid([8, 8, 24], viewport);
        let camera = camera(100.0, viewport);

        let start = grid.slice_depth(12);
        let end = grid.slice_depth(13);
        let depth = (start * end).sqrt();
        let light = Light::new(Vec3::new(0.0, 0.0, -depth), 0.2 * start, Vec3::ONE);

        let set = cull_lights(&grid, &camera, &[light], 8);
        let hit: HashSet<UVec3> = grid
            .iter_coords()
            .filter(|coords| set.light_count(grid.linear_index(*coords)) > 0)
            .collect();
        let mut expected = HashSet::new();
        for x in 3..=4 {
            for y in 3..=4 {
                for z in 11..=13 {
                    expected.insert(UVec3::new(x, y, z));
                }
            }
        }
        assert_eq!(hit, expected);
        for coords in &expected {
            assert_eq!(set.lights(grid.linear_index(*coords)), &[0]);
        }
    }

    #[test]
    fn light_outside_every_cluster_is_never_listed() {
        let viewport = UVec2::new(640, 480);
        let grid = grid([16, 9, 24], viewport);
        let camera = camera(45.0, viewport);
        let lights = [
            Light::new(Vec3::new(0.0, 0.0, 10.0), 1.0, Vec3::ONE),
            Light::new(Vec3::new(0.0, 0.0, -5.0), 1.0, Vec3::ONE),
            Light::new(Vec3::new(0.0, 0.0, -500.0), 10.0, Vec3::ONE),
        ];
        let set = cull_lights(&grid, &camera, &lights, 8);
        for cluster in 0..set.cluster_count() {
            assert!(!set.lights(cluster).contains(&0));
            assert!(!set.lights(cluster).contains(&2));
        }
        assert!(set.stats().non_empty > 0);
        assert_invariants(&set, lights.len());
    }

    #[test]
    fn zero_lights_leave_every_cluster_empty() {
        let viewport = UVec2::new(640, 480);
        let grid = grid([16, 9, 24], viewport);
        let set = cull_lights(&grid, &camera(45.0, viewport), &[], 8);
        assert!((0..set.cluster_count()).all(|cluster| set.light_count(cluster) == 0));
        assert_eq!(set.stats(), ClusterStats::default());
    }

    #[test]
    fn overflow_truncates_without_touching_other_clusters() {
        let viewport = UVec2::new(640, 480);
        let grid = grid([4, 4, 8], viewport);
        let camera = camera(45.0, viewport);
        // Twelve overlapping lights in front of the camera, plus one light
        // far off to the side that only reaches a corner of the frustum.
        let mut lights: Vec<Light> = (0..12)
            .map(|i| Light::new(Vec3::new(0.0, 0.0, -3.0 - i as f32 * 0.01), 1.0, Vec3::ONE))
            .collect();
        lights.push(Light::new(Vec3::new(-30.0, -20.0, -60.0), 4.0, Vec3::ONE));

        let set = cull_lights(&grid, &camera, &lights, 8);
        assert_invariants(&set, lights.len());
        assert!(set.dropped() > 0);

        let mut corner_hits = 0;
        for cluster in 0..set.cluster_count() {
            let list = set.lights(cluster);
            if list.len() == 8 {
                assert_eq!(list, &[0, 1, 2, 3, 4, 5, 6, 7]);
            }
            if list.contains(&12) {
                corner_hits += 1;
                assert_eq!(list, &[12]);
            }
        }
        assert!(corner_hits > 0);
        assert_eq!(set.stats().max_lights, 8);
    }

    #[test]
    fn culling_stays_valid_after_resize() {
        let mut viewport = UVec2::new(400, 300);
        let mut grid = grid([16, 9, 24], viewport);
        let lights: Vec<Light> = (0..40)
            .map(|i| {
                let t = i as f32;
                Light::new(
                    Vec3::new((t * 0.7).sin() * 8.0, (t * 1.3).cos() * 4.0, -2.0 - t),
                    2.0,
                    Vec3::ONE,
                )
            })
            .collect();
        let before = cull_lights(&grid, &camera(45.0, viewport), &lights, 8);
        assert_invariants(&before, lights.len());

        viewport *= 2;
        grid.resize(viewport).unwrap();
        let after = cull_lights(&grid, &camera(45.0, viewport), &lights, 8);
        assert_invariants(&after, lights.len());
        // The aspect ratio is unchanged, so the frustum and its cells are too.
        assert_eq!(before.stats().total_references, after.stats().total_references);
    }

    #[test]
    fn readback_words_parse_into_lists() {
        let words = [2, 7, 9, 0, 0, 3, 1, 2, 3, 0];
        let set = ClusterSet::from_words(&words, 2, 4);
        assert_eq!(set.lights(0), &[7, 9]);
        assert_eq!(set.lights(1), &[1, 2, 3]);
        assert_eq!(ClusterSet::buffer_size(2, 4), 40);
    }
}
