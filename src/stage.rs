//! Demo content: a lit floor with rows of boxes and an animated field of
//! point lights hovering over it.

use std::f32::consts::TAU;

use glam::{Mat4, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::light::Light;

pub const DEFAULT_SEED: u64 = 0x5eed_c1a5;
pub const DEFAULT_LIGHT_RADIUS: f32 = 2.5;

const FLOOR_SIZE: f32 = 32.0;
const BOB_AMPLITUDE: f32 = 0.75;
const BOB_PERIOD_MS: f32 = 4000.0;

/// Region the demo lights are scattered over.
pub fn light_bounds() -> (Vec3, Vec3) {
    let half = FLOOR_SIZE * 0.5 - 1.0;
    (Vec3::new(-half, 0.75, -half), Vec3::new(half, 4.0, half))
}

/// Fixed set of lights with a seeded random layout. Each light bobs up
/// and down around its anchor as time advances.
#[derive(Debug, Clone)]
pub struct LightField {
    lights: Vec<Light>,
    anchors: Vec<Vec3>,
    phases: Vec<f32>,
    elapsed_ms: f32,
}

impl LightField {
    pub fn new(count: usize, seed: u64, bounds: (Vec3, Vec3), radius: f32) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let (min, max) = bounds;
        let mut anchors = Vec::with_capacity(count);
        let mut phases = Vec::with_capacity(count);
        let mut lights = Vec::with_capacity(count);
        for _ in 0..count {
            let anchor = Vec3::new(
                rng.gen_range(min.x..=max.x),
                rng.gen_range(min.y..=max.y),
                rng.gen_range(min.z..=max.z),
            );
            let color = hue_to_rgb(rng.gen_range(0.0..1.0));
            anchors.push(anchor);
            phases.push(rng.gen_range(0.0..TAU));
            lights.push(Light::new(anchor, radius, color));
        }
        let mut field = Self {
            lights,
            anchors,
            phases,
            elapsed_ms: 0.0,
        };
        field.update(0.0);
        field
    }

    pub fn demo(count: usize) -> Self {
        Self::new(count, DEFAULT_SEED, light_bounds(), DEFAULT_LIGHT_RADIUS)
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Advances the animation by `delta_ms` milliseconds.
    pub fn update(&mut self, delta_ms: f32) {
        self.elapsed_ms = (self.elapsed_ms + delta_ms) % BOB_PERIOD_MS;
        let angle = self.elapsed_ms / BOB_PERIOD_MS * TAU;
        for ((light, anchor), phase) in self.lights.iter_mut().zip(&self.anchors).zip(&self.phases) {
            let offset = (angle + phase).sin() * BOB_AMPLITUDE;
            light.position = (*anchor + Vec3::Y * offset).to_array();
        }
    }
}

/// Fully saturated color for a hue in `[0, 1)`.
fn hue_to_rgb(hue: f32) -> Vec3 {
    let h = hue * 6.0;
    let channel = |offset: f32| {
        let k = (h + offset) % 6.0;
        1.0 - (k.min(4.0 - k).clamp(0.0, 1.0))
    };
    Vec3::new(channel(5.0), channel(3.0), channel(1.0))
}

/// Which built-in mesh a prop uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropMesh {
    Floor,
    Cube,
}

/// One placed object of the demo scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prop {
    pub mesh: PropMesh,
    pub transform: Mat4,
    pub albedo: Vec3,
}

/// Floor first, then boxes in a 5 x 5 grid with varied heights and yaw.
pub fn demo_props() -> Vec<Prop> {
    let mut props = vec![Prop {
        mesh: PropMesh::Floor,
        transform: Mat4::from_scale(Vec3::new(FLOOR_SIZE, 1.0, FLOOR_SIZE)),
        albedo: Vec3::splat(0.8),
    }];
    for row in 0..5 {
        for col in 0..5 {
            let index = row * 5 + col;
            let height = 1.0 + (index % 3) as f32;
            let position = Vec3::new(-10.0 + col as f32 * 5.0, height * 0.5, -10.0 + row as f32 * 5.0);
            props.push(Prop {
                mesh: PropMesh::Cube,
                transform: Mat4::from_scale_rotation_translation(
                    Vec3::new(1.5, height, 1.5),
                    Quat::from_rotation_y(index as f32 * 0.4),
                    position,
                ),
                albedo: Vec3::new(0.9, 0.85 - 0.05 * (index % 4) as f32, 0.75),
            });
        }
    }
    props
}
