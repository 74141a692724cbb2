//! Host execution of both shading strategies over a stream of rasterized
//! fragments. Fragments arrive in submission order, the way the GPU
//! rasterizer would produce them, and pass a `Less` depth test against a
//! shared depth buffer.

use glam::{UVec2, Vec2, Vec3, Vec4};

use crate::camera::CameraUniform;
use crate::shading::{ClusterLighting, Surface};

/// One rasterized sample of scene geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub pixel: UVec2,
    pub surface: Surface,
}

impl Fragment {
    /// Positive view-space depth, used for the depth test.
    pub fn depth(&self) -> f32 {
        -self.surface.position.z
    }

    /// Pixel-center framebuffer coordinate.
    pub fn frag_coord(&self) -> Vec2 {
        self.pixel.as_vec2() + Vec2::splat(0.5)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostImage {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl HostImage {
    pub fn new(width: u32, height: u32, fill: Vec3) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[self.offset(x, y)]
    }

    pub fn pixels(&self) -> &[Vec3] {
        &self.pixels
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Largest per-channel difference between two images of equal size.
    pub fn max_difference(&self, other: &HostImage) -> f32 {
        self.pixels
            .iter()
            .zip(&other.pixels)
            .map(|(a, b)| (*a - *b).abs().max_element())
            .fold(0.0, f32::max)
    }
}

/// Output of one host-rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HostFrame {
    pub image: HostImage,
    /// Number of times the lighting loop ran.
    pub shading_invocations: u64,
}

struct DepthTest {
    width: u32,
    depth: Vec<f32>,
}

impl DepthTest {
    fn new(viewport: UVec2) -> Self {
        Self {
            width: viewport.x,
            depth: vec![f32::INFINITY; viewport.x as usize * viewport.y as usize],
        }
    }

    fn passes(&mut self, fragment: &Fragment) -> Option<usize> {
        let offset = fragment.pixel.y as usize * self.width as usize + fragment.pixel.x as usize;
        let depth = fragment.depth();
        if depth < self.depth[offset] {
            self.depth[offset] = depth;
            Some(offset)
        } else {
            None
        }
    }
}

/// Single pass: every fragment that passes the depth test at the time it
/// arrives is shaded, so overdrawn fragments are shaded too.
pub fn render_forward_plus(
    lighting: &ClusterLighting<'_>,
    background: Vec3,
    fragments: &[Fragment],
) -> HostFrame {
    let viewport = lighting.grid.viewport();
    let mut image = HostImage::new(viewport.x, viewport.y, background);
    let mut depth = DepthTest::new(viewport);
    let mut shading_invocations = 0;
    for fragment in fragments {
        if let Some(offset) = depth.passes(fragment) {
            image.pixels[offset] = lighting.shade(fragment.frag_coord(), &fragment.surface);
            shading_invocations += 1;
        }
    }
    HostFrame {
        image,
        shading_invocations,
    }
}

/// Geometry pass keeps the nearest surface per pixel; the lighting pass then
/// shades each covered pixel exactly once.
pub fn render_clustered_deferred(
    lighting: &ClusterLighting<'_>,
    background: Vec3,
    fragments: &[Fragment],
) -> HostFrame {
    let viewport = lighting.grid.viewport();
    let mut gbuffer: Vec<Option<Surface>> = vec![None; viewport.x as usize * viewport.y as usize];
    let mut depth = DepthTest::new(viewport);
    for fragment in fragments {
        if let Some(offset) = depth.passes(fragment) {
            gbuffer[offset] = Some(fragment.surface);
        }
    }

    let mut image = HostImage::new(viewport.x, viewport.y, background);
    let mut shading_invocations = 0;
    for (offset, surface) in gbuffer.iter().enumerate() {
        let Some(surface) = surface else {
            continue;
        };
        let pixel = UVec2::new(offset as u32 % viewport.x, offset as u32 / viewport.x);
        let frag_coord = pixel.as_vec2() + Vec2::splat(0.5);
        image.pixels[offset] = lighting.shade(frag_coord, surface);
        shading_invocations += 1;
    }
    HostFrame {
        image,
        shading_invocations,
    }
}

/// A sphere to ray-cast into fragments, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
    pub albedo: Vec3,
}

/// Rasterizes spheres by casting one ray per pixel center, producing
/// fragments in sphere order so later spheres overdraw earlier ones.
pub fn rasterize_spheres(camera: &CameraUniform, spheres: &[Sphere]) -> Vec<Fragment> {
    let view = camera.view_matrix();
    let inv_proj = camera.inv_proj_matrix();
    let viewport = camera.viewport();
    let (width, height) = (viewport.x as u32, viewport.y as u32);

    let mut fragments = Vec::new();
    for sphere in spheres {
        let center = view.transform_point3(sphere.center);
        for y in 0..height {
            for x in 0..width {
                let frag = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let ndc = Vec2::new(frag.x / viewport.x * 2.0 - 1.0, 1.0 - frag.y / viewport.y * 2.0);
                let far = inv_proj * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
                let direction = (far.truncate() / far.w).normalize();
                let Some(distance) = ray_sphere(direction, center, sphere.radius) else {
                    continue;
                };
                let position = direction * distance;
                fragments.push(Fragment {
                    pixel: UVec2::new(x, y),
                    surface: Surface {
                        position,
                        normal: (position - center) / sphere.radius,
                        albedo: sphere.albedo,
                    },
                });
            }
        }
    }
    fragments
}

/// Nearest positive hit of a unit ray from the origin.
fn ray_sphere(direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let b = direction.dot(center);
    let c = center.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    [b - root, b + root].into_iter().find(|t| *t > 0.0)
}
