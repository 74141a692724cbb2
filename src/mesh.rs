use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;

/// Floats per vertex: `position.xyz` followed by `normal.xyz`.
pub const VERTEX_FLOATS: usize = 6;

/// Interleaved triangle mesh ready for upload as one vertex and one index
/// buffer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_FLOATS
    }

    pub fn position(&self, vertex: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[vertex * VERTEX_FLOATS..])
    }

    pub fn normal(&self, vertex: usize) -> Vec3 {
        Vec3::from_slice(&self.vertices[vertex * VERTEX_FLOATS + 3..])
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Centers the mesh on the origin and scales it uniformly so its longest
    /// side is one unit, the footprint of [`MeshData::cube`].
    pub fn fit_unit_cube(&mut self) {
        let (min, max) = (0..self.vertex_count()).fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), vertex| {
                let p = self.position(vertex);
                (min.min(p), max.max(p))
            },
        );
        let extent = (max - min).max_element();
        if !extent.is_finite() || extent <= f32::EPSILON {
            return;
        }
        let center = (min + max) * 0.5;
        for vertex in 0..self.vertex_count() {
            let offset = vertex * VERTEX_FLOATS;
            let p = (self.position(vertex) - center) / extent;
            self.vertices[offset..offset + 3].copy_from_slice(&p.to_array());
        }
    }

    /// Reads an OBJ file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read mesh {}", path.display()))?;
        Self::from_obj_str(&data).with_context(|| format!("invalid mesh {}", path.display()))
    }

    /// Unit cube centered on the origin with per-face normals.
    pub fn cube() -> Self {
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        ];
        let mut mesh = Self::default();
        for (normal, right, up) in FACES {
            mesh.push_quad(normal * 0.5, right * 0.5, up * 0.5, normal);
        }
        mesh
    }

    /// Square in the XZ plane facing +Y, `size` units across.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        let mut mesh = Self::default();
        mesh.push_quad(Vec3::ZERO, Vec3::X * half, Vec3::NEG_Z * half, Vec3::Y);
        mesh
    }

    /// Counter-clockwise quad around `center` spanned by `right` and `up`.
    fn push_quad(&mut self, center: Vec3, right: Vec3, up: Vec3, normal: Vec3) {
        let base = self.vertex_count() as u32;
        for corner in [
            center - right - up,
            center + right - up,
            center + right + up,
            center - right + up,
        ] {
            self.vertices.extend_from_slice(&corner.to_array());
            self.vertices.extend_from_slice(&normal.to_array());
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Parses an OBJ document. Polygons are fan-triangulated and vertices
    /// without normals get smooth normals computed from the faces.
    pub fn from_obj_str(data: &str) -> Result<Self> {
        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut triangles: Vec<[Corner; 3]> = Vec::new();

        for (line_no, line) in data.lines().enumerate() {
            let mut parts = line.split_whitespace();
            match parts.next() {
                Some("v") => positions.push(
                    parse_vec3(parts)
                        .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
                ),
                Some("vn") => normals.push(
                    parse_vec3(parts)
                        .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
                ),
                Some("f") => {
                    let polygon = parts
                        .map(Corner::parse)
                        .collect::<Result<Vec<_>>>()
                        .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                    if polygon.len() < 3 {
                        return Err(anyhow!(
                            "face on line {} references fewer than 3 vertices",
                            line_no + 1
                        ));
                    }
                    for i in 1..polygon.len() - 1 {
                        triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                    }
                }
                _ => {}
            }
        }

        if positions.is_empty() {
            return Err(anyhow!("OBJ document does not define any vertices"));
        }

        let mut mesh = Self::default();
        let mut lookup: HashMap<(usize, Option<usize>), u32> = HashMap::new();
        let mut missing_normals = false;
        for corner in triangles.iter().flatten() {
            let position = resolve_index(corner.position, positions.len())
                .ok_or_else(|| anyhow!("vertex index {} out of range", corner.position))?;
            let normal = resolve_index(corner.normal, normals.len());
            missing_normals |= normal.is_none();
            let next = mesh.vertex_count() as u32;
            let index = *lookup.entry((position, normal)).or_insert_with(|| {
                let normal = normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO);
                mesh.vertices.extend_from_slice(&positions[position].to_array());
                mesh.vertices.extend_from_slice(&normal.to_array());
                next
            });
            mesh.indices.push(index);
        }

        if missing_normals {
            mesh.compute_normals();
        }
        Ok(mesh)
    }

    fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertex_count()];
        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            let face = (self.position(b) - self.position(a)).cross(self.position(c) - self.position(a));
            if face.length_squared() > f32::EPSILON {
                let face = face.normalize();
                accum[a] += face;
                accum[b] += face;
                accum[c] += face;
            }
        }
        for (vertex, normal) in accum.into_iter().enumerate() {
            let offset = vertex * VERTEX_FLOATS + 3;
            self.vertices[offset..offset + 3].copy_from_slice(&normal.normalize_or_zero().to_array());
        }
    }
}

/// One `v/vt/vn` reference of a face. Texture coordinates are ignored.
#[derive(Debug, Clone, Copy)]
struct Corner {
    position: i32,
    normal: i32,
}

impl Corner {
    fn parse(token: &str) -> Result<Self> {
        let mut segments = token.split('/');
        let position = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()
            .with_context(|| format!("bad vertex index in {token:?}"))?;
        let normal = match segments.nth(1) {
            Some(s) if !s.is_empty() => s
                .parse::<i32>()
                .with_context(|| format!("bad normal index in {token:?}"))?,
            _ => 0,
        };
        Ok(Self { position, normal })
    }
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut component = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(component()?, component()?, component()?))
}

/// OBJ indices are 1-based; negative values count back from the end.
fn resolve_index(index: i32, len: usize) -> Option<usize> {
    match index {
        i if i > 0 => ((i as usize) <= len).then(|| i as usize - 1),
        i if i < 0 => (i.unsigned_abs() as usize <= len).then(|| len - i.unsigned_abs() as usize),
        _ => None,
    }
}
