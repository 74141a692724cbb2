//! Scene interface consumed by both shading paths, plus a mesh-based
//! implementation used by the viewer and the tests.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::mesh::{MeshData, VERTEX_FLOATS};
use crate::stage::{demo_props, PropMesh};

use super::context::GpuContext;

/// Callbacks issued by [`Scene::iterate`]: one `node` per scene node, then
/// one `material` per material under it, then one `primitive` per
/// primitive under that material.
pub trait SceneVisitor {
    fn node(&mut self, bind_group: &wgpu::BindGroup);
    fn material(&mut self, bind_group: &wgpu::BindGroup);
    fn primitive(&mut self, primitive: &Primitive);
}

/// Anything the renderer can draw. Traversal order must be deterministic
/// for a given scene.
pub trait Scene {
    fn iterate(&self, visitor: &mut dyn SceneVisitor);
}

/// Vertex and index buffers of one indexed draw.
pub struct Primitive {
    pub vertex: wgpu::Buffer,
    pub index: wgpu::Buffer,
    pub index_count: u32,
}

impl Primitive {
    pub fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }

    /// Interleaved `position.xyz, normal.xyz` layout shared by every
    /// geometry pipeline.
    pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: (VERTEX_FLOATS * std::mem::size_of::<f32>()) as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct NodeUniforms {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
}

impl NodeUniforms {
    pub fn new(model: Mat4) -> Self {
        let normal = Mat4::from_mat3(Mat3::from_mat4(model).inverse().transpose());
        Self {
            model: model.to_cols_array_2d(),
            normal: normal.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniforms {
    albedo: [f32; 4],
}

impl MaterialUniforms {
    pub fn new(albedo: Vec3) -> Self {
        Self {
            albedo: albedo.extend(1.0).to_array(),
        }
    }
}

/// Bind group layouts for groups 1 (node) and 2 (material). Created once
/// by the renderer; scenes must build their bind groups against these.
pub struct SceneLayouts {
    pub node: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
}

impl SceneLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            node: uniform_layout::<NodeUniforms>(device, "node-bind-layout", wgpu::ShaderStages::VERTEX),
            material: uniform_layout::<MaterialUniforms>(
                device,
                "material-bind-layout",
                wgpu::ShaderStages::FRAGMENT,
            ),
        }
    }
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<T>() as u64),
            },
            count: None,
        }],
    })
}

fn uniform_bind_group<T: Pod>(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    label: &str,
    value: &T,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    });
    (buffer, bind_group)
}

/// Handle to a mesh uploaded through [`SceneBuilder::add_mesh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshHandle(usize);

struct MaterialEntry {
    _buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    primitives: Vec<usize>,
}

struct NodeEntry {
    _buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    materials: Vec<MaterialEntry>,
}

/// Nodes with one transform each, materials with one albedo each, and
/// primitives shared between nodes.
pub struct MeshScene {
    primitives: Vec<Primitive>,
    nodes: Vec<NodeEntry>,
}

impl MeshScene {
    /// Floor and boxes from [`crate::stage::demo_props`].
    pub fn demo(ctx: &GpuContext, layouts: &SceneLayouts) -> Self {
        Self::demo_with_prop(ctx, layouts, &MeshData::cube())
    }

    /// The demo layout with `prop` drawn wherever a box would be. `prop`
    /// should fit the unit cube.
    pub fn demo_with_prop(ctx: &GpuContext, layouts: &SceneLayouts, prop: &MeshData) -> Self {
        let mut builder = SceneBuilder::new(ctx, layouts);
        let floor = builder.add_mesh(&MeshData::plane(1.0), "floor");
        let boxes = builder.add_mesh(prop, "prop");
        for placement in demo_props() {
            let mesh = match placement.mesh {
                PropMesh::Floor => floor,
                PropMesh::Cube => boxes,
            };
            builder.add_node(placement.transform, placement.albedo, mesh);
        }
        builder.build()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Scene for MeshScene {
    fn iterate(&self, visitor: &mut dyn SceneVisitor) {
        for node in &self.nodes {
            visitor.node(&node.bind_group);
            for material in &node.materials {
                visitor.material(&material.bind_group);
                for &primitive in &material.primitives {
                    visitor.primitive(&self.primitives[primitive]);
                }
            }
        }
    }
}

pub struct SceneBuilder<'a> {
    device: &'a wgpu::Device,
    layouts: &'a SceneLayouts,
    primitives: Vec<Primitive>,
    nodes: Vec<NodeEntry>,
}

impl<'a> SceneBuilder<'a> {
    pub fn new(ctx: &'a GpuContext, layouts: &'a SceneLayouts) -> Self {
        Self {
            device: &ctx.device,
            layouts,
            primitives: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn add_mesh(&mut self, mesh: &MeshData, label: &str) -> MeshHandle {
        self.primitives
            .push(Primitive::from_mesh(self.device, mesh, label));
        MeshHandle(self.primitives.len() - 1)
    }

    /// Adds a node drawing `mesh` with a single material.
    pub fn add_node(&mut self, transform: Mat4, albedo: Vec3, mesh: MeshHandle) {
        let (material_buffer, material_bind_group) = uniform_bind_group(
            self.device,
            &self.layouts.material,
            "material-uniform",
            &MaterialUniforms::new(albedo),
        );
        let (node_buffer, node_bind_group) = uniform_bind_group(
            self.device,
            &self.layouts.node,
            "node-uniform",
            &NodeUniforms::new(transform),
        );
        self.nodes.push(NodeEntry {
            _buffer: node_buffer,
            bind_group: node_bind_group,
            materials: vec![MaterialEntry {
                _buffer: material_buffer,
                bind_group: material_bind_group,
                primitives: vec![mesh.0],
            }],
        });
    }

    pub fn build(self) -> MeshScene {
        MeshScene {
            primitives: self.primitives,
            nodes: self.nodes,
        }
    }
}

/// Issues the scene's draws into a render pass whose pipeline uses groups
/// 1 and 2 for node and material.
pub(crate) struct DrawVisitor<'a, 'pass> {
    pub pass: &'a mut wgpu::RenderPass<'pass>,
}

impl SceneVisitor for DrawVisitor<'_, '_> {
    fn node(&mut self, bind_group: &wgpu::BindGroup) {
        self.pass.set_bind_group(1, bind_group, &[]);
    }

    fn material(&mut self, bind_group: &wgpu::BindGroup) {
        self.pass.set_bind_group(2, bind_group, &[]);
    }

    fn primitive(&mut self, primitive: &Primitive) {
        self.pass.set_vertex_buffer(0, primitive.vertex.slice(..));
        self.pass
            .set_index_buffer(primitive.index.slice(..), wgpu::IndexFormat::Uint32);
        self.pass.draw_indexed(0..primitive.index_count, 0, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_records_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<NodeUniforms>(), 128);
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 16);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model = Mat4::from_scale(Vec3::new(4.0, 1.0, 1.0));
        let uniforms = NodeUniforms::new(model);
        let normal = Mat4::from_cols_array_2d(&uniforms.normal);
        let n = normal.transform_vector3(Vec3::new(1.0, 1.0, 0.0));
        assert!((n - Vec3::new(0.25, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn vertex_layout_matches_mesh_data() {
        let layout = Primitive::vertex_layout();
        assert_eq!(layout.array_stride, 24);
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[1].shader_location, 1);
    }
}
