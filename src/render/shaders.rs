//! WGSL sources for the culling pass and both shading paths.
//!
//! Grid dimensions, per-cluster capacity, the depth split and the ambient
//! term are rendered into every module from one [`ShaderConstants`], so a
//! shading pass can never index the cluster set with a mapping that differs
//! from the one the culling pass used. The functions in the prelude mirror
//! `crate::cluster` and `crate::shading` operation for operation.

use crate::cluster::DepthSplit;
use crate::config::RendererConfig;

/// Values baked into the generated WGSL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaderConstants {
    pub dims: [u32; 3],
    pub max_lights_per_cluster: u32,
    pub depth_split: DepthSplit,
    pub ambient: [f32; 3],
}

impl ShaderConstants {
    pub fn from_config(config: &RendererConfig) -> Self {
        Self {
            dims: config.cluster.dims,
            max_lights_per_cluster: config.cluster.max_lights_per_cluster,
            depth_split: config.cluster.depth_split,
            ambient: config.lighting.ambient,
        }
    }
}

/// Workgroup edge of the culling dispatch; one invocation per cluster.
pub const CULL_WORKGROUP_SIZE: u32 = 4;

/// Entry points shared by every module that has them.
pub const VERTEX_ENTRY: &str = "vs_main";
pub const FRAGMENT_ENTRY: &str = "fs_main";
pub const CULL_ENTRY: &str = "cull_main";

/// Generated sources for every pipeline the renderer builds.
#[derive(Debug, Clone)]
pub struct ShaderSources {
    pub cull: String,
    pub forward_plus: String,
    pub gbuffer: String,
    pub deferred_lighting: String,
}

impl ShaderSources {
    pub fn new(constants: &ShaderConstants) -> Self {
        let prelude = prelude(constants);
        Self {
            cull: [prelude.as_str(), CULL].concat(),
            forward_plus: [
                prelude.as_str(),
                FORWARD_PLUS_BINDINGS,
                NODE_AND_MATERIAL,
                LIGHTING,
                GEOMETRY_VERTEX,
                FORWARD_PLUS_FRAGMENT,
            ]
            .concat(),
            gbuffer: [
                prelude.as_str(),
                GBUFFER_BINDINGS,
                NODE_AND_MATERIAL,
                GEOMETRY_VERTEX,
                GBUFFER_FRAGMENT,
            ]
            .concat(),
            deferred_lighting: [prelude.as_str(), DEFERRED_LIGHTING_BINDINGS, LIGHTING, DEFERRED_LIGHTING]
                .concat(),
        }
    }
}

fn prelude(constants: &ShaderConstants) -> String {
    let [x, y, z] = constants.dims;
    let [r, g, b] = constants.ambient;
    let max = constants.max_lights_per_cluster;
    let split = match constants.depth_split {
        DepthSplit::Logarithmic => LOGARITHMIC_SPLIT,
        DepthSplit::Linear => LINEAR_SPLIT,
    };
    format!(
        "const CLUSTER_DIMS: vec3<u32> = vec3<u32>({x}u, {y}u, {z}u);\n\
         const MAX_LIGHTS_PER_CLUSTER: u32 = {max}u;\n\
         const AMBIENT: vec3<f32> = vec3<f32>({r:?}, {g:?}, {b:?});\n\
         \n\
         struct Cluster {{\n    light_count: u32,\n    indices: array<u32, {max}u>,\n}}\n\
         {COMMON}{split}{MAPPING}"
    )
}

const COMMON: &str = r#"
struct ClusterSet {
    clusters: array<Cluster>,
}

struct CameraUniforms {
    view_proj: mat4x4<f32>,
    inv_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    viewport_width: f32,
    viewport_height: f32,
    near_plane: f32,
    far_plane: f32,
}

struct Light {
    position: vec3<f32>,
    radius: f32,
    color: vec3<f32>,
}

struct LightSet {
    num_lights: u32,
    lights: array<Light>,
}

fn range_attenuation(distance: f32, radius: f32) -> f32 {
    let ratio = distance / radius;
    let ratio2 = ratio * ratio;
    return clamp(1.0 - ratio2 * ratio2, 0.0, 1.0) / max(distance * distance, 1e-4);
}

fn light_contribution(light: Light, light_position: vec3<f32>, surface_position: vec3<f32>, normal: vec3<f32>) -> vec3<f32> {
    let to_light = light_position - surface_position;
    let distance = length(to_light);
    let direction = to_light / max(distance, 1e-4);
    let lambert = max(dot(normal, direction), 0.0);
    return light.color * lambert * range_attenuation(distance, light.radius);
}
"#;

const LOGARITHMIC_SPLIT: &str = r#"
fn slice_depth(slice_index: u32, near: f32, far: f32) -> f32 {
    let t = f32(slice_index) / f32(CLUSTER_DIMS.z);
    return near * pow(far / near, t);
}

fn slice_fraction(view_depth: f32, near: f32, far: f32) -> f32 {
    return log(max(view_depth, near) / near) / log(far / near);
}
"#;

const LINEAR_SPLIT: &str = r#"
fn slice_depth(slice_index: u32, near: f32, far: f32) -> f32 {
    let t = f32(slice_index) / f32(CLUSTER_DIMS.z);
    return near + (far - near) * t;
}

fn slice_fraction(view_depth: f32, near: f32, far: f32) -> f32 {
    return (view_depth - near) / (far - near);
}
"#;

const MAPPING: &str = r#"
fn depth_slice(view_depth: f32, near: f32, far: f32) -> u32 {
    let slice_index = max(floor(slice_fraction(view_depth, near, far) * f32(CLUSTER_DIMS.z)), 0.0);
    return min(u32(slice_index), CLUSTER_DIMS.z - 1u);
}

fn cluster_tile(frag_coord: vec2<f32>, viewport: vec2<f32>) -> vec2<u32> {
    let u = frag_coord.x / viewport.x;
    let v = 1.0 - frag_coord.y / viewport.y;
    let x = min(u32(max(floor(u * f32(CLUSTER_DIMS.x)), 0.0)), CLUSTER_DIMS.x - 1u);
    let y = min(u32(max(floor(v * f32(CLUSTER_DIMS.y)), 0.0)), CLUSTER_DIMS.y - 1u);
    return vec2<u32>(x, y);
}

fn cluster_linear_index(coords: vec3<u32>) -> u32 {
    return coords.x + CLUSTER_DIMS.x * (coords.y + CLUSTER_DIMS.y * coords.z);
}

fn cluster_index(frag_coord: vec2<f32>, view_depth: f32, viewport: vec2<f32>, near: f32, far: f32) -> u32 {
    let tile = cluster_tile(frag_coord, viewport);
    return cluster_linear_index(vec3<u32>(tile, depth_slice(view_depth, near, far)));
}
"#;

const CULL: &str = r#"
@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(0) @binding(1) var<storage, read> light_set: LightSet;
@group(0) @binding(2) var<storage, read_write> cluster_set: ClusterSet;

fn unproject_ray(ndc: vec2<f32>) -> vec3<f32> {
    let point = camera.inv_proj * vec4<f32>(ndc, 1.0, 1.0);
    return point.xyz / point.w;
}

@compute @workgroup_size(4, 4, 4)
fn cull_main(@builtin(global_invocation_id) id: vec3<u32>) {
    if (any(id >= CLUSTER_DIMS)) {
        return;
    }

    let dims = vec2<f32>(CLUSTER_DIMS.xy);
    let ndc_min = vec2<f32>(id.xy) / dims * 2.0 - 1.0;
    let ndc_max = vec2<f32>(id.xy + vec2<u32>(1u, 1u)) / dims * 2.0 - 1.0;
    let near_depth = slice_depth(id.z, camera.near_plane, camera.far_plane);
    let far_depth = slice_depth(id.z + 1u, camera.near_plane, camera.far_plane);

    var min_point = vec3<f32>(3.4e38);
    var max_point = vec3<f32>(-3.4e38);
    for (var corner = 0u; corner < 4u; corner++) {
        let ndc = vec2<f32>(
            select(ndc_min.x, ndc_max.x, (corner & 1u) != 0u),
            select(ndc_min.y, ndc_max.y, (corner & 2u) != 0u),
        );
        let ray = unproject_ray(ndc);
        let near_point = ray * (near_depth / -ray.z);
        let far_point = ray * (far_depth / -ray.z);
        min_point = min(min_point, min(near_point, far_point));
        max_point = max(max_point, max(near_point, far_point));
    }

    let cluster = cluster_linear_index(id);
    var light_count = 0u;
    for (var i = 0u; i < light_set.num_lights; i++) {
        let light = light_set.lights[i];
        let center = (camera.view * vec4<f32>(light.position, 1.0)).xyz;
        let offset = min(max(center, min_point), max_point) - center;
        if (dot(offset, offset) <= light.radius * light.radius) {
            if (light_count == MAX_LIGHTS_PER_CLUSTER) {
                break;
            }
            cluster_set.clusters[cluster].indices[light_count] = i;
            light_count++;
        }
    }
    cluster_set.clusters[cluster].light_count = light_count;
}
"#;

const LIGHTING: &str = r#"
fn shade_clustered(frag_coord: vec2<f32>, position: vec3<f32>, normal: vec3<f32>, albedo: vec3<f32>) -> vec3<f32> {
    let viewport = vec2<f32>(camera.viewport_width, camera.viewport_height);
    let cluster = cluster_index(frag_coord, -position.z, viewport, camera.near_plane, camera.far_plane);
    let light_count = min(cluster_set.clusters[cluster].light_count, MAX_LIGHTS_PER_CLUSTER);
    let n = normalize(normal);
    var total = vec3<f32>(0.0);
    for (var i = 0u; i < light_count; i++) {
        let light = light_set.lights[cluster_set.clusters[cluster].indices[i]];
        let light_position = (camera.view * vec4<f32>(light.position, 1.0)).xyz;
        total += light_contribution(light, light_position, position, n);
    }
    return albedo * (AMBIENT + total);
}
"#;

const NODE_AND_MATERIAL: &str = r#"
struct NodeUniforms {
    model: mat4x4<f32>,
    normal: mat4x4<f32>,
}

struct MaterialUniforms {
    albedo: vec4<f32>,
}

@group(1) @binding(0) var<uniform> node: NodeUniforms;
@group(2) @binding(0) var<uniform> material: MaterialUniforms;
"#;

const FORWARD_PLUS_BINDINGS: &str = r#"
@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(0) @binding(1) var<storage, read> light_set: LightSet;
@group(0) @binding(2) var<storage, read> cluster_set: ClusterSet;
"#;

const GBUFFER_BINDINGS: &str = r#"
@group(0) @binding(0) var<uniform> camera: CameraUniforms;
"#;

const GEOMETRY_VERTEX: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) view_position: vec3<f32>,
    @location(1) view_normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = node.model * vec4<f32>(input.position, 1.0);
    let world_normal = node.normal * vec4<f32>(input.normal, 0.0);
    out.clip_position = camera.view_proj * world_position;
    out.view_position = (camera.view * world_position).xyz;
    out.view_normal = (camera.view * world_normal).xyz;
    return out;
}
"#;

const FORWARD_PLUS_FRAGMENT: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let color = shade_clustered(input.clip_position.xy, input.view_position, input.view_normal, material.albedo.rgb);
    return vec4<f32>(color, 1.0);
}
"#;

const GBUFFER_FRAGMENT: &str = r#"
struct GBufferOutput {
    @location(0) position: vec4<f32>,
    @location(1) albedo: vec4<f32>,
    @location(2) normal: vec4<f32>,
}

@fragment
fn fs_main(input: VertexOutput) -> GBufferOutput {
    var out: GBufferOutput;
    out.position = vec4<f32>(input.view_position, 1.0);
    out.albedo = vec4<f32>(material.albedo.rgb, 1.0);
    out.normal = vec4<f32>(normalize(input.view_normal), 0.0);
    return out;
}
"#;

const DEFERRED_LIGHTING_BINDINGS: &str = r#"
@group(0) @binding(0) var<uniform> camera: CameraUniforms;
@group(0) @binding(1) var<storage, read> light_set: LightSet;
@group(0) @binding(2) var<storage, read> cluster_set: ClusterSet;
@group(0) @binding(3) var gbuffer_position: texture_2d<f32>;
@group(0) @binding(4) var gbuffer_albedo: texture_2d<f32>;
@group(0) @binding(5) var gbuffer_normal: texture_2d<f32>;
"#;

const DEFERRED_LIGHTING: &str = r#"
// One triangle covering the screen, on the far plane so the depth test
// (greater) keeps only pixels the geometry pass wrote.
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return vec4<f32>(uv * 2.0 - 1.0, 1.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {
    let pixel = vec2<i32>(floor(frag_coord.xy));
    let position = textureLoad(gbuffer_position, pixel, 0).xyz;
    let albedo = textureLoad(gbuffer_albedo, pixel, 0).rgb;
    let normal = textureLoad(gbuffer_normal, pixel, 0).xyz;
    return vec4<f32>(shade_clustered(frag_coord.xy, position, normal, albedo), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(split: DepthSplit) -> ShaderSources {
        let mut config = RendererConfig::default();
        config.cluster.dims = [8, 4, 12];
        config.cluster.max_lights_per_cluster = 32;
        config.cluster.depth_split = split;
        config.lighting.ambient = [0.1, 0.2, 0.25];
        ShaderSources::new(&ShaderConstants::from_config(&config))
    }

    #[test]
    fn constants_are_rendered_into_every_module() {
        let sources = sources(DepthSplit::Logarithmic);
        for source in [
            &sources.cull,
            &sources.forward_plus,
            &sources.gbuffer,
            &sources.deferred_lighting,
        ] {
            assert!(source.contains("vec3<u32>(8u, 4u, 12u)"));
            assert!(source.contains("MAX_LIGHTS_PER_CLUSTER: u32 = 32u"));
            assert!(source.contains("array<u32, 32u>"));
            assert!(source.contains("vec3<f32>(0.1, 0.2, 0.25)"));
            assert!(source.contains("fn cluster_index("));
        }
    }

    #[test]
    fn split_policy_selects_slice_functions() {
        let log = sources(DepthSplit::Logarithmic);
        assert!(log.cull.contains("pow(far / near, t)"));
        assert!(log.forward_plus.contains("log(max(view_depth, near) / near)"));

        let linear = sources(DepthSplit::Linear);
        assert!(!linear.cull.contains("pow("));
        assert!(linear.deferred_lighting.contains("(view_depth - near) / (far - near)"));
    }

    #[test]
    fn modules_have_expected_entry_points() {
        let sources = sources(DepthSplit::Logarithmic);
        assert!(sources.cull.contains("@compute @workgroup_size(4, 4, 4)"));
        assert!(sources.cull.contains(&format!("fn {CULL_ENTRY}(")));
        for source in [&sources.forward_plus, &sources.gbuffer, &sources.deferred_lighting] {
            assert!(source.contains(&format!("fn {VERTEX_ENTRY}(")));
            assert!(source.contains(&format!("fn {FRAGMENT_ENTRY}(")));
        }
    }

    #[test]
    fn lighting_loop_only_in_shading_modules() {
        let sources = sources(DepthSplit::Logarithmic);
        assert!(sources.forward_plus.contains("fn shade_clustered("));
        assert!(sources.deferred_lighting.contains("fn shade_clustered("));
        assert!(!sources.gbuffer.contains("fn shade_clustered("));
        assert!(!sources.cull.contains("fn shade_clustered("));
        assert!(!sources.gbuffer.contains("light_set"));
    }
}
