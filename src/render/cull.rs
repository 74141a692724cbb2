use std::num::NonZeroU64;

use anyhow::{Context, Result};
use glam::UVec3;
use log::info;

use crate::camera::CameraUniform;
use crate::cluster::ClusterSet;
use crate::config::ClusterConfig;
use crate::error::ConfigError;

use super::context::GpuContext;
use super::light_store::LightStore;
use super::shaders::{CULL_ENTRY, CULL_WORKGROUP_SIZE};
use super::targets::map_buffer;

/// Compute pass that rebuilds the cluster-set buffer every frame. One
/// invocation per cluster; each owns a disjoint record of the output.
pub struct LightCullingPass {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    clusters: wgpu::Buffer,
    dims: UVec3,
    max_lights_per_cluster: u32,
}

impl LightCullingPass {
    pub fn new(
        ctx: &GpuContext,
        cluster: &ClusterConfig,
        source: &str,
        camera: &wgpu::Buffer,
        lights: &LightStore,
    ) -> Result<Self> {
        cluster.validate()?;
        let cluster_count = cluster.cluster_count();
        let size = ClusterSet::buffer_size(cluster_count, cluster.max_lights_per_cluster);
        let limit = ctx.storage_binding_limit();
        if size > limit {
            return Err(ConfigError::BufferTooLarge {
                buffer: "cluster set",
                required: size,
                limit,
            }
            .into());
        }

        let device = &ctx.device;
        let clusters = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster-set"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cull-bind-layout"),
            entries: &[
                camera_entry(0, wgpu::ShaderStages::COMPUTE),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, false),
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cull-bind-group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: lights.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: clusters.as_entire_binding(),
                },
            ],
        });

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cull-shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cull-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cull-pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(CULL_ENTRY),
            compilation_options: Default::default(),
            cache: None,
        });

        let [x, y, z] = cluster.dims;
        info!(
            "cluster grid {x}x{y}x{z} ({cluster_count} clusters, {} lights each, {size} bytes)",
            cluster.max_lights_per_cluster
        );
        Ok(Self {
            pipeline,
            bind_group,
            clusters,
            dims: UVec3::from_array(cluster.dims),
            max_lights_per_cluster: cluster.max_lights_per_cluster,
        })
    }

    pub fn cluster_buffer(&self) -> &wgpu::Buffer {
        &self.clusters
    }

    pub fn cluster_count(&self) -> u32 {
        self.dims.x * self.dims.y * self.dims.z
    }

    /// Workgroups needed to give every cluster one invocation.
    pub fn workgroups(&self) -> UVec3 {
        (self.dims + UVec3::splat(CULL_WORKGROUP_SIZE - 1)) / CULL_WORKGROUP_SIZE
    }

    /// Records the culling dispatch. Later passes in the same submission
    /// see the finished cluster set.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let groups = self.workgroups();
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("light-culling"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(groups.x, groups.y, groups.z);
    }

    /// Copies the cluster set back to the host. Diagnostic only; stalls
    /// until the GPU is idle.
    pub fn read_cluster_set(&self, ctx: &GpuContext) -> Result<ClusterSet> {
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster-set-readback"),
            size: self.clusters.size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("cluster-set-readback-encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.clusters, 0, &staging, 0, self.clusters.size());
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let bytes = map_buffer(ctx, &staging).context("failed to read back cluster set")?;
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|word| u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
            .collect();
        Ok(ClusterSet::from_words(
            &words,
            self.cluster_count(),
            self.max_lights_per_cluster,
        ))
    }
}

pub(crate) fn camera_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(std::mem::size_of::<CameraUniform>() as u64),
        },
        count: None,
    }
}

pub(crate) fn storage_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
