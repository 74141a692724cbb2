use glam::UVec2;
use log::debug;

use crate::config::GBufferConfig;
use crate::error::ConfigError;

use super::context::GpuContext;
use super::cull::{camera_entry, storage_entry};
use super::scene::{DrawVisitor, Primitive, Scene, SceneLayouts};
use super::shaders::{FRAGMENT_ENTRY, VERTEX_ENTRY};
use super::targets::{DepthBuffer, GBuffer};
use super::FrameResources;

/// Geometry pass into the G-buffer, then a full-screen lighting pass that
/// shades each covered pixel once with the same cluster lookup as forward+.
pub struct ClusteredDeferredPipeline {
    geometry_pipeline: wgpu::RenderPipeline,
    geometry_bind_group: wgpu::BindGroup,
    lighting_pipeline: wgpu::RenderPipeline,
    lighting_layout: wgpu::BindGroupLayout,
    lighting_bind_group: wgpu::BindGroup,
    gbuffer_config: GBufferConfig,
    gbuffer: GBuffer,
}

impl ClusteredDeferredPipeline {
    pub(crate) fn new(
        ctx: &GpuContext,
        sources: (&str, &str),
        layouts: &SceneLayouts,
        resources: &FrameResources<'_>,
        gbuffer_config: &GBufferConfig,
        target_format: wgpu::TextureFormat,
        size: UVec2,
    ) -> Result<Self, ConfigError> {
        let (geometry_source, lighting_source) = sources;
        let gbuffer = GBuffer::new(ctx, gbuffer_config, size)?;
        let device = &ctx.device;

        let geometry_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gbuffer-scene-layout"),
            entries: &[camera_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let geometry_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer-scene-bind-group"),
            layout: &geometry_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: resources.camera.as_entire_binding(),
            }],
        });
        let geometry_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gbuffer-shader"),
            source: wgpu::ShaderSource::Wgsl(geometry_source.into()),
        });
        let gbuffer_targets: Vec<Option<wgpu::ColorTargetState>> = gbuffer
            .formats()
            .into_iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let geometry_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gbuffer-pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("gbuffer-pipeline-layout"),
                bind_group_layouts: &[&geometry_layout, &layouts.node, &layouts.material],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &geometry_module,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[Primitive::vertex_layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &geometry_module,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &gbuffer_targets,
            }),
            multiview: None,
            cache: None,
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let lighting_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("deferred-lighting-layout"),
            entries: &[
                camera_entry(0, wgpu::ShaderStages::FRAGMENT),
                storage_entry(1, wgpu::ShaderStages::FRAGMENT, true),
                storage_entry(2, wgpu::ShaderStages::FRAGMENT, true),
                texture_entry(3),
                texture_entry(4),
                texture_entry(5),
            ],
        });
        let lighting_bind_group = lighting_bind_group(device, &lighting_layout, resources, &gbuffer);
        let lighting_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("deferred-lighting-shader"),
            source: wgpu::ShaderSource::Wgsl(lighting_source.into()),
        });
        let lighting_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("deferred-lighting-pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("deferred-lighting-pipeline-layout"),
                bind_group_layouts: &[&lighting_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &lighting_module,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            // The full-screen triangle sits on the far plane; only pixels
            // whose stored depth is nearer pass.
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Greater,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &lighting_module,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            geometry_pipeline,
            geometry_bind_group,
            lighting_pipeline,
            lighting_layout,
            lighting_bind_group,
            gbuffer_config: gbuffer_config.clone(),
            gbuffer,
        })
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// Reallocates the G-buffer at the new size and rebinds it.
    pub(crate) fn resize(
        &mut self,
        ctx: &GpuContext,
        resources: &FrameResources<'_>,
        size: UVec2,
    ) -> Result<(), ConfigError> {
        self.gbuffer = GBuffer::new(ctx, &self.gbuffer_config, size)?;
        self.lighting_bind_group =
            lighting_bind_group(&ctx.device, &self.lighting_layout, resources, &self.gbuffer);
        debug!("g-buffer reallocated at {}x{}", size.x, size.y);
        Ok(())
    }

    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        depth: &DepthBuffer,
        clear: wgpu::Color,
        scene: &dyn Scene,
    ) {
        let cleared = |view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })
        };
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gbuffer-pass"),
                color_attachments: &[
                    cleared(&self.gbuffer.position.view),
                    cleared(&self.gbuffer.albedo.view),
                    cleared(&self.gbuffer.normal.view),
                ],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.geometry_pipeline);
            pass.set_bind_group(0, &self.geometry_bind_group, &[]);
            scene.iterate(&mut DrawVisitor { pass: &mut pass });
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("deferred-lighting-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.lighting_pipeline);
        pass.set_bind_group(0, &self.lighting_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

fn lighting_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    resources: &FrameResources<'_>,
    gbuffer: &GBuffer,
) -> wgpu::BindGroup {
    let [camera, lights, clusters] = resources.scene_entries();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("deferred-lighting-bind-group"),
        layout,
        entries: &[
            camera,
            lights,
            clusters,
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&gbuffer.position.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::TextureView(&gbuffer.albedo.view),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::TextureView(&gbuffer.normal.view),
            },
        ],
    })
}
