//! GPU side of the renderer: the light culling compute pass, the two
//! shading paths, and the [`Renderer`] that ties them to one set of
//! per-frame buffers.

pub mod clustered_deferred;
pub mod context;
pub mod cull;
pub mod forward_plus;
pub mod light_store;
pub mod scene;
pub mod shaders;
pub mod targets;

use anyhow::{Context, Result};
use bytemuck::bytes_of;
use glam::UVec2;
use log::{debug, info};

use crate::camera::CameraUniform;
use crate::cluster::{ClusterGrid, ClusterSet};
use crate::config::{RendererConfig, Strategy};
use crate::error::ConfigError;
use crate::light::Light;

pub use clustered_deferred::ClusteredDeferredPipeline;
pub use context::GpuContext;
pub use cull::LightCullingPass;
pub use forward_plus::ForwardPlusPipeline;
pub use light_store::LightStore;
pub use scene::{
    MaterialUniforms, MeshHandle, MeshScene, NodeUniforms, Primitive, Scene, SceneBuilder,
    SceneLayouts, SceneVisitor,
};
pub use shaders::{ShaderConstants, ShaderSources};
pub use targets::{DepthBuffer, GBuffer, GBufferTarget, OffscreenTarget};

/// Buffers bound at group 0 by every shading pipeline: camera (0), light
/// set (1) and cluster set (2).
pub(crate) struct FrameResources<'a> {
    pub camera: &'a wgpu::Buffer,
    pub lights: &'a wgpu::Buffer,
    pub clusters: &'a wgpu::Buffer,
}

impl<'a> FrameResources<'a> {
    pub fn scene_entries(&self) -> [wgpu::BindGroupEntry<'a>; 3] {
        [
            wgpu::BindGroupEntry {
                binding: 0,
                resource: self.camera.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: self.lights.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: self.clusters.as_entire_binding(),
            },
        ]
    }
}

enum ShadingPath {
    ForwardPlus(ForwardPlusPipeline),
    ClusteredDeferred(ClusteredDeferredPipeline),
}

impl ShadingPath {
    fn strategy(&self) -> Strategy {
        match self {
            Self::ForwardPlus(_) => Strategy::ForwardPlus,
            Self::ClusteredDeferred(_) => Strategy::ClusteredDeferred,
        }
    }
}

/// Owns the camera uniform, the light store, the cluster set and the active
/// shading path. Every frame runs the culling pass and then the shading
/// path in a single submission.
pub struct Renderer {
    config: RendererConfig,
    grid: ClusterGrid,
    camera_buffer: wgpu::Buffer,
    lights: LightStore,
    culling: LightCullingPass,
    layouts: SceneLayouts,
    depth: DepthBuffer,
    target_format: wgpu::TextureFormat,
    sources: ShaderSources,
    path: ShadingPath,
}

impl Renderer {
    /// Builds every GPU resource for `config`. `target_format` is the format
    /// of the views later passed to [`Renderer::render_to`], and `viewport`
    /// their size.
    pub fn new(
        ctx: &GpuContext,
        config: &RendererConfig,
        target_format: wgpu::TextureFormat,
        viewport: UVec2,
    ) -> Result<Self> {
        config.validate()?;
        let grid = ClusterGrid::from_config(config, viewport)?;

        let camera_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("camera-uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let lights = LightStore::new(ctx, config.max_lights)?;
        let sources = ShaderSources::new(&ShaderConstants::from_config(config));
        let culling = LightCullingPass::new(ctx, &config.cluster, &sources.cull, &camera_buffer, &lights)
            .context("failed to build light culling pass")?;
        let layouts = SceneLayouts::new(&ctx.device);
        let depth = DepthBuffer::new(&ctx.device, viewport);

        let path = build_path(
            ctx,
            config,
            config.strategy,
            &sources,
            &layouts,
            &FrameResources {
                camera: &camera_buffer,
                lights: lights.buffer(),
                clusters: culling.cluster_buffer(),
            },
            target_format,
            viewport,
        )
        .with_context(|| format!("failed to build {} pipeline", config.strategy.name()))?;
        info!(
            "renderer ready: {} into {target_format:?} at {}x{}",
            config.strategy.name(),
            viewport.x,
            viewport.y
        );

        Ok(Self {
            config: config.clone(),
            grid,
            camera_buffer,
            lights,
            culling,
            layouts,
            depth,
            target_format,
            sources,
            path,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn grid(&self) -> &ClusterGrid {
        &self.grid
    }

    pub fn strategy(&self) -> Strategy {
        self.path.strategy()
    }

    /// Layouts scenes must build their node and material bind groups with.
    pub fn layouts(&self) -> &SceneLayouts {
        &self.layouts
    }

    pub fn light_count(&self) -> u32 {
        self.lights.count()
    }

    /// The active G-buffer, or `None` on the forward+ path.
    pub fn gbuffer(&self) -> Option<&GBuffer> {
        match &self.path {
            ShadingPath::ForwardPlus(_) => None,
            ShadingPath::ClusteredDeferred(pipeline) => Some(pipeline.gbuffer()),
        }
    }

    /// Uploads the camera and the light set used by the next frame.
    pub fn configure(
        &mut self,
        ctx: &GpuContext,
        camera: &CameraUniform,
        lights: &[Light],
    ) -> Result<(), ConfigError> {
        self.lights.upload(&ctx.queue, lights)?;
        ctx.queue.write_buffer(&self.camera_buffer, 0, bytes_of(camera));
        Ok(())
    }

    /// Culls and shades one frame into `target`, which must match the
    /// renderer's target format and viewport.
    pub fn render_to(&self, ctx: &GpuContext, target: &wgpu::TextureView, scene: &dyn Scene) {
        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        self.culling.encode(&mut encoder);
        let clear = self.clear_color();
        match &self.path {
            ShadingPath::ForwardPlus(pipeline) => {
                pipeline.encode(&mut encoder, target, &self.depth, clear, scene)
            }
            ShadingPath::ClusteredDeferred(pipeline) => {
                pipeline.encode(&mut encoder, target, &self.depth, clear, scene)
            }
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Renders into the context's surface and presents.
    pub fn draw_frame(&self, ctx: &GpuContext, scene: &dyn Scene) -> Result<(), wgpu::SurfaceError> {
        let frame = ctx.acquire_frame()?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.render_to(ctx, &view, scene);
        frame.present();
        Ok(())
    }

    /// Reallocates every viewport-sized resource. The caller is expected to
    /// upload a camera with the same viewport before the next frame.
    pub fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) -> Result<(), ConfigError> {
        let viewport = UVec2::new(width, height);
        self.grid.resize(viewport)?;
        self.depth = DepthBuffer::new(&ctx.device, viewport);
        if let ShadingPath::ClusteredDeferred(pipeline) = &mut self.path {
            let resources = FrameResources {
                camera: &self.camera_buffer,
                lights: self.lights.buffer(),
                clusters: self.culling.cluster_buffer(),
            };
            pipeline.resize(ctx, &resources, viewport)?;
        }
        debug!("renderer resized to {width}x{height}");
        Ok(())
    }

    /// Swaps the shading path. The light store and cluster set are shared by
    /// both paths and survive the switch.
    pub fn set_strategy(&mut self, ctx: &GpuContext, strategy: Strategy) -> Result<()> {
        if strategy == self.strategy() {
            return Ok(());
        }
        self.path = build_path(
            ctx,
            &self.config,
            strategy,
            &self.sources,
            &self.layouts,
            &FrameResources {
                camera: &self.camera_buffer,
                lights: self.lights.buffer(),
                clusters: self.culling.cluster_buffer(),
            },
            self.target_format,
            self.grid.viewport(),
        )
        .with_context(|| format!("failed to build {} pipeline", strategy.name()))?;
        self.config.strategy = strategy;
        info!("switched to {}", strategy.name());
        Ok(())
    }

    /// Reads back the cluster set written by the last culling pass.
    pub fn read_cluster_set(&self, ctx: &GpuContext) -> Result<ClusterSet> {
        self.culling.read_cluster_set(ctx)
    }

    fn clear_color(&self) -> wgpu::Color {
        let [r, g, b] = self.config.lighting.background;
        wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_path(
    ctx: &GpuContext,
    config: &RendererConfig,
    strategy: Strategy,
    sources: &ShaderSources,
    layouts: &SceneLayouts,
    resources: &FrameResources<'_>,
    target_format: wgpu::TextureFormat,
    viewport: UVec2,
) -> Result<ShadingPath, ConfigError> {
    Ok(match strategy {
        Strategy::ForwardPlus => ShadingPath::ForwardPlus(ForwardPlusPipeline::new(
            ctx,
            &sources.forward_plus,
            layouts,
            resources,
            target_format,
        )),
        Strategy::ClusteredDeferred => ShadingPath::ClusteredDeferred(ClusteredDeferredPipeline::new(
            ctx,
            (&sources.gbuffer, &sources.deferred_lighting),
            layouts,
            resources,
            &config.gbuffer,
            target_format,
            viewport,
        )?),
    })
}
