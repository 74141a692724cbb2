//! GPU tests. The headless context falls back to a software adapter; each
//! test still returns early, with a note on stderr, when neither exists.

use glam::UVec2;
use pollster::block_on;

use clustered_shading::render::MeshScene;
use clustered_shading::{
    cull_lights, Camera, ClusterGrid, ClusterSet, GpuContext, LightField, OffscreenTarget,
    Renderer, RendererConfig, SceneBuilder, Strategy,
};

fn context() -> Option<GpuContext> {
    match block_on(GpuContext::headless()) {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("skipping GPU test: {err:#}");
            None
        }
    }
}

/// Fraction of clusters whose light lists are identical. Lights that only
/// graze a cluster boundary may round differently on the device.
fn agreement(gpu: &ClusterSet, host: &ClusterSet) -> f64 {
    assert_eq!(gpu.cluster_count(), host.cluster_count());
    let matching = (0..host.cluster_count())
        .filter(|cluster| gpu.lights(*cluster) == host.lights(*cluster))
        .count();
    matching as f64 / host.cluster_count() as f64
}

fn empty_scene(ctx: &GpuContext, renderer: &Renderer) -> MeshScene {
    SceneBuilder::new(ctx, renderer.layouts()).build()
}

#[test]
fn gpu_culling_matches_host_culling() {
    let Some(ctx) = context() else { return };
    let config = RendererConfig::default();
    let viewport = UVec2::new(320, 180);
    let mut renderer =
        Renderer::new(&ctx, &config, OffscreenTarget::FORMAT, viewport).expect("renderer");
    let target = OffscreenTarget::new(&ctx.device, viewport);
    let scene = empty_scene(&ctx, &renderer);

    let camera = Camera::new(&config.camera, viewport).uniform();
    let lights = LightField::demo(300);
    renderer
        .configure(&ctx, &camera, lights.lights())
        .expect("lights fit");
    renderer.render_to(&ctx, &target.view, &scene);
    let gpu = renderer.read_cluster_set(&ctx).expect("readback");

    let host = cull_lights(
        renderer.grid(),
        &camera,
        lights.lights(),
        config.cluster.max_lights_per_cluster,
    );
    assert!(host.stats().non_empty > 0);
    let ratio = agreement(&gpu, &host);
    assert!(ratio > 0.99, "only {ratio} of clusters agree");
    for cluster in 0..gpu.cluster_count() {
        assert!(gpu.light_count(cluster) <= config.cluster.max_lights_per_cluster);
        assert!(gpu
            .lights(cluster)
            .iter()
            .all(|index| (*index as usize) < lights.len()));
    }
}

#[test]
fn gpu_culling_with_zero_lights_leaves_every_cluster_empty() {
    let Some(ctx) = context() else { return };
    let config = RendererConfig::default();
    let viewport = UVec2::new(64, 64);
    let mut renderer =
        Renderer::new(&ctx, &config, OffscreenTarget::FORMAT, viewport).expect("renderer");
    let target = OffscreenTarget::new(&ctx.device, viewport);
    let scene = empty_scene(&ctx, &renderer);

    let camera = Camera::new(&config.camera, viewport).uniform();
    renderer.configure(&ctx, &camera, &[]).expect("no lights");
    renderer.render_to(&ctx, &target.view, &scene);
    let gpu = renderer.read_cluster_set(&ctx).expect("readback");
    assert_eq!(gpu.stats().non_empty, 0);
}

#[test]
fn gpu_culling_follows_resize() {
    let Some(ctx) = context() else { return };
    let config = RendererConfig::default();
    let mut renderer = Renderer::new(&ctx, &config, OffscreenTarget::FORMAT, UVec2::new(320, 180))
        .expect("renderer");

    let viewport = UVec2::new(150, 240);
    renderer
        .resize(&ctx, viewport.x, viewport.y)
        .expect("resize");
    assert_eq!(renderer.grid().viewport(), viewport);
    let target = OffscreenTarget::new(&ctx.device, viewport);
    let scene = empty_scene(&ctx, &renderer);

    let camera = Camera::new(&config.camera, viewport).uniform();
    let lights = LightField::demo(200);
    renderer
        .configure(&ctx, &camera, lights.lights())
        .expect("lights fit");
    renderer.render_to(&ctx, &target.view, &scene);
    let gpu = renderer.read_cluster_set(&ctx).expect("readback");

    let grid = ClusterGrid::from_config(&config, viewport).expect("grid");
    let host = cull_lights(&grid, &camera, lights.lights(), config.cluster.max_lights_per_cluster);
    let ratio = agreement(&gpu, &host);
    assert!(ratio > 0.99, "only {ratio} of clusters agree after resize");
}

#[test]
fn deferred_resize_doubles_the_gbuffer() {
    let Some(ctx) = context() else { return };
    let config = RendererConfig {
        strategy: Strategy::ClusteredDeferred,
        ..RendererConfig::default()
    };
    let initial = UVec2::new(160, 90);
    let mut renderer = match Renderer::new(&ctx, &config, OffscreenTarget::FORMAT, initial) {
        Ok(renderer) => renderer,
        Err(err) => {
            eprintln!("skipping deferred resize: {err:#}");
            return;
        }
    };
    let gbuffer = renderer.gbuffer().expect("deferred path owns a g-buffer");
    assert_eq!(gbuffer.size(), initial);

    let doubled = initial * 2;
    renderer
        .resize(&ctx, doubled.x, doubled.y)
        .expect("resize");
    assert_eq!(renderer.grid().viewport(), doubled);
    let gbuffer = renderer.gbuffer().expect("deferred path owns a g-buffer");
    assert_eq!(gbuffer.size(), doubled);
    assert!([&gbuffer.position, &gbuffer.albedo, &gbuffer.normal]
        .iter()
        .all(|target| target.size() == doubled));

    let target = OffscreenTarget::new(&ctx.device, doubled);
    let scene = MeshScene::demo(&ctx, renderer.layouts());
    let camera = Camera::new(&config.camera, doubled).uniform();
    let lights = LightField::demo(250);
    renderer
        .configure(&ctx, &camera, lights.lights())
        .expect("lights fit");
    renderer.render_to(&ctx, &target.view, &scene);
    let gpu = renderer.read_cluster_set(&ctx).expect("readback");

    let grid = ClusterGrid::from_config(&config, doubled).expect("grid");
    let host = cull_lights(&grid, &camera, lights.lights(), config.cluster.max_lights_per_cluster);
    let ratio = agreement(&gpu, &host);
    assert!(ratio > 0.99, "only {ratio} of clusters agree after resize");
    for cluster in 0..gpu.cluster_count() {
        assert!(gpu.light_count(cluster) <= config.cluster.max_lights_per_cluster);
        assert!(gpu
            .lights(cluster)
            .iter()
            .all(|index| (*index as usize) < lights.len()));
    }
    let pixels = target.read_pixels(&ctx).expect("deferred readback");
    assert_eq!(pixels.len(), (doubled.x * doubled.y) as usize);
    assert!(pixels.iter().any(|pixel| pixel[..3] != [0, 0, 0]));

    renderer
        .set_strategy(&ctx, Strategy::ForwardPlus)
        .expect("forward+ path");
    assert!(renderer.gbuffer().is_none());
}

#[test]
fn forward_plus_and_deferred_images_match() {
    let Some(ctx) = context() else { return };
    let config = RendererConfig::default();
    let viewport = UVec2::new(256, 144);
    let mut renderer =
        Renderer::new(&ctx, &config, OffscreenTarget::FORMAT, viewport).expect("renderer");
    let target = OffscreenTarget::new(&ctx.device, viewport);
    let scene = MeshScene::demo(&ctx, renderer.layouts());

    let camera = Camera::new(&config.camera, viewport).uniform();
    let lights = LightField::demo(400);
    renderer
        .configure(&ctx, &camera, lights.lights())
        .expect("lights fit");

    renderer.render_to(&ctx, &target.view, &scene);
    let forward = target.read_pixels(&ctx).expect("forward readback");

    if let Err(err) = renderer.set_strategy(&ctx, Strategy::ClusteredDeferred) {
        eprintln!("skipping deferred comparison: {err:#}");
        return;
    }
    assert_eq!(renderer.strategy(), Strategy::ClusteredDeferred);
    renderer.render_to(&ctx, &target.view, &scene);
    let deferred = target.read_pixels(&ctx).expect("deferred readback");

    assert_eq!(forward.len(), deferred.len());
    // Half-float albedo and normals may move a channel by a few steps.
    let differing = forward
        .iter()
        .zip(&deferred)
        .filter(|(a, b)| {
            a.iter()
                .zip(b.iter())
                .any(|(x, y)| x.abs_diff(*y) > 3)
        })
        .count();
    assert!(
        differing * 100 <= forward.len(),
        "{differing} of {} pixels differ",
        forward.len()
    );
    assert!(forward.iter().any(|pixel| pixel[..3] != [0, 0, 0]));
}

#[test]
fn too_many_lights_are_rejected() {
    let Some(ctx) = context() else { return };
    let config = RendererConfig {
        max_lights: 4,
        ..RendererConfig::default()
    };
    let viewport = UVec2::new(32, 32);
    let mut renderer =
        Renderer::new(&ctx, &config, OffscreenTarget::FORMAT, viewport).expect("renderer");
    let camera = Camera::new(&config.camera, viewport).uniform();
    let lights = LightField::demo(5);
    assert!(renderer.configure(&ctx, &camera, lights.lights()).is_err());
    assert_eq!(renderer.light_count(), 0);
}
