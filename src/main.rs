use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use glam::{UVec2, Vec2};
use log::{info, warn};
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, ElementState, Event, KeyEvent, MouseButton as WinitMouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget};
use winit::keyboard::{KeyCode as WinitKey, PhysicalKey};
use winit::window::WindowBuilder;

use clustered_shading::{
    cull_lights, Camera, ClusterGrid, ConfigError, GpuContext, InputState, KeyCode, LightField,
    MeshData, MeshScene, MouseButton, NamedKey, Renderer, RendererConfig, Strategy,
};

const DEFAULT_LIGHTS: usize = 500;
const SUMMARY_VIEWPORT: UVec2 = UVec2::new(1280, 720);

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let mut config = match &options.config {
        Some(path) => RendererConfig::load(path)?,
        None => RendererConfig::default(),
    };
    if let Some(strategy) = options.strategy {
        config.strategy = strategy;
    }
    if options.lights > config.max_lights as usize {
        return Err(ConfigError::LightCapacityExceeded {
            count: options.lights,
            capacity: config.max_lights,
        }
        .into());
    }
    let lights = LightField::demo(options.lights);
    let prop = match &options.mesh {
        Some(path) => {
            let mut mesh = MeshData::load(path)?;
            mesh.fit_unit_cube();
            mesh
        }
        None => MeshData::cube(),
    };

    if options.summary_only {
        return print_summary(&config, &lights, &prop);
    }
    match run_interactive(config.clone(), lights.clone(), &prop) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                print_summary(&config, &lights, &prop)
            } else {
                Err(err)
            }
        }
    }
}

/// Culls the demo lights on the host from the starting camera and prints
/// the cluster occupancy.
fn print_summary(config: &RendererConfig, lights: &LightField, prop: &MeshData) -> Result<()> {
    let camera = Camera::new(&config.camera, SUMMARY_VIEWPORT);
    let grid = ClusterGrid::from_config(config, SUMMARY_VIEWPORT)?;
    let clusters = cull_lights(
        &grid,
        &camera.uniform(),
        lights.lights(),
        config.cluster.max_lights_per_cluster,
    );
    let stats = clusters.stats();
    let dims = grid.dims();

    println!("Strategy: {}", config.strategy.name());
    println!(
        "Cluster grid: {}x{}x{} ({} clusters, {} lights per cluster, {:?} split)",
        dims.x,
        dims.y,
        dims.z,
        grid.cluster_count(),
        config.cluster.max_lights_per_cluster,
        grid.depth_split()
    );
    println!("Lights: {}", lights.len());
    println!("Non-empty clusters: {}", stats.non_empty);
    println!("Max lights in a cluster: {}", stats.max_lights);
    println!("Light references: {}", stats.total_references);
    println!("Dropped references: {}", stats.dropped);
    println!(
        "Prop mesh: {} vertices, {} triangles",
        prop.vertex_count(),
        prop.triangle_count()
    );
    Ok(())
}

fn run_interactive(config: RendererConfig, lights: LightField, prop: &MeshData) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Clustered Shading")
            .with_inner_size(LogicalSize::new(1280.0, 720.0))
            .build(&event_loop)
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let ctx = block_on(GpuContext::windowed(Arc::clone(&window)))?;
    let format = ctx
        .surface_format()
        .context("windowed context has no surface")?;
    let viewport = ctx
        .surface_size()
        .context("windowed context has no surface")?;
    let renderer = Renderer::new(&ctx, &config, format, viewport)?;
    let scene = MeshScene::demo_with_prop(&ctx, renderer.layouts(), prop);
    info!(
        "demo scene with {} nodes and {} lights",
        scene.node_count(),
        lights.len()
    );

    let mut app = AppState {
        camera: Camera::new(&config.camera, viewport),
        ctx,
        renderer,
        scene,
        lights,
        input: InputState::new(),
        last_frame: Instant::now(),
        last_error: None,
    };

    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop
        .run(|event, elwt| {
            if let Err(err) = app.process_event(event, elwt) {
                app.last_error = Some(err);
                elwt.exit();
            }
        })
        .context("event loop terminated abnormally")?;

    match app.last_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

struct AppState {
    ctx: GpuContext,
    renderer: Renderer,
    scene: MeshScene,
    camera: Camera,
    lights: LightField,
    input: InputState,
    last_frame: Instant,
    last_error: Option<anyhow::Error>,
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

impl AppState {
    fn process_event(&mut self, event: Event<()>, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(size) => self.resize(size.width, size.height)?,
                WindowEvent::Focused(false) => self.input.clear(),
                WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event, elwt)?,
                WindowEvent::MouseInput { state, button, .. } => {
                    self.handle_mouse_button(state, button)
                }
                WindowEvent::RedrawRequested => self.redraw()?,
                _ => {}
            },
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                self.input
                    .add_mouse_motion(Vec2::new(delta.0 as f32, delta.1 as f32));
            }
            Event::AboutToWait => {
                if let Some(window) = self.ctx.window() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let now = Instant::now();
        let delta_ms = now.duration_since(self.last_frame).as_secs_f32() * 1000.0;
        self.last_frame = now;

        let frame_input = self.input.snapshot();
        self.camera.process_input(&frame_input, delta_ms);
        self.lights.update(delta_ms);
        self.renderer
            .configure(&self.ctx, &self.camera.uniform(), self.lights.lights())?;

        match self.renderer.draw_frame(&self.ctx, &self.scene) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("surface lost or outdated; reconfiguring");
                self.ctx.reconfigure_surface();
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface timeout; retrying next frame");
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow!("GPU is out of memory"));
            }
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.ctx.resize_surface(width, height);
        self.camera.resize(UVec2::new(width, height));
        self.renderer.resize(&self.ctx, width, height)?;
        Ok(())
    }

    fn handle_keyboard(&mut self, event: &KeyEvent, elwt: &EventLoopWindowTarget<()>) -> Result<()> {
        let PhysicalKey::Code(code) = event.physical_key else {
            return Ok(());
        };
        let pressed = event.state == ElementState::Pressed;
        if pressed && !event.repeat {
            match code {
                WinitKey::Escape => elwt.exit(),
                WinitKey::Tab => {
                    let next = self.renderer.strategy().toggled();
                    self.renderer.set_strategy(&self.ctx, next)?;
                }
                _ => {}
            }
        }
        if let Some(key) = map_keycode(code) {
            if pressed {
                self.input.set_key_down(key);
            } else {
                self.input.set_key_up(key);
            }
        }
        Ok(())
    }

    fn handle_mouse_button(&self, state: ElementState, button: WinitMouseButton) {
        let index = match button {
            WinitMouseButton::Left => 0,
            WinitMouseButton::Right => 1,
            WinitMouseButton::Middle => 2,
            _ => return,
        };
        let button = MouseButton::new(index);
        match state {
            ElementState::Pressed => self.input.set_mouse_button_down(button),
            ElementState::Released => self.input.set_mouse_button_up(button),
        }
    }
}

fn map_keycode(code: WinitKey) -> Option<KeyCode> {
    Some(match code {
        WinitKey::Escape => KeyCode::Named(NamedKey::Escape),
        WinitKey::Tab => KeyCode::Named(NamedKey::Tab),
        WinitKey::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        WinitKey::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        WinitKey::AltLeft => KeyCode::Named(NamedKey::LeftAlt),
        WinitKey::AltRight => KeyCode::Named(NamedKey::RightAlt),
        WinitKey::KeyW => KeyCode::Character('W'),
        WinitKey::KeyA => KeyCode::Character('A'),
        WinitKey::KeyS => KeyCode::Character('S'),
        WinitKey::KeyD => KeyCode::Character('D'),
        WinitKey::KeyQ => KeyCode::Character('Q'),
        WinitKey::KeyE => KeyCode::Character('E'),
        _ => return None,
    })
}

struct CliOptions {
    config: Option<String>,
    mesh: Option<String>,
    strategy: Option<Strategy>,
    lights: usize,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        Self::from_args(env::args().skip(1))
    }

    fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Self {
            config: None,
            mesh: None,
            strategy: None,
            lights: DEFAULT_LIGHTS,
            summary_only: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => options.config = Some(expect_value(&mut args, "--config")?),
                "--mesh" => options.mesh = Some(expect_value(&mut args, "--mesh")?),
                "--strategy" => {
                    let name = expect_value(&mut args, "--strategy")?;
                    let strategy = Strategy::from_name(&name).ok_or_else(|| {
                        anyhow!("Unknown strategy: {name}. Expected forward-plus or clustered-deferred")
                    })?;
                    options.strategy = Some(strategy);
                }
                "--lights" => {
                    let value = expect_value(&mut args, "--lights")?;
                    options.lights = value
                        .parse()
                        .with_context(|| format!("invalid light count: {value}"))?;
                }
                "--summary-only" => options.summary_only = true,
                other => {
                    return Err(anyhow!(
                        "Unknown argument: {other}. Usage: clustered-shading [--config <file.json>] [--mesh <file.obj>] [--strategy <name>] [--lights <n>] [--summary-only]"
                    ));
                }
            }
        }
        Ok(options)
    }
}

fn expect_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} expects a value"))
}
