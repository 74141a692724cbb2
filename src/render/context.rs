use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::UVec2;
use log::info;
use winit::window::Window;

/// Device, queue and (when windowed) the presentation surface. Created once
/// and passed by reference to every GPU component.
pub struct GpuContext {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    surface: Option<WindowSurface>,
}

struct WindowSurface {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Creates a context that presents into `window`.
    pub async fn windowed(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = create_instance();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create window surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        let (device, queue) = request_device(&adapter).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: caps
                .present_modes
                .iter()
                .copied()
                .find(|mode| matches!(mode, wgpu::PresentMode::Mailbox))
                .unwrap_or(wgpu::PresentMode::Fifo),
            desired_maximum_frame_latency: 2,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);
        info!("surface configured as {format:?} {}x{}", size.width, size.height);

        Ok(Self {
            adapter,
            device,
            queue,
            surface: Some(WindowSurface {
                window,
                surface,
                config,
            }),
        })
    }

    /// Creates a context without a surface, for off-screen rendering. Falls
    /// back to a software adapter when no hardware one is available.
    pub async fn headless() -> Result<Self> {
        let instance = create_instance();
        let mut options = wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        };
        let adapter = match instance.request_adapter(&options).await {
            Some(adapter) => adapter,
            None => {
                info!("no hardware adapter found; requesting a fallback adapter");
                options.force_fallback_adapter = true;
                instance
                    .request_adapter(&options)
                    .await
                    .context("failed to acquire GPU adapter (hardware or fallback)")?
            }
        };
        let (device, queue) = request_device(&adapter).await?;
        Ok(Self {
            adapter,
            device,
            queue,
            surface: None,
        })
    }

    pub fn window(&self) -> Option<&Window> {
        self.surface.as_ref().map(|target| target.window.as_ref())
    }

    pub fn surface_format(&self) -> Option<wgpu::TextureFormat> {
        self.surface.as_ref().map(|target| target.config.format)
    }

    pub fn surface_size(&self) -> Option<UVec2> {
        self.surface
            .as_ref()
            .map(|target| UVec2::new(target.config.width, target.config.height))
    }

    /// Whether the adapter can render into `format`.
    pub fn supports_render_target(&self, format: wgpu::TextureFormat) -> bool {
        self.adapter
            .get_texture_format_features(format)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
    }

    pub fn storage_binding_limit(&self) -> u64 {
        self.device.limits().max_storage_buffer_binding_size as u64
    }

    /// Reconfigures the surface for a new window size. Zero-sized requests
    /// (minimized windows) are ignored.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let Some(target) = self.surface.as_mut() {
            target.config.width = width;
            target.config.height = height;
            target.surface.configure(&self.device, &target.config);
        }
    }

    /// Reapplies the current configuration after the surface was lost.
    pub fn reconfigure_surface(&self) {
        if let Some(target) = self.surface.as_ref() {
            target.surface.configure(&self.device, &target.config);
        }
    }

    pub fn acquire_frame(&self) -> Result<wgpu::SurfaceTexture, wgpu::SurfaceError> {
        match self.surface.as_ref() {
            Some(target) => target.surface.get_current_texture(),
            None => Err(wgpu::SurfaceError::Lost),
        }
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    })
}

async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    let adapter_info = adapter.get_info();
    info!(
        "using adapter {} ({:?})",
        adapter_info.name, adapter_info.backend
    );
    let required_limits = wgpu::Limits {
        max_storage_buffer_binding_size: adapter.limits().max_storage_buffer_binding_size,
        ..wgpu::Limits::default()
    };
    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("clustered-device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .context("failed to create GPU device")
}
