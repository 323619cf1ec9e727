//! Core GPU context and device management.
//!
//! [`GpuContext`] holds the wgpu resources every draw needs: the surface, the
//! device and queue, and the surface configuration. It also remembers what the
//! adapter can do with float textures, which decides target precision.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shader_sandbox::GpuContext;
//!
//! # fn demo(window: Arc<winit::window::Window>) -> Result<(), shader_sandbox::BackendError> {
//! let mut gpu = GpuContext::new(window)?;
//! gpu.resize(1280, 720);
//! println!("{}x{} (aspect: {})", gpu.width(), gpu.height(), gpu.aspect());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use winit::window::Window;

use crate::backend::{ApiGeneration, BackendCapabilities, DeviceClass};
use crate::error::BackendError;

/// Core GPU context holding wgpu resources.
///
/// All fields are public to allow direct access to wgpu APIs when needed,
/// for example from a [`SceneNode`](crate::SceneNode).
pub struct GpuContext {
    /// The surface for presenting rendered frames to the window.
    pub surface: wgpu::Surface<'static>,
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
    /// Adapter the device was created from.
    pub adapter_info: wgpu::AdapterInfo,
    capabilities: BackendCapabilities,
}

impl GpuContext {
    /// Create a new GPU context from a winit window.
    ///
    /// Requests `FLOAT32_FILTERABLE` when the adapter offers it so full-float
    /// targets can be sampled with linear filtering.
    pub fn new(window: Arc<Window>) -> Result<Self, BackendError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY | wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(|e| BackendError::InitializationFailed(format!("no suitable GPU adapter: {e}")))?;

        let adapter_info = adapter.get_info();
        let float32_filterable = adapter
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE);
        let required_features = if float32_filterable {
            wgpu::Features::FLOAT32_FILTERABLE
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Shader Sandbox Device"),
            required_features,
            required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                .using_resolution(adapter.limits()),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .map_err(|e| BackendError::InitializationFailed(format!("device request failed: {e}")))?;

        let capabilities = BackendCapabilities {
            float_textures: renderable_and_sampleable(&adapter, wgpu::TextureFormat::Rgba16Float),
            float_render_targets: float32_filterable
                && renderable_and_sampleable(&adapter, wgpu::TextureFormat::Rgba32Float),
            api: api_generation(adapter_info.backend),
            device_class: classify_device(std::env::consts::OS, adapter_info.device_type),
        };
        log::info!(
            "Using {} ({:?}, {:?} device)",
            adapter_info.name,
            adapter_info.backend,
            capabilities.device_class
        );

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| {
                BackendError::InitializationFailed("surface reports no formats".to_string())
            })?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            adapter_info,
            capabilities,
        })
    }

    /// Resize the surface to new dimensions.
    ///
    /// Ignores zero-sized dimensions, which occur while the window is minimized.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Float texture support negotiated at startup.
    pub fn capabilities(&self) -> BackendCapabilities {
        self.capabilities
    }

    /// Returns the current surface width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current surface height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }
}

fn renderable_and_sampleable(adapter: &wgpu::Adapter, format: wgpu::TextureFormat) -> bool {
    adapter
        .get_texture_format_features(format)
        .allowed_usages
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
}

/// GL (GLES / WebGL2) is the legacy generation; everything else is modern.
pub fn api_generation(backend: wgpu::Backend) -> ApiGeneration {
    match backend {
        wgpu::Backend::Gl => ApiGeneration::Legacy,
        _ => ApiGeneration::Modern,
    }
}

/// Classifies the device for the precision policy table.
pub fn classify_device(os: &str, device_type: wgpu::DeviceType) -> DeviceClass {
    match os {
        "ios" => DeviceClass::AppleMobile,
        "android" => DeviceClass::OtherMobile,
        _ => match device_type {
            wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu => {
                DeviceClass::Desktop
            }
            _ => DeviceClass::Unknown,
        },
    }
}
