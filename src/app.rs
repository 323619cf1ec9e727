use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::backend::Extent;
use crate::error::{BackendError, SandboxError};
use crate::gpu::GpuContext;
use crate::hot_shader::HotShader;
use crate::sandbox::Sandbox;
use crate::wgpu_backend::WgpuBackend;

/// Which output the viewer shows each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Main,
    Buffer(usize),
    DoubleBuffer(usize),
}

/// Window and shader settings for [`run`].
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub shader: PathBuf,
    pub hot_reload: bool,
    pub defines: Vec<String>,
    pub view: View,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            title: "Shader Sandbox".to_string(),
            width: 800,
            height: 600,
            shader: PathBuf::from("shader.frag"),
            hot_reload: true,
            defines: Vec::new(),
            view: View::Main,
        }
    }
}

impl ViewerConfig {
    pub fn new(shader: impl Into<PathBuf>) -> Self {
        Self {
            shader: shader.into(),
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn hot_reload(mut self, enabled: bool) -> Self {
        self.hot_reload = enabled;
        self
    }

    pub fn define(mut self, symbol: impl Into<String>) -> Self {
        self.defines.push(symbol.into());
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = view;
        self
    }
}

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Failed to read shader: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

enum ViewerApp {
    Pending {
        config: ViewerConfig,
    },
    Running {
        window: Arc<Window>,
        sandbox: Sandbox<WgpuBackend>,
        shader: HotShader,
        config: ViewerConfig,
    },
    Failed(Option<ViewerError>),
}

/// Opens a window and renders the configured shader until it is closed.
///
/// # Example
/// ```ignore
/// shader_sandbox::run(ViewerConfig::new("feedback.frag").title("Feedback").size(1280, 720))?;
/// ```
pub fn run(config: ViewerConfig) -> Result<(), ViewerError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::Pending { config };
    event_loop.run_app(&mut app)?;

    match app {
        ViewerApp::Failed(Some(err)) => Err(err),
        _ => Ok(()),
    }
}

impl ViewerApp {
    fn start(
        event_loop: &ActiveEventLoop,
        config: &ViewerConfig,
    ) -> Result<(Arc<Window>, Sandbox<WgpuBackend>, HotShader), ViewerError> {
        let shader = HotShader::new(&config.shader)?;

        let window_attrs = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let gpu = GpuContext::new(window.clone())?;
        let viewport = Extent::new(gpu.width(), gpu.height());
        let mut sandbox = Sandbox::new(WgpuBackend::new(gpu), viewport)?;
        for symbol in &config.defines {
            sandbox.define(symbol.clone());
        }
        sandbox.load(shader.source())?;
        log::info!("Loaded {}", config.shader.display());

        Ok((window, sandbox, shader))
    }
}

fn render(sandbox: &mut Sandbox<WgpuBackend>, view: View) -> Result<(), SandboxError> {
    match view {
        View::Main => sandbox.render_main(),
        View::Buffer(i) => sandbox.render_buffer(i),
        View::DoubleBuffer(i) => sandbox.render_double_buffer(i),
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let ViewerApp::Pending { config } = self else {
            return;
        };
        match Self::start(event_loop, config) {
            Ok((window, sandbox, shader)) => {
                let config = config.clone();
                window.request_redraw();
                *self = ViewerApp::Running {
                    window,
                    sandbox,
                    shader,
                    config,
                };
            }
            Err(err) => {
                *self = ViewerApp::Failed(Some(err));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let ViewerApp::Running {
            window,
            sandbox,
            shader,
            config,
        } = self
        else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                sandbox
                    .backend_mut()
                    .resize_surface(size.width, size.height);
                if let Err(err) = sandbox.set_size(size.width, size.height) {
                    log::error!("Resize failed: {err}");
                }
            }
            WindowEvent::RedrawRequested => {
                if config.hot_reload {
                    shader.apply(sandbox);
                }
                if let Err(err) = render(sandbox, config.view) {
                    log::error!("Frame failed: {err}");
                    if matches!(err, SandboxError::IndexOutOfRange { .. }) {
                        *self = ViewerApp::Failed(Some(err.into()));
                        event_loop.exit();
                        return;
                    }
                }
                window.request_redraw();
            }
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = ViewerConfig::new("fx.frag")
            .title("Feedback")
            .size(1280, 720)
            .hot_reload(false)
            .define("PLATFORM_DESKTOP")
            .view(View::DoubleBuffer(1));
        assert_eq!(config.shader, PathBuf::from("fx.frag"));
        assert_eq!((config.width, config.height), (1280, 720));
        assert!(!config.hot_reload);
        assert_eq!(config.defines, vec!["PLATFORM_DESKTOP".to_string()]);
        assert_eq!(config.view, View::DoubleBuffer(1));
    }
}
