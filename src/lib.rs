//! # Shader Sandbox
//!
//! **Multi-pass fragment shaders from a single source file.**
//!
//! A shader declares its passes with preprocessor blocks. The sandbox compiles
//! one program per declared pass, allocates their render targets, and runs
//! them in a fixed order every frame.
//!
//! ```glsl
//! layout(set = 0, binding = 1) uniform texture2D u_doubleBuffer0; // 0.5
//! layout(set = 0, binding = 2) uniform sampler u_doubleBuffer0_sampler;
//!
//! #ifdef DOUBLE_BUFFER_0
//!     // feedback: read last frame's output, write this frame's
//! #else
//!     // main pass: show it
//! #endif
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use shader_sandbox::{ViewerConfig, run};
//!
//! fn main() -> Result<(), shader_sandbox::ViewerError> {
//!     run(ViewerConfig::new("feedback.frag").title("Feedback").size(1280, 720))
//! }
//! ```
//!
//! ## Passes
//!
//! | Directive         | Renders into                 | Published as        |
//! |-------------------|------------------------------|---------------------|
//! | `BUFFER_n`        | its own target               | `u_buffer{n}`       |
//! | `DOUBLE_BUFFER_n` | one of a ping-pong pair      | `u_doubleBuffer{n}` |
//! | `BACKGROUND`      | under the 3-D scene          |                     |
//! | main (no symbol)  | screen or scene target       |                     |
//! | `POSTPROCESSING`  | screen, reading the scene    | reads `u_scene`     |
//!
//! Target sizes come from a trailing comment on the uniform declaration:
//! `// 0.5`, `// 0.25 0.5` (fractions of the viewport) or `// 256x256` (pixels).
//!
//! The pass graph and scheduler only see the [`RenderBackend`] trait;
//! [`WgpuBackend`] renders with wgpu onto a window surface.

mod app;
mod backend;
mod camera;
mod clock;
mod directive;
mod error;
mod gpu;
mod hot_shader;
mod pass;
mod pass_graph;
mod render_target;
mod sandbox;
mod scheduler;
mod size_spec;
mod uniforms;
mod wgpu_backend;

pub use app::{View, ViewerConfig, ViewerError, run};
pub use backend::{
    ApiGeneration, BackendCapabilities, ColorPrecision, DeviceClass, DrawTarget, Extent,
    FilterMode, LoadAction, Output, ProgramHandle, RenderBackend, Sampling, TargetDescriptor,
    TargetHandle, WrapMode,
};
pub use camera::Camera;
pub use clock::{ClockSource, FrameClock, FrameTick};
pub use directive::{Directive, DirectiveScan, scan};
pub use error::{BackendError, BufferFamily, SandboxError, SandboxResult};
pub use gpu::GpuContext;
pub use hot_shader::{HotShader, ReloadOutcome};
pub use pass::{
    BufferPass, DoubleBufferPass, PassDescriptor, PassKind, PostprocessPass, ShaderPass,
    ShaderVariant,
};
pub use pass_graph::PassGraph;
pub use render_target::{
    PRECISION_OVERRIDES, RenderTarget, TargetPool, negotiate_precision, precision_override,
};
pub use sandbox::Sandbox;
pub use scheduler::{FrameScheduler, MainSlot, PingPong};
pub use size_spec::{SizeSpec, resolve_size};
pub use uniforms::{
    U_DELTA, U_FRAME, U_RESOLUTION, U_SCENE, U_TIME, UniformTable, UniformValue,
};
pub use wgpu_backend::{RenderContext, SceneNode, WgpuBackend};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
