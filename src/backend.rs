//! The rendering backend contract.
//!
//! The sandbox never talks to a GPU API directly. Everything it needs (target
//! allocation, program compilation, fullscreen and scene draws) goes through
//! [`RenderBackend`], so the pass graph and scheduler run identically on
//! [`WgpuBackend`](crate::WgpuBackend) or on an in-memory backend in tests.

use crate::error::BackendError;
use crate::pass::ShaderVariant;
use crate::uniforms::UniformTable;

#[cfg(test)]
pub(crate) mod recording;

/// Handle to a backend-owned off-screen color target.
///
/// Stored in the [`UniformTable`] as the value of texture uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetHandle(u64);

impl TargetHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Handle to a backend-owned compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(u64);

impl ProgramHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Pixel dimensions of a viewport or target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same extent with each axis raised to at least one pixel.
    pub fn at_least_one(self) -> Self {
        Self::new(self.width.max(1), self.height.max(1))
    }

    pub fn as_vec2(&self) -> glam::Vec2 {
        glam::Vec2::new(self.width as f32, self.height as f32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapMode {
    ClampToEdge,
    Repeat,
}

/// How a target's texture is sampled by later passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sampling {
    pub filter: FilterMode,
    pub wrap: WrapMode,
}

/// Color storage of off-screen targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorPrecision {
    /// 32-bit float per channel.
    Float,
    /// 16-bit float per channel.
    HalfFloat,
}

/// Generation of the graphics API the backend runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiGeneration {
    /// GL ES 2 / WebGL 1 class devices without dependable float targets.
    Legacy,
    Modern,
}

/// Coarse device family, used only to look up precision overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Desktop,
    /// iPhone / iPad / iPod GPUs.
    AppleMobile,
    OtherMobile,
    Unknown,
}

/// What the backend reports about itself at sandbox construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Float textures can be sampled at all. Required.
    pub float_textures: bool,
    /// 32-bit float textures can be rendered to and linearly filtered.
    pub float_render_targets: bool,
    pub api: ApiGeneration,
    pub device_class: DeviceClass,
}

/// Everything needed to allocate one off-screen target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetDescriptor {
    pub label: String,
    pub size: Extent,
    pub precision: ColorPrecision,
    pub sampling: Sampling,
}

/// Where a draw lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Output {
    Screen,
    Target(TargetHandle),
}

/// What happens to the destination's previous contents before a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadAction {
    Clear,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawTarget {
    pub output: Output,
    pub load: LoadAction,
}

impl DrawTarget {
    pub fn new(output: Output, clears: bool) -> Self {
        Self {
            output,
            load: if clears {
                LoadAction::Clear
            } else {
                LoadAction::Load
            },
        }
    }
}

/// Operations the sandbox requires from a GPU backend.
///
/// Commands must be executed (or at least ordered) in call order: a draw that
/// samples a target observes every earlier draw into it.
pub trait RenderBackend {
    /// A host 3-D scene rendered by [`draw_scene`](Self::draw_scene).
    type Scene: ?Sized;
    /// Camera the scene is viewed through.
    type Camera;

    fn capabilities(&self) -> BackendCapabilities;

    /// Starts a frame; screen output is valid until [`end_frame`](Self::end_frame).
    fn begin_frame(&mut self) -> Result<(), BackendError>;

    /// Finishes the frame and presents the screen output.
    fn end_frame(&mut self) -> Result<(), BackendError>;

    fn create_target(&mut self, desc: &TargetDescriptor) -> Result<TargetHandle, BackendError>;

    /// Reallocates `target` at `size`. Previous contents are not preserved.
    fn resize_target(&mut self, target: TargetHandle, size: Extent) -> Result<(), BackendError>;

    fn destroy_target(&mut self, target: TargetHandle);

    fn compile_program(&mut self, variant: &ShaderVariant) -> Result<ProgramHandle, BackendError>;

    fn destroy_program(&mut self, program: ProgramHandle);

    /// Draws a full-surface quad with `program`, reading `uniforms`.
    fn draw_quad(
        &mut self,
        program: ProgramHandle,
        uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError>;

    /// Draws a host scene through `camera`.
    fn draw_scene(
        &mut self,
        scene: &Self::Scene,
        camera: &Self::Camera,
        uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError>;

    /// Copies `source` onto `target` with a pass-through program.
    fn blit(
        &mut self,
        source: TargetHandle,
        uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError>;

    fn clear(&mut self, output: Output) -> Result<(), BackendError>;
}
