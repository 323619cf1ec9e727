//! Pass kinds and the concrete passes that make up a [`PassGraph`](crate::PassGraph).
//!
//! Every pass is a program compiled from the same shader source with a
//! different preprocessor symbol defined. Passes that render off-screen own
//! their [`RenderTarget`]s outright; releasing a pass releases its targets.

use std::sync::Arc;

use crate::backend::{ProgramHandle, RenderBackend, TargetHandle};
use crate::render_target::RenderTarget;
use crate::size_spec::SizeSpec;

/// The slot a pass occupies in the frame.
///
/// Numbered kinds carry their zero-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Background,
    Buffer(u32),
    DoubleBuffer(u32),
    Main,
    Postprocessing,
}

impl PassKind {
    /// Preprocessor symbol that selects this pass in the shader, if any.
    ///
    /// The main pass compiles the unmodified source and has no symbol.
    pub fn define(&self) -> Option<String> {
        match self {
            PassKind::Background => Some("BACKGROUND".to_string()),
            PassKind::Buffer(i) => Some(format!("BUFFER_{i}")),
            PassKind::DoubleBuffer(i) => Some(format!("DOUBLE_BUFFER_{i}")),
            PassKind::Main => None,
            PassKind::Postprocessing => Some("POSTPROCESSING".to_string()),
        }
    }

    /// Texture uniform under which this pass publishes its output.
    ///
    /// Postprocessing reads `u_scene` rather than publishing anything, and
    /// the background and main passes render straight to their destination.
    pub fn uniform_name(&self) -> Option<String> {
        match self {
            PassKind::Buffer(i) => Some(format!("u_buffer{i}")),
            PassKind::DoubleBuffer(i) => Some(format!("u_doubleBuffer{i}")),
            PassKind::Postprocessing => Some(crate::uniforms::U_SCENE.to_string()),
            PassKind::Background | PassKind::Main => None,
        }
    }

    /// Whether the destination is cleared before this pass draws.
    ///
    /// Background composites underneath a scene and double buffers read
    /// back what they wrote before, so neither clears.
    pub fn clears(&self) -> bool {
        !matches!(self, PassKind::Background | PassKind::DoubleBuffer(_))
    }
}

/// Source text plus the symbols defined for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderVariant {
    pub defines: Vec<String>,
    pub source: Arc<str>,
}

impl ShaderVariant {
    pub fn new(source: Arc<str>, defines: Vec<String>) -> Self {
        Self { defines, source }
    }

    /// The variant as a single text: one `#define` line per symbol, then the source.
    pub fn expanded(&self) -> String {
        let mut text = String::with_capacity(self.source.len() + self.defines.len() * 24);
        for define in &self.defines {
            text.push_str("#define ");
            text.push_str(define);
            text.push('\n');
        }
        text.push_str(&self.source);
        text
    }

    pub fn is_defined(&self, symbol: &str) -> bool {
        self.defines.iter().any(|d| d == symbol)
    }
}

/// Immutable description of a pass, as reported by [`PassGraph::descriptors`](crate::PassGraph::descriptors).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDescriptor {
    pub kind: PassKind,
    /// Requested size of the pass's own target(s); `None` for on-screen passes.
    pub size: Option<SizeSpec>,
    pub clears: bool,
}

/// A pass without a dedicated target: background, main or the program half
/// of postprocessing.
#[derive(Debug)]
pub struct ShaderPass {
    pub(crate) kind: PassKind,
    pub(crate) program: ProgramHandle,
}

impl ShaderPass {
    pub fn kind(&self) -> PassKind {
        self.kind
    }

    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    pub(crate) fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_program(self.program);
    }
}

/// A single-target buffer pass, `BUFFER_<n>`.
#[derive(Debug)]
pub struct BufferPass {
    pub(crate) index: u32,
    pub(crate) program: ProgramHandle,
    pub(crate) target: RenderTarget,
}

impl BufferPass {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn kind(&self) -> PassKind {
        PassKind::Buffer(self.index)
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub(crate) fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_program(self.program);
        self.target.release(backend);
    }
}

/// A ping-pong pass, `DOUBLE_BUFFER_<n>`, owning both halves of its pair.
#[derive(Debug)]
pub struct DoubleBufferPass {
    pub(crate) index: u32,
    pub(crate) program: ProgramHandle,
    pub(crate) targets: [RenderTarget; 2],
}

impl DoubleBufferPass {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn kind(&self) -> PassKind {
        PassKind::DoubleBuffer(self.index)
    }

    pub fn targets(&self) -> &[RenderTarget; 2] {
        &self.targets
    }

    /// Texture of the half selected by `slot` (0 or 1).
    pub fn texture(&self, slot: usize) -> TargetHandle {
        self.targets[slot & 1].handle()
    }

    pub(crate) fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_program(self.program);
        let [a, b] = self.targets;
        a.release(backend);
        b.release(backend);
    }
}

/// Postprocessing program plus the full-viewport target that captures the
/// frame it consumes through `u_scene`.
#[derive(Debug)]
pub struct PostprocessPass {
    pub(crate) program: ProgramHandle,
    pub(crate) scene_target: RenderTarget,
}

impl PostprocessPass {
    pub fn scene_target(&self) -> &RenderTarget {
        &self.scene_target
    }

    pub(crate) fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_program(self.program);
        self.scene_target.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defines_follow_directive_names() {
        assert_eq!(PassKind::Background.define().as_deref(), Some("BACKGROUND"));
        assert_eq!(PassKind::Buffer(3).define().as_deref(), Some("BUFFER_3"));
        assert_eq!(
            PassKind::DoubleBuffer(0).define().as_deref(),
            Some("DOUBLE_BUFFER_0")
        );
        assert_eq!(PassKind::Main.define(), None);
    }

    #[test]
    fn only_background_and_double_buffers_keep_contents() {
        assert!(!PassKind::Background.clears());
        assert!(!PassKind::DoubleBuffer(1).clears());
        assert!(PassKind::Buffer(0).clears());
        assert!(PassKind::Main.clears());
        assert!(PassKind::Postprocessing.clears());
    }

    #[test]
    fn expanded_variant_prepends_defines() {
        let variant = ShaderVariant::new(
            Arc::from("void main() {}\n"),
            vec!["BUFFER_1".to_string(), "USE_NOISE".to_string()],
        );
        assert_eq!(
            variant.expanded(),
            "#define BUFFER_1\n#define USE_NOISE\nvoid main() {}\n"
        );
        assert!(variant.is_defined("USE_NOISE"));
        assert!(!variant.is_defined("BUFFER_0"));
    }
}
