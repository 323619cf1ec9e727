//! Error types for sandbox construction, loading and rendering.

use thiserror::Error;

use crate::pass::PassKind;

/// Failures reported by a [`RenderBackend`](crate::RenderBackend) implementation.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create render target: {0}")]
    TargetCreationFailed(String),
    #[error("Failed to compile shader program: {0}")]
    ShaderCompilationFailed(String),
    #[error("Failed to acquire surface texture: {0}")]
    SurfaceUnavailable(String),
    #[error("Unknown render target handle {0}")]
    UnknownTarget(u64),
    #[error("Unknown program handle {0}")]
    UnknownProgram(u64),
    #[error("No frame in progress")]
    NoFrameInProgress,
}

/// Which indexed family an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferFamily {
    Buffer,
    DoubleBuffer,
}

impl std::fmt::Display for BufferFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferFamily::Buffer => f.write_str("BUFFER"),
            BufferFamily::DoubleBuffer => f.write_str("DOUBLE_BUFFER"),
        }
    }
}

/// Errors surfaced by [`Sandbox`](crate::Sandbox).
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The backend cannot sample floating-point textures at all.
    #[error("No floating-point texture support; feedback buffers require float targets")]
    UnsupportedFloatTextures,
    #[error("{family} index {index} out of range ({len} declared)")]
    IndexOutOfRange {
        family: BufferFamily,
        index: usize,
        len: usize,
    },
    #[error("{family} directives must be numbered 0..n without gaps, found {indices:?}")]
    NonContiguousIndices {
        family: BufferFamily,
        indices: Vec<u32>,
    },
    #[error("No shader loaded; call load() before rendering")]
    NotLoaded,
    #[error("Pass {kind:?} failed: {source}")]
    Pass {
        kind: PassKind,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

/// Attaches the failing pass to a backend error.
pub(crate) trait PassContext<T> {
    fn in_pass(self, kind: PassKind) -> SandboxResult<T>;
}

impl<T> PassContext<T> for Result<T, BackendError> {
    fn in_pass(self, kind: PassKind) -> SandboxResult<T> {
        self.map_err(|source| SandboxError::Pass { kind, source })
    }
}
