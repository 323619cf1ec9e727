use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::backend::RenderBackend;
use crate::error::SandboxError;
use crate::sandbox::Sandbox;

/// A shader source that can be hot-reloaded from disk.
pub struct HotShader {
    path: PathBuf,
    last_modified: SystemTime,
    source: String,
}

/// What [`HotShader::apply`] did.
#[derive(Debug)]
pub enum ReloadOutcome {
    /// The file has not changed since the last check.
    Unchanged,
    /// The new source was loaded into the sandbox.
    Reloaded,
    /// The new source failed to build; the previous pipeline is still active.
    Failed(SandboxError),
}

impl HotShader {
    /// Load a shader from the given file path.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let source = fs::read_to_string(&path)?;
        let last_modified = fs::metadata(&path)?.modified()?;

        Ok(Self {
            path,
            last_modified,
            source,
        })
    }

    /// Check if the shader file has been modified and reload if so.
    /// Returns `true` if the source changed.
    pub fn check_reload(&mut self) -> bool {
        let Ok(metadata) = fs::metadata(&self.path) else {
            return false;
        };

        let Ok(modified) = metadata.modified() else {
            return false;
        };

        if modified > self.last_modified {
            if let Ok(source) = fs::read_to_string(&self.path) {
                self.source = source;
                self.last_modified = modified;
                return true;
            }
        }

        false
    }

    /// Reloads `sandbox` from disk if the file changed.
    ///
    /// Call this once per frame.
    pub fn apply<B: RenderBackend>(&mut self, sandbox: &mut Sandbox<B>) -> ReloadOutcome {
        if !self.check_reload() {
            return ReloadOutcome::Unchanged;
        }

        log::info!("Reloading shader: {}", self.path.display());
        match sandbox.load(&self.source) {
            Ok(()) => ReloadOutcome::Reloaded,
            Err(err) => {
                log::warn!("Shader reload failed, keeping previous version: {err}");
                ReloadOutcome::Failed(err)
            }
        }
    }

    /// Get the current shader source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Get the shader file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Extent;
    use crate::backend::recording::RecordingBackend;
    use std::time::Duration;

    fn touch_later(path: &Path, contents: &str) {
        fs::write(path, contents).unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .unwrap();
    }

    #[test]
    fn detects_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shader.frag");
        fs::write(&path, "void main() {}").unwrap();

        let mut shader = HotShader::new(&path).unwrap();
        assert!(!shader.check_reload());

        touch_later(&path, "#ifdef BUFFER_0\n#endif\n");
        assert!(shader.check_reload());
        assert!(shader.source().contains("BUFFER_0"));
        assert!(!shader.check_reload());
    }

    #[test]
    fn failed_reload_keeps_the_running_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shader.frag");
        fs::write(&path, "#ifdef BUFFER_0\n#endif\n").unwrap();

        let mut shader = HotShader::new(&path).unwrap();
        let mut sandbox = Sandbox::new(RecordingBackend::default(), Extent::new(16, 16)).unwrap();
        sandbox.load(shader.source()).unwrap();
        assert!(matches!(shader.apply(&mut sandbox), ReloadOutcome::Unchanged));

        touch_later(&path, "#ifdef BUFFER_1\n#endif\n");
        assert!(matches!(
            shader.apply(&mut sandbox),
            ReloadOutcome::Failed(SandboxError::NonContiguousIndices { .. })
        ));
        assert_eq!(sandbox.graph().map(|g| g.buffers().len()), Some(1));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(HotShader::new(dir.path().join("absent.frag")).is_err());
    }
}
