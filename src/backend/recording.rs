//! In-memory backend that records every call, for unit tests.

use std::collections::BTreeMap;

use crate::backend::{
    ApiGeneration, BackendCapabilities, DeviceClass, DrawTarget, Extent, Output, ProgramHandle,
    RenderBackend, TargetDescriptor, TargetHandle,
};
use crate::error::BackendError;
use crate::pass::ShaderVariant;
use crate::uniforms::UniformTable;

#[derive(Debug, Clone)]
pub enum Call {
    BeginFrame,
    EndFrame,
    CreateTarget(TargetHandle),
    ResizeTarget(TargetHandle, Extent),
    DestroyTarget(TargetHandle),
    Compile(ProgramHandle),
    DestroyProgram(ProgramHandle),
    DrawQuad {
        program: ProgramHandle,
        uniforms: UniformTable,
        target: DrawTarget,
    },
    DrawScene {
        scene: String,
        target: DrawTarget,
    },
    Blit {
        source: TargetHandle,
        target: DrawTarget,
    },
    Clear(Output),
}

pub struct RecordingBackend {
    pub caps: BackendCapabilities,
    pub calls: Vec<Call>,
    pub targets: BTreeMap<TargetHandle, TargetDescriptor>,
    pub programs: BTreeMap<ProgramHandle, ShaderVariant>,
    /// Compilation fails for any variant defining this symbol.
    pub fail_on_define: Option<String>,
    /// `begin_frame` fails while set, like an unavailable surface.
    pub fail_begin_frame: bool,
    next_id: u64,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::with_capabilities(BackendCapabilities {
            float_textures: true,
            float_render_targets: true,
            api: ApiGeneration::Modern,
            device_class: DeviceClass::Desktop,
        })
    }
}

impl RecordingBackend {
    pub fn with_capabilities(caps: BackendCapabilities) -> Self {
        Self {
            caps,
            calls: Vec::new(),
            targets: BTreeMap::new(),
            programs: BTreeMap::new(),
            fail_on_define: None,
            fail_begin_frame: false,
            next_id: 1,
        }
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn size_of(&self, target: TargetHandle) -> Extent {
        self.targets[&target].size
    }

    /// Program compiled with `symbol` defined as its first define, i.e. the pass symbol.
    pub fn program_for(&self, symbol: &str) -> Option<ProgramHandle> {
        self.programs
            .iter()
            .find(|(_, v)| v.defines.first().map(String::as_str) == Some(symbol))
            .map(|(h, _)| *h)
    }

    /// Main program: the one whose defines carry no pass symbol.
    pub fn main_program(&self) -> Option<ProgramHandle> {
        self.programs
            .iter()
            .find(|(_, v)| {
                v.defines.iter().all(|d| {
                    !(d == "BACKGROUND"
                        || d == "POSTPROCESSING"
                        || d.starts_with("BUFFER_")
                        || d.starts_with("DOUBLE_BUFFER_"))
                })
            })
            .map(|(h, _)| *h)
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Draw-like calls only, in order.
    pub fn draws(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::DrawQuad { .. } | Call::DrawScene { .. } | Call::Blit { .. } | Call::Clear(_)
                )
            })
            .collect()
    }

    pub fn quad_draws(&self) -> Vec<(ProgramHandle, &UniformTable, DrawTarget)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::DrawQuad {
                    program,
                    uniforms,
                    target,
                } => Some((*program, uniforms, *target)),
                _ => None,
            })
            .collect()
    }
}

impl RenderBackend for RecordingBackend {
    type Scene = str;
    type Camera = ();

    fn capabilities(&self) -> BackendCapabilities {
        self.caps
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        if self.fail_begin_frame {
            return Err(BackendError::SurfaceUnavailable("timeout".to_string()));
        }
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        self.calls.push(Call::EndFrame);
        Ok(())
    }

    fn create_target(&mut self, desc: &TargetDescriptor) -> Result<TargetHandle, BackendError> {
        let handle = TargetHandle::new(self.next());
        self.targets.insert(handle, desc.clone());
        self.calls.push(Call::CreateTarget(handle));
        Ok(handle)
    }

    fn resize_target(&mut self, target: TargetHandle, size: Extent) -> Result<(), BackendError> {
        let desc = self
            .targets
            .get_mut(&target)
            .ok_or(BackendError::UnknownTarget(target.id()))?;
        desc.size = size;
        self.calls.push(Call::ResizeTarget(target, size));
        Ok(())
    }

    fn destroy_target(&mut self, target: TargetHandle) {
        self.targets.remove(&target);
        self.calls.push(Call::DestroyTarget(target));
    }

    fn compile_program(&mut self, variant: &ShaderVariant) -> Result<ProgramHandle, BackendError> {
        if let Some(symbol) = &self.fail_on_define {
            if variant.is_defined(symbol) {
                return Err(BackendError::ShaderCompilationFailed(format!(
                    "rejected {symbol}"
                )));
            }
        }
        let handle = ProgramHandle::new(self.next());
        self.programs.insert(handle, variant.clone());
        self.calls.push(Call::Compile(handle));
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.calls.push(Call::DestroyProgram(program));
    }

    fn draw_quad(
        &mut self,
        program: ProgramHandle,
        uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError> {
        if !self.programs.contains_key(&program) {
            return Err(BackendError::UnknownProgram(program.id()));
        }
        self.calls.push(Call::DrawQuad {
            program,
            uniforms: uniforms.clone(),
            target,
        });
        Ok(())
    }

    fn draw_scene(
        &mut self,
        scene: &str,
        _camera: &(),
        _uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError> {
        self.calls.push(Call::DrawScene {
            scene: scene.to_string(),
            target,
        });
        Ok(())
    }

    fn blit(
        &mut self,
        source: TargetHandle,
        _uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError> {
        self.calls.push(Call::Blit { source, target });
        Ok(())
    }

    fn clear(&mut self, output: Output) -> Result<(), BackendError> {
        self.calls.push(Call::Clear(output));
        Ok(())
    }
}
