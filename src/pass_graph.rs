//! Building the pass set for a shader.

use std::sync::Arc;

use crate::backend::{Extent, RenderBackend};
use crate::directive::{self, DirectiveScan};
use crate::error::{BufferFamily, PassContext, SandboxError, SandboxResult};
use crate::pass::{
    BufferPass, DoubleBufferPass, PassDescriptor, PassKind, PostprocessPass, ShaderPass,
    ShaderVariant,
};
use crate::render_target::TargetPool;
use crate::size_spec::{SizeSpec, resolve_size};
use crate::uniforms::{U_SCENE, UniformTable};

/// Every pass compiled from one shader, grouped by kind.
///
/// Buffers and double buffers are stored in index order, which for a
/// validated shader is also the order their uniforms are numbered in.
#[derive(Debug)]
pub struct PassGraph {
    source: Arc<str>,
    background: Option<ShaderPass>,
    buffers: Vec<BufferPass>,
    double_buffers: Vec<DoubleBufferPass>,
    main: ShaderPass,
    postprocessing: Option<PostprocessPass>,
}

/// Passes built so far; released wholesale if a later step fails.
#[derive(Default)]
struct GraphParts {
    background: Option<ShaderPass>,
    buffers: Vec<BufferPass>,
    double_buffers: Vec<DoubleBufferPass>,
    main: Option<ShaderPass>,
    postprocessing: Option<PostprocessPass>,
}

impl GraphParts {
    fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        if let Some(pass) = self.background {
            pass.release(backend);
        }
        for pass in self.buffers {
            pass.release(backend);
        }
        for pass in self.double_buffers {
            pass.release(backend);
        }
        if let Some(pass) = self.main {
            pass.release(backend);
        }
        if let Some(pass) = self.postprocessing {
            pass.release(backend);
        }
    }
}

/// Inputs shared by every step of a graph build.
struct BuildContext<'a> {
    source: &'a Arc<str>,
    defines: &'a [String],
    pool: &'a TargetPool,
    viewport: Extent,
}

impl BuildContext<'_> {
    fn variant(&self, kind: PassKind) -> ShaderVariant {
        let defines = kind
            .define()
            .into_iter()
            .chain(self.defines.iter().cloned())
            .collect();
        ShaderVariant::new(Arc::clone(self.source), defines)
    }
}

impl PassGraph {
    /// Scans `source`, compiles one program per declared pass and allocates
    /// their targets, registering each pass's texture uniform in `uniforms`.
    ///
    /// `defines` are added to every variant, including the main pass. On
    /// failure nothing allocated by this call is left behind.
    pub fn build<B: RenderBackend + ?Sized>(
        backend: &mut B,
        pool: &TargetPool,
        source: &str,
        defines: &[String],
        viewport: Extent,
        uniforms: &mut UniformTable,
    ) -> SandboxResult<Self> {
        let found = directive::scan(source);
        found.validate()?;

        let source: Arc<str> = Arc::from(source);
        let ctx = BuildContext {
            source: &source,
            defines,
            pool,
            viewport,
        };

        let mut parts = GraphParts::default();
        if let Err(err) = Self::build_parts(backend, &ctx, &found, &mut parts, uniforms) {
            parts.release(backend);
            return Err(err);
        }

        let GraphParts {
            background,
            buffers,
            double_buffers,
            main,
            postprocessing,
        } = parts;
        let main = main.ok_or(SandboxError::NotLoaded)?;

        log::info!(
            "Built pass graph: background={} buffers={} double_buffers={} postprocessing={}",
            background.is_some(),
            buffers.len(),
            double_buffers.len(),
            postprocessing.is_some()
        );

        Ok(Self {
            source,
            background,
            buffers,
            double_buffers,
            main,
            postprocessing,
        })
    }

    fn build_parts<B: RenderBackend + ?Sized>(
        backend: &mut B,
        ctx: &BuildContext<'_>,
        found: &DirectiveScan,
        parts: &mut GraphParts,
        uniforms: &mut UniformTable,
    ) -> SandboxResult<()> {
        if found.background {
            let kind = PassKind::Background;
            let program = backend.compile_program(&ctx.variant(kind)).in_pass(kind)?;
            parts.background = Some(ShaderPass { kind, program });
        }

        for index in 0..found.buffer_count() as u32 {
            let kind = PassKind::Buffer(index);
            let name = uniform_name(kind);
            let spec = resolve_size(ctx.source, &name);
            let program = backend.compile_program(&ctx.variant(kind)).in_pass(kind)?;
            let target = match ctx.pool.create(backend, &name, spec, kind, ctx.viewport) {
                Ok(target) => target,
                Err(err) => {
                    backend.destroy_program(program);
                    return Err(SandboxError::Pass { kind, source: err });
                }
            };
            uniforms.set_texture(&name, target.handle());
            parts.buffers.push(BufferPass {
                index,
                program,
                target,
            });
        }

        for index in 0..found.double_buffer_count() as u32 {
            let kind = PassKind::DoubleBuffer(index);
            let name = uniform_name(kind);
            let spec = resolve_size(ctx.source, &name);
            let program = backend.compile_program(&ctx.variant(kind)).in_pass(kind)?;
            let first = match ctx
                .pool
                .create(backend, &format!("{name} (0)"), spec, kind, ctx.viewport)
            {
                Ok(target) => target,
                Err(err) => {
                    backend.destroy_program(program);
                    return Err(SandboxError::Pass { kind, source: err });
                }
            };
            let second = match ctx
                .pool
                .create(backend, &format!("{name} (1)"), spec, kind, ctx.viewport)
            {
                Ok(target) => target,
                Err(err) => {
                    backend.destroy_program(program);
                    first.release(backend);
                    return Err(SandboxError::Pass { kind, source: err });
                }
            };
            let targets = [first, second];
            uniforms.set_texture(&name, targets[0].handle());
            parts.double_buffers.push(DoubleBufferPass {
                index,
                program,
                targets,
            });
        }

        let kind = PassKind::Main;
        let program = backend.compile_program(&ctx.variant(kind)).in_pass(kind)?;
        parts.main = Some(ShaderPass { kind, program });

        if found.postprocessing {
            let kind = PassKind::Postprocessing;
            let program = backend.compile_program(&ctx.variant(kind)).in_pass(kind)?;
            let scene_target = match ctx.pool.create(
                backend,
                U_SCENE,
                SizeSpec::FULL_VIEWPORT,
                kind,
                ctx.viewport,
            ) {
                Ok(target) => target,
                Err(err) => {
                    backend.destroy_program(program);
                    return Err(SandboxError::Pass { kind, source: err });
                }
            };
            uniforms.set_texture(U_SCENE, scene_target.handle());
            parts.postprocessing = Some(PostprocessPass {
                program,
                scene_target,
            });
        }

        Ok(())
    }

    /// Resizes every relative target to `viewport`; absolute ones keep their size.
    pub fn resize<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        viewport: Extent,
    ) -> SandboxResult<usize> {
        let mut resized = 0;
        for pass in &mut self.buffers {
            let kind = pass.kind();
            resized += usize::from(pass.target.fit_viewport(backend, viewport).in_pass(kind)?);
        }
        for pass in &mut self.double_buffers {
            let kind = pass.kind();
            for target in &mut pass.targets {
                resized += usize::from(target.fit_viewport(backend, viewport).in_pass(kind)?);
            }
        }
        if let Some(pass) = &mut self.postprocessing {
            resized += usize::from(
                pass.scene_target
                    .fit_viewport(backend, viewport)
                    .in_pass(PassKind::Postprocessing)?,
            );
        }
        log::debug!(
            "Resized {resized} targets for {}x{} viewport",
            viewport.width,
            viewport.height
        );
        Ok(resized)
    }

    /// Hands every program and target back to the backend.
    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        GraphParts {
            background: self.background,
            buffers: self.buffers,
            double_buffers: self.double_buffers,
            main: Some(self.main),
            postprocessing: self.postprocessing,
        }
        .release(backend);
    }

    /// The shader source the graph was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn background(&self) -> Option<&ShaderPass> {
        self.background.as_ref()
    }

    pub fn buffers(&self) -> &[BufferPass] {
        &self.buffers
    }

    pub fn double_buffers(&self) -> &[DoubleBufferPass] {
        &self.double_buffers
    }

    pub fn main(&self) -> &ShaderPass {
        &self.main
    }

    pub fn postprocessing(&self) -> Option<&PostprocessPass> {
        self.postprocessing.as_ref()
    }

    /// Buffer pass `index`, or an out-of-range error.
    pub fn buffer(&self, index: usize) -> SandboxResult<&BufferPass> {
        self.buffers
            .get(index)
            .ok_or(SandboxError::IndexOutOfRange {
                family: BufferFamily::Buffer,
                index,
                len: self.buffers.len(),
            })
    }

    /// Double-buffer pass `index`, or an out-of-range error.
    pub fn double_buffer(&self, index: usize) -> SandboxResult<&DoubleBufferPass> {
        self.double_buffers
            .get(index)
            .ok_or(SandboxError::IndexOutOfRange {
                family: BufferFamily::DoubleBuffer,
                index,
                len: self.double_buffers.len(),
            })
    }

    /// All passes in execution order: buffers, double buffers, background,
    /// main, postprocessing.
    pub fn descriptors(&self) -> Vec<PassDescriptor> {
        let mut out = Vec::with_capacity(self.buffers.len() + self.double_buffers.len() + 3);
        for pass in &self.buffers {
            out.push(describe(pass.kind(), Some(pass.target.spec())));
        }
        for pass in &self.double_buffers {
            out.push(describe(pass.kind(), Some(pass.targets[0].spec())));
        }
        if let Some(pass) = &self.background {
            out.push(describe(pass.kind, None));
        }
        out.push(describe(self.main.kind, None));
        if let Some(pass) = &self.postprocessing {
            out.push(describe(
                PassKind::Postprocessing,
                Some(pass.scene_target.spec()),
            ));
        }
        out
    }
}

fn describe(kind: PassKind, size: Option<SizeSpec>) -> PassDescriptor {
    PassDescriptor {
        kind,
        size,
        clears: kind.clears(),
    }
}

fn uniform_name(kind: PassKind) -> String {
    kind.uniform_name().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ColorPrecision;
    use crate::backend::recording::RecordingBackend;

    const FEEDBACK: &str = "\
uniform sampler2D u_buffer0; // 256x256
uniform sampler2D u_doubleBuffer0;
uniform sampler2D u_doubleBuffer1; // 0.5
void main() {
#ifdef BUFFER_0
    gl_FragColor = vec4(1.0);
#elif defined(DOUBLE_BUFFER_0)
    gl_FragColor = texture2D(u_doubleBuffer0, st);
#elif defined(DOUBLE_BUFFER_1)
    gl_FragColor = texture2D(u_doubleBuffer1, st);
#else
    gl_FragColor = texture2D(u_buffer0, st);
#endif
}
";

    fn build(source: &str, backend: &mut RecordingBackend) -> SandboxResult<(PassGraph, UniformTable)> {
        let mut uniforms = UniformTable::new();
        let pool = TargetPool::new(ColorPrecision::Float);
        let graph = PassGraph::build(
            backend,
            &pool,
            source,
            &[],
            Extent::new(800, 600),
            &mut uniforms,
        )?;
        Ok((graph, uniforms))
    }

    #[test]
    fn one_pass_per_declared_index_with_numbered_uniforms() {
        let mut backend = RecordingBackend::default();
        let (graph, uniforms) = build(FEEDBACK, &mut backend).unwrap();

        assert_eq!(graph.buffers().len(), 1);
        assert_eq!(graph.double_buffers().len(), 2);
        assert!(graph.background().is_none());
        assert!(graph.postprocessing().is_none());

        assert_eq!(
            uniforms.texture("u_buffer0"),
            Some(graph.buffers()[0].target().handle())
        );
        assert_eq!(
            uniforms.texture("u_doubleBuffer1"),
            Some(graph.double_buffers()[1].texture(0))
        );
        // 1 buffer target + 2 pairs
        assert_eq!(backend.targets.len(), 5);
        // buffer, 2 double buffers, main
        assert_eq!(backend.programs.len(), 4);
    }

    #[test]
    fn variants_prepend_their_symbol() {
        let mut backend = RecordingBackend::default();
        let (_graph, _) = build(FEEDBACK, &mut backend).unwrap();
        let db1 = backend.program_for("DOUBLE_BUFFER_1").unwrap();
        let expanded = backend.programs[&db1].expanded();
        assert!(expanded.starts_with("#define DOUBLE_BUFFER_1\nuniform sampler2D u_buffer0;"));
        let main = backend.main_program().unwrap();
        assert!(backend.programs[&main].defines.is_empty());
        assert_eq!(&*backend.programs[&main].source, FEEDBACK);
    }

    #[test]
    fn targets_are_sized_from_annotations() {
        let mut backend = RecordingBackend::default();
        let (graph, _) = build(FEEDBACK, &mut backend).unwrap();
        assert_eq!(graph.buffers()[0].target().size(), Extent::new(256, 256));
        for target in graph.double_buffers()[0].targets() {
            assert_eq!(target.size(), Extent::new(800, 600));
        }
        for target in graph.double_buffers()[1].targets() {
            assert_eq!(target.size(), Extent::new(400, 300));
        }
    }

    #[test]
    fn single_double_buffer_scenario() {
        let src = "#ifdef DOUBLE_BUFFER_0\n    color = vec4(0.0);\n#else\n    color = vec4(1.0);\n#endif\n";
        let mut backend = RecordingBackend::default();
        let (graph, _) = build(src, &mut backend).unwrap();
        assert_eq!(graph.double_buffers().len(), 1);
        let [a, b] = graph.double_buffers()[0].targets();
        assert_ne!(a.handle(), b.handle());
        assert_eq!(a.size(), Extent::new(800, 600));
        assert_eq!(b.size(), Extent::new(800, 600));
    }

    #[test]
    fn postprocessing_allocates_full_viewport_scene_target() {
        let src = "#ifdef BACKGROUND\n#elif defined(POSTPROCESSING)\n#endif\n";
        let mut backend = RecordingBackend::default();
        let (graph, uniforms) = build(src, &mut backend).unwrap();
        let post = graph.postprocessing().unwrap();
        assert_eq!(post.scene_target().size(), Extent::new(800, 600));
        assert_eq!(uniforms.texture(U_SCENE), Some(post.scene_target().handle()));
        assert!(graph.background().is_some());

        let kinds: Vec<_> = graph.descriptors().iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![PassKind::Background, PassKind::Main, PassKind::Postprocessing]
        );
        assert!(!graph.descriptors()[0].clears);
    }

    #[test]
    fn extra_defines_reach_every_pass() {
        let mut backend = RecordingBackend::default();
        let mut uniforms = UniformTable::new();
        let pool = TargetPool::new(ColorPrecision::Float);
        let _graph = PassGraph::build(
            &mut backend,
            &pool,
            FEEDBACK,
            &["PLATFORM_DESKTOP".to_string()],
            Extent::new(64, 64),
            &mut uniforms,
        )
        .unwrap();
        assert!(
            backend
                .programs
                .values()
                .all(|v| v.is_defined("PLATFORM_DESKTOP"))
        );
    }

    #[test]
    fn non_contiguous_indices_are_rejected_before_allocation() {
        let src = "#ifdef BUFFER_0\n#elif defined(BUFFER_2)\n#endif\n";
        let mut backend = RecordingBackend::default();
        let err = build(src, &mut backend).unwrap_err();
        assert!(matches!(
            err,
            SandboxError::NonContiguousIndices {
                family: BufferFamily::Buffer,
                ..
            }
        ));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn failed_compile_releases_everything_built_so_far() {
        let mut backend = RecordingBackend::default();
        backend.fail_on_define = Some("DOUBLE_BUFFER_1".to_string());
        let err = build(FEEDBACK, &mut backend).unwrap_err();
        assert!(matches!(
            err,
            SandboxError::Pass {
                kind: PassKind::DoubleBuffer(1),
                ..
            }
        ));
        assert!(backend.targets.is_empty());
        assert!(backend.programs.is_empty());
    }

    #[test]
    fn out_of_range_lookups_are_errors() {
        let mut backend = RecordingBackend::default();
        let (graph, _) = build(FEEDBACK, &mut backend).unwrap();
        assert!(graph.buffer(0).is_ok());
        assert!(matches!(
            graph.buffer(5),
            Err(SandboxError::IndexOutOfRange {
                family: BufferFamily::Buffer,
                index: 5,
                len: 1
            })
        ));
        assert!(graph.double_buffer(2).is_err());
    }

    #[test]
    fn release_returns_all_resources() {
        let mut backend = RecordingBackend::default();
        let (graph, _) = build(FEEDBACK, &mut backend).unwrap();
        graph.release(&mut backend);
        assert!(backend.targets.is_empty());
        assert!(backend.programs.is_empty());
    }
}
