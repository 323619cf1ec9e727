//! The host-facing sandbox: load a shader, resize, render frames.

use crate::backend::{DrawTarget, Extent, Output, RenderBackend, TargetHandle};
use crate::clock::FrameClock;
use crate::error::{SandboxError, SandboxResult};
use crate::pass_graph::PassGraph;
use crate::render_target::TargetPool;
use crate::scheduler::{FrameScheduler, MainSlot};
use crate::uniforms::{UniformTable, UniformValue};

/// A multi-pass shader pipeline wired from one annotated fragment shader.
///
/// # Example
///
/// ```ignore
/// let mut sandbox = Sandbox::new(backend, Extent::new(1280, 720))?;
/// sandbox.load(include_str!("feedback.frag"))?;
///
/// // every frame
/// sandbox.render_main()?;
///
/// // on window resize
/// sandbox.set_size(width, height)?;
/// ```
///
/// The sandbox owns its backend and every target it allocated; dropping it
/// releases them.
pub struct Sandbox<B: RenderBackend> {
    backend: B,
    pool: TargetPool,
    uniforms: UniformTable,
    defines: Vec<String>,
    viewport: Extent,
    scheduler: FrameScheduler,
    graph: Option<PassGraph>,
}

impl<B: RenderBackend> Sandbox<B> {
    /// Creates a sandbox rendering at `viewport`.
    ///
    /// Fails with [`SandboxError::UnsupportedFloatTextures`] when the backend
    /// cannot sample float textures.
    pub fn new(backend: B, viewport: Extent) -> SandboxResult<Self> {
        let pool = TargetPool::negotiate(&backend.capabilities())?;
        let viewport = viewport.at_least_one();
        let mut uniforms = UniformTable::new();
        uniforms.set_resolution(viewport);

        Ok(Self {
            backend,
            pool,
            uniforms,
            defines: Vec::new(),
            viewport,
            scheduler: FrameScheduler::default(),
            graph: None,
        })
    }

    /// Adds host uniforms shared with every pass.
    pub fn with_uniforms<I, K>(mut self, uniforms: I) -> Self
    where
        I: IntoIterator<Item = (K, UniformValue)>,
        K: Into<String>,
    {
        for (name, value) in uniforms {
            self.uniforms.set(name, value);
        }
        self
    }

    /// Replaces the frame clock.
    pub fn with_clock(mut self, clock: FrameClock) -> Self {
        self.scheduler = FrameScheduler::new(clock);
        self
    }

    /// Defines `symbol` in every pass compiled by later [`load`](Self::load) calls.
    pub fn define(&mut self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        if !self.defines.contains(&symbol) {
            self.defines.push(symbol);
        }
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    /// Builds the pass graph for `source`.
    ///
    /// A previously loaded graph is released only once the new one built
    /// successfully, so a failed reload leaves the old pipeline running.
    pub fn load(&mut self, source: &str) -> SandboxResult<()> {
        let mut uniforms = self.uniforms.clone();
        uniforms.clear_pass_textures();

        let graph = PassGraph::build(
            &mut self.backend,
            &self.pool,
            source,
            &self.defines,
            self.viewport,
            &mut uniforms,
        )?;

        if let Some(old) = self.graph.replace(graph) {
            old.release(&mut self.backend);
        }
        self.uniforms = uniforms;
        // The new graph publishes half 0 of each double buffer.
        self.scheduler.reset_ping_pong();
        Ok(())
    }

    /// Updates the viewport and resizes every relative target.
    pub fn set_size(&mut self, width: u32, height: u32) -> SandboxResult<()> {
        self.viewport = Extent::new(width, height).at_least_one();
        self.uniforms.set_resolution(self.viewport);
        if let Some(graph) = &mut self.graph {
            graph.resize(&mut self.backend, self.viewport)?;
        }
        Ok(())
    }

    /// Renders one frame with the main pass as a fullscreen quad.
    pub fn render_main(&mut self) -> SandboxResult<()> {
        let graph = self.graph.as_ref().ok_or(SandboxError::NotLoaded)?;
        let tick = self.scheduler.render_frame(
            &mut self.backend,
            graph,
            &mut self.uniforms,
            self.viewport,
            MainSlot::Quad,
        )?;
        log::trace!("Rendered frame {} at {:.3}s", tick.frame, tick.time);
        Ok(())
    }

    /// Renders one frame with a host scene in the main slot.
    pub fn render_scene(&mut self, scene: &B::Scene, camera: &B::Camera) -> SandboxResult<()> {
        let graph = self.graph.as_ref().ok_or(SandboxError::NotLoaded)?;
        let tick = self.scheduler.render_frame(
            &mut self.backend,
            graph,
            &mut self.uniforms,
            self.viewport,
            MainSlot::Scene { scene, camera },
        )?;
        log::trace!("Rendered scene frame {} at {:.3}s", tick.frame, tick.time);
        Ok(())
    }

    /// Shows buffer `index` on screen.
    pub fn render_buffer(&mut self, index: usize) -> SandboxResult<()> {
        let texture = self.buffer_texture(index)?;
        self.scheduler
            .present_texture(&mut self.backend, texture, &mut self.uniforms, self.viewport)
    }

    /// Shows the current half of double buffer `index` on screen.
    pub fn render_double_buffer(&mut self, index: usize) -> SandboxResult<()> {
        let texture = self.double_buffer_texture(index)?;
        self.scheduler
            .present_texture(&mut self.backend, texture, &mut self.uniforms, self.viewport)
    }

    /// Copies `source` into buffer `index` as its initial contents.
    pub fn seed_buffer(&mut self, index: usize, source: TargetHandle) -> SandboxResult<()> {
        let graph = self.graph.as_ref().ok_or(SandboxError::NotLoaded)?;
        let target = graph.buffer(index)?.target().handle();
        self.backend.blit(
            source,
            &self.uniforms,
            DrawTarget::new(Output::Target(target), true),
        )?;
        Ok(())
    }

    /// Copies `source` into both halves of double buffer `index`, so the
    /// first frame that reads it sees `source`.
    pub fn seed_double_buffer(&mut self, index: usize, source: TargetHandle) -> SandboxResult<()> {
        let graph = self.graph.as_ref().ok_or(SandboxError::NotLoaded)?;
        let pass = graph.double_buffer(index)?;
        for target in pass.targets() {
            self.backend.blit(
                source,
                &self.uniforms,
                DrawTarget::new(Output::Target(target.handle()), true),
            )?;
        }
        if let Some(name) = pass.kind().uniform_name() {
            let current = self.scheduler.ping_pong().current();
            self.uniforms.set_texture(&name, pass.texture(current));
        }
        Ok(())
    }

    /// Texture written by buffer `index`.
    pub fn buffer_texture(&self, index: usize) -> SandboxResult<TargetHandle> {
        let graph = self.graph.as_ref().ok_or(SandboxError::NotLoaded)?;
        Ok(graph.buffer(index)?.target().handle())
    }

    /// Current (most recently completed) half of double buffer `index`.
    pub fn double_buffer_texture(&self, index: usize) -> SandboxResult<TargetHandle> {
        let graph = self.graph.as_ref().ok_or(SandboxError::NotLoaded)?;
        let current = self.scheduler.ping_pong().current();
        Ok(graph.double_buffer(index)?.texture(current))
    }

    pub fn graph(&self) -> Option<&PassGraph> {
        self.graph.as_ref()
    }

    pub fn uniforms(&self) -> &UniformTable {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformTable {
        &mut self.uniforms
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        self.scheduler.clock_mut()
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u32 {
        self.scheduler.clock().frame()
    }

    pub fn viewport(&self) -> Extent {
        self.viewport
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: RenderBackend> Drop for Sandbox<B> {
    fn drop(&mut self) {
        if let Some(graph) = self.graph.take() {
            graph.release(&mut self.backend);
        }
    }
}
