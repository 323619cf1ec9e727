//! Per-frame execution of a [`PassGraph`].
//!
//! Every frame runs the same fixed sequence, regardless of which pass reads
//! which texture:
//!
//! ```text
//! uniforms ─▶ BUFFER_0..n ─▶ DOUBLE_BUFFER_0..m ─▶ flip ─▶ [BACKGROUND] ─▶ main / scene ─▶ [POSTPROCESSING]
//! ```
//!
//! Double buffers read their "current" half and write the "next" half. The
//! current/next index is shared by all double buffers and flips once, after
//! the last of them has rendered.

use crate::backend::{DrawTarget, Extent, LoadAction, Output, RenderBackend, TargetHandle};
use crate::clock::{FrameClock, FrameTick};
use crate::error::{PassContext, SandboxResult};
use crate::pass::PassKind;
use crate::pass_graph::PassGraph;
use crate::uniforms::{U_DELTA, U_FRAME, U_SCENE, U_TIME, UniformTable};

/// The shared current/next selector for every double buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PingPong {
    current: usize,
}

impl PingPong {
    /// Half that is read this frame.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Half that is written this frame.
    pub fn next(&self) -> usize {
        1 - self.current
    }

    pub fn flip(&mut self) {
        self.current = self.next();
    }
}

/// How the main slot of a frame is filled.
pub enum MainSlot<'a, B: RenderBackend + ?Sized> {
    /// 2-D: a fullscreen quad with the main pass.
    Quad,
    /// 3-D: background (if any) then the host scene.
    Scene {
        scene: &'a B::Scene,
        camera: &'a B::Camera,
    },
}

/// Drives one frame at a time over a pass graph.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    clock: FrameClock,
    ping_pong: PingPong,
    flips: u64,
}

impl FrameScheduler {
    pub fn new(clock: FrameClock) -> Self {
        Self {
            clock,
            ping_pong: PingPong::default(),
            flips: 0,
        }
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    pub fn ping_pong(&self) -> PingPong {
        self.ping_pong
    }

    /// Total double-buffer flips performed, one per frame.
    pub fn flips(&self) -> u64 {
        self.flips
    }

    /// Renders one full frame.
    pub fn render_frame<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        graph: &PassGraph,
        uniforms: &mut UniformTable,
        viewport: Extent,
        slot: MainSlot<'_, B>,
    ) -> SandboxResult<FrameTick> {
        backend.begin_frame()?;
        let tick = self.update_uniforms(uniforms);

        // A failed pass still ends the frame.
        let drawn = self.draw_frame(backend, graph, uniforms, viewport, slot);
        let ended = backend.end_frame();
        drawn?;
        ended?;
        Ok(tick)
    }

    fn draw_frame<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        graph: &PassGraph,
        uniforms: &mut UniformTable,
        viewport: Extent,
        slot: MainSlot<'_, B>,
    ) -> SandboxResult<()> {
        self.run_buffers(backend, graph, uniforms)?;
        self.run_double_buffers(backend, graph, uniforms)?;

        uniforms.set_resolution(viewport);
        let main_output = match graph.postprocessing() {
            Some(post) => {
                let scene = post.scene_target().handle();
                backend
                    .clear(Output::Target(scene))
                    .in_pass(PassKind::Postprocessing)?;
                Output::Target(scene)
            }
            None => Output::Screen,
        };

        match slot {
            MainSlot::Quad => {
                let main = graph.main();
                // A cleared scene target must not be cleared twice.
                let clears = main_output == Output::Screen;
                backend
                    .draw_quad(main.program(), uniforms, DrawTarget::new(main_output, clears))
                    .in_pass(PassKind::Main)?;
            }
            MainSlot::Scene { scene, camera } => {
                let mut load = if main_output == Output::Screen {
                    LoadAction::Clear
                } else {
                    LoadAction::Load
                };
                if let Some(background) = graph.background() {
                    backend
                        .draw_quad(
                            background.program(),
                            uniforms,
                            DrawTarget::new(main_output, PassKind::Background.clears()),
                        )
                        .in_pass(PassKind::Background)?;
                    load = LoadAction::Load;
                }
                backend
                    .draw_scene(
                        scene,
                        camera,
                        uniforms,
                        DrawTarget {
                            output: main_output,
                            load,
                        },
                    )
                    .in_pass(PassKind::Main)?;
            }
        }

        if let Some(post) = graph.postprocessing() {
            uniforms.set_texture(U_SCENE, post.scene_target().handle());
            uniforms.set_resolution(viewport);
            backend
                .draw_quad(
                    post.program,
                    uniforms,
                    DrawTarget::new(Output::Screen, PassKind::Postprocessing.clears()),
                )
                .in_pass(PassKind::Postprocessing)?;
        }
        Ok(())
    }

    /// Advances the clock and writes `u_time`, `u_delta` and `u_frame`.
    pub fn update_uniforms(&mut self, uniforms: &mut UniformTable) -> FrameTick {
        let tick = self.clock.tick();
        uniforms.set(U_TIME, tick.time);
        uniforms.set(U_DELTA, tick.delta);
        uniforms.set(U_FRAME, i32::try_from(tick.frame).unwrap_or(i32::MAX));
        tick
    }

    /// Renders every buffer pass into its own target, in index order.
    pub fn run_buffers<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        graph: &PassGraph,
        uniforms: &mut UniformTable,
    ) -> SandboxResult<()> {
        for pass in graph.buffers() {
            let kind = pass.kind();
            let target = pass.target();
            uniforms.set_resolution(target.size());
            log::trace!("{kind:?} -> {:?}", target.handle());
            backend
                .draw_quad(
                    pass.program,
                    uniforms,
                    DrawTarget::new(Output::Target(target.handle()), kind.clears()),
                )
                .in_pass(kind)?;
            if let Some(name) = kind.uniform_name() {
                uniforms.set_texture(&name, target.handle());
            }
        }
        Ok(())
    }

    /// Renders every double buffer from its current half into its next half,
    /// then flips the shared index once.
    pub fn run_double_buffers<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        graph: &PassGraph,
        uniforms: &mut UniformTable,
    ) -> SandboxResult<()> {
        let current = self.ping_pong.current();
        let next = self.ping_pong.next();

        for pass in graph.double_buffers() {
            let kind = pass.kind();
            let name = kind.uniform_name().unwrap_or_default();
            let read = pass.texture(current);
            let write = &pass.targets()[next];

            uniforms.set_resolution(write.size());
            uniforms.set_texture(&name, read);
            log::trace!("{kind:?} {read:?} -> {:?}", write.handle());
            let drawn = backend
                .draw_quad(
                    pass.program,
                    uniforms,
                    DrawTarget::new(Output::Target(write.handle()), kind.clears()),
                )
                .in_pass(kind);
            if let Err(err) = drawn {
                // No flip: every double buffer keeps publishing its current half.
                publish_current(graph, uniforms, current);
                return Err(err);
            }
            uniforms.set_texture(&name, write.handle());
        }

        self.ping_pong.flip();
        self.flips += 1;
        Ok(())
    }

    /// Copies `texture` to the screen as its own frame.
    pub fn present_texture<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        texture: TargetHandle,
        uniforms: &mut UniformTable,
        viewport: Extent,
    ) -> SandboxResult<()> {
        uniforms.set_resolution(viewport);
        backend.begin_frame()?;
        let drawn = backend.blit(texture, uniforms, DrawTarget::new(Output::Screen, true));
        let ended = backend.end_frame();
        drawn?;
        ended?;
        Ok(())
    }

    /// Starts the next frame reading half 0 of every double buffer.
    pub fn reset_ping_pong(&mut self) {
        self.ping_pong = PingPong::default();
    }
}

fn publish_current(graph: &PassGraph, uniforms: &mut UniformTable, current: usize) {
    for pass in graph.double_buffers() {
        if let Some(name) = pass.kind().uniform_name() {
            uniforms.set_texture(&name, pass.texture(current));
        }
    }
}
