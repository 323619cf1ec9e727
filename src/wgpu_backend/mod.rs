//! [`RenderBackend`] implementation over wgpu.
//!
//! Each draw is recorded into its own command encoder and submitted
//! immediately, so uniform buffer writes land between draws and every pass
//! observes the targets written before it.

mod program;
mod scene;
mod target;

use std::collections::{HashMap, HashSet};

use crate::backend::{
    BackendCapabilities, ColorPrecision, DrawTarget, Extent, FilterMode, LoadAction, Output,
    ProgramHandle, RenderBackend, Sampling, TargetDescriptor, TargetHandle, WrapMode,
};
use crate::camera::Camera;
use crate::error::BackendError;
use crate::gpu::GpuContext;
use crate::pass::ShaderVariant;
use crate::render_target::negotiate_precision;
use crate::uniforms::{UniformTable, UniformValue};

use program::{FULLSCREEN_WGSL, Program, fullscreen_pipeline, pack_uniforms};
pub use scene::{RenderContext, SceneNode};
use target::{GpuTarget, Samplers, texture_format};

struct Frame {
    surface: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

struct Blit {
    bind_group_layout: wgpu::BindGroupLayout,
    target_pipeline: wgpu::RenderPipeline,
    screen_pipeline: wgpu::RenderPipeline,
}

/// Renders sandbox passes with wgpu onto a window surface.
pub struct WgpuBackend {
    gpu: GpuContext,
    target_format: wgpu::TextureFormat,
    vertex: wgpu::ShaderModule,
    blit: Blit,
    samplers: Samplers,
    placeholder: GpuTarget,
    targets: HashMap<TargetHandle, GpuTarget>,
    programs: HashMap<ProgramHandle, Program>,
    frame: Option<Frame>,
    warned: HashSet<(ProgramHandle, String)>,
    clear_color: wgpu::Color,
    next_id: u64,
}

impl WgpuBackend {
    pub fn new(gpu: GpuContext) -> Self {
        // Missing float support is reported by the sandbox; any format works here.
        let precision =
            negotiate_precision(&gpu.capabilities()).unwrap_or(ColorPrecision::HalfFloat);
        let target_format = texture_format(precision);
        let device = &gpu.device;

        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Fullscreen Shader"),
            source: wgpu::ShaderSource::Wgsl(FULLSCREEN_WGSL.into()),
        });
        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
            entries: &[program::texture_entry(0), program::sampler_entry(1)],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&blit_layout],
            push_constant_ranges: &[],
        });
        let blit = Blit {
            target_pipeline: fullscreen_pipeline(
                device,
                &pipeline_layout,
                &vertex,
                (&vertex, "blit"),
                target_format,
            ),
            screen_pipeline: fullscreen_pipeline(
                device,
                &pipeline_layout,
                &vertex,
                (&vertex, "blit"),
                gpu.config.format,
            ),
            bind_group_layout: blit_layout,
        };

        let placeholder = GpuTarget::new(
            device,
            "Placeholder",
            Extent::new(1, 1),
            target_format,
            Sampling {
                filter: FilterMode::Nearest,
                wrap: WrapMode::ClampToEdge,
            },
        );
        let samplers = Samplers::new(device);

        Self {
            gpu,
            target_format,
            vertex,
            blit,
            samplers,
            placeholder,
            targets: HashMap::new(),
            programs: HashMap::new(),
            frame: None,
            warned: HashSet::new(),
            clear_color: wgpu::Color::TRANSPARENT,
            next_id: 1,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    /// Reconfigures the window surface. Call alongside
    /// [`Sandbox::set_size`](crate::Sandbox::set_size).
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.gpu.resize(width, height);
    }

    /// Color that clearing passes start from.
    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn load_op(&self, load: LoadAction) -> wgpu::LoadOp<wgpu::Color> {
        match load {
            LoadAction::Clear => wgpu::LoadOp::Clear(self.clear_color),
            LoadAction::Load => wgpu::LoadOp::Load,
        }
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.gpu.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// View, format and size of a draw destination.
fn output_view<'a>(
    output: Output,
    targets: &'a HashMap<TargetHandle, GpuTarget>,
    frame: &'a Option<Frame>,
    gpu: &GpuContext,
) -> Result<(&'a wgpu::TextureView, wgpu::TextureFormat, Extent), BackendError> {
    match output {
        Output::Screen => {
            let frame = frame.as_ref().ok_or(BackendError::NoFrameInProgress)?;
            Ok((
                &frame.view,
                gpu.config.format,
                Extent::new(gpu.width(), gpu.height()),
            ))
        }
        Output::Target(handle) => {
            let target = targets
                .get(&handle)
                .ok_or(BackendError::UnknownTarget(handle.id()))?;
            Ok((&target.view, target.texture.format(), target.size))
        }
    }
}

/// The target bound to texture uniform `name`, or the placeholder when it is
/// unbound or is the draw's own destination.
fn bound_texture<'a>(
    name: &str,
    uniforms: &UniformTable,
    destination: Option<TargetHandle>,
    targets: &'a HashMap<TargetHandle, GpuTarget>,
    placeholder: &'a GpuTarget,
    warned: &mut HashSet<(ProgramHandle, String)>,
    program: ProgramHandle,
) -> &'a GpuTarget {
    let mut warn_once = |reason: &str| {
        if warned.insert((program, name.to_string())) {
            log::warn!("Texture '{name}' {reason}; sampling a placeholder");
        }
    };
    match uniforms.get(name) {
        Some(UniformValue::Texture(Some(handle))) if Some(*handle) == destination => {
            warn_once("is the pass's own output");
            placeholder
        }
        Some(UniformValue::Texture(Some(handle))) => match targets.get(handle) {
            Some(target) => target,
            None => {
                warn_once("refers to a released target");
                placeholder
            }
        },
        _ => {
            warn_once("is not bound");
            placeholder
        }
    }
}

fn color_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

impl RenderBackend for WgpuBackend {
    type Scene = dyn SceneNode;
    type Camera = Camera;

    fn capabilities(&self) -> BackendCapabilities {
        self.gpu.capabilities()
    }

    fn begin_frame(&mut self) -> Result<(), BackendError> {
        if self.frame.is_some() {
            return Ok(());
        }
        let surface = match self.gpu.surface.get_current_texture() {
            Ok(surface) => surface,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost, reconfiguring");
                self.gpu
                    .surface
                    .configure(&self.gpu.device, &self.gpu.config);
                self.gpu
                    .surface
                    .get_current_texture()
                    .map_err(|e| BackendError::SurfaceUnavailable(e.to_string()))?
            }
            Err(e) => return Err(BackendError::SurfaceUnavailable(e.to_string())),
        };
        let view = surface
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(Frame { surface, view });
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), BackendError> {
        let frame = self.frame.take().ok_or(BackendError::NoFrameInProgress)?;
        frame.surface.present();
        Ok(())
    }

    fn create_target(&mut self, desc: &TargetDescriptor) -> Result<TargetHandle, BackendError> {
        let format = texture_format(desc.precision);
        if format != self.target_format {
            return Err(BackendError::TargetCreationFailed(format!(
                "{:?} targets requested but pipelines were built for {:?}",
                desc.precision, self.target_format
            )));
        }
        let handle = TargetHandle::new(self.next_id());
        let target = GpuTarget::new(
            &self.gpu.device,
            &desc.label,
            desc.size,
            format,
            desc.sampling,
        );
        self.targets.insert(handle, target);
        Ok(handle)
    }

    fn resize_target(&mut self, target: TargetHandle, size: Extent) -> Result<(), BackendError> {
        let gpu_target = self
            .targets
            .get_mut(&target)
            .ok_or(BackendError::UnknownTarget(target.id()))?;
        gpu_target.resize(&self.gpu.device, size);
        Ok(())
    }

    fn destroy_target(&mut self, target: TargetHandle) {
        self.targets.remove(&target);
    }

    fn compile_program(&mut self, variant: &ShaderVariant) -> Result<ProgramHandle, BackendError> {
        let program = Program::compile(&self.gpu, &self.vertex, variant, self.target_format)?;
        let handle = ProgramHandle::new(self.next_id());
        log::debug!(
            "Compiled program {} ({:?}): {} textures",
            handle.id(),
            variant.defines,
            program.layout.textures.len()
        );
        self.programs.insert(handle, program);
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(&program);
        self.warned.retain(|(p, _)| *p != program);
    }

    fn draw_quad(
        &mut self,
        program: ProgramHandle,
        uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError> {
        let load = self.load_op(target.load);
        let mut encoder = self.encoder("Pass Encoder");
        {
            let Self {
                gpu,
                programs,
                targets,
                samplers,
                placeholder,
                frame,
                warned,
                ..
            } = &mut *self;

            let compiled = programs
                .get(&program)
                .ok_or(BackendError::UnknownProgram(program.id()))?;
            let (view, _, _) = output_view(target.output, targets, frame, gpu)?;
            let destination = match target.output {
                Output::Target(handle) => Some(handle),
                Output::Screen => None,
            };

            let mut entries = Vec::new();
            if let (Some(block), Some(buffer)) = (&compiled.layout.block, &compiled.uniform_buffer)
            {
                gpu.queue
                    .write_buffer(buffer, 0, &pack_uniforms(block, uniforms));
                entries.push(wgpu::BindGroupEntry {
                    binding: block.binding,
                    resource: buffer.as_entire_binding(),
                });
            }
            for (binding, name) in &compiled.layout.textures {
                let bound = bound_texture(
                    name,
                    uniforms,
                    destination,
                    targets,
                    placeholder,
                    warned,
                    program,
                );
                entries.push(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: wgpu::BindingResource::TextureView(&bound.view),
                });
            }
            for (binding, name) in &compiled.layout.samplers {
                let bound = bound_texture(
                    name,
                    uniforms,
                    destination,
                    targets,
                    placeholder,
                    warned,
                    program,
                );
                entries.push(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: wgpu::BindingResource::Sampler(samplers.get(bound.sampling)),
                });
            }

            let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Pass Bind Group"),
                layout: &compiled.bind_group_layout,
                entries: &entries,
            });
            let pipeline = match target.output {
                Output::Screen => &compiled.screen_pipeline,
                Output::Target(_) => &compiled.target_pipeline,
            };

            let mut pass = color_pass(&mut encoder, "Pass", view, load);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.submit(encoder);
        Ok(())
    }

    fn draw_scene(
        &mut self,
        scene: &dyn SceneNode,
        camera: &Camera,
        uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError> {
        let load = self.load_op(target.load);
        let mut encoder = self.encoder("Scene Encoder");
        {
            let (view, format, size) =
                output_view(target.output, &self.targets, &self.frame, &self.gpu)?;
            let mut ctx = RenderContext {
                gpu: &self.gpu,
                encoder: &mut encoder,
                camera,
                uniforms,
                format,
                size: (size.width, size.height),
            };
            scene.render(&mut ctx, view, load);
        }
        self.submit(encoder);
        Ok(())
    }

    fn blit(
        &mut self,
        source: TargetHandle,
        _uniforms: &UniformTable,
        target: DrawTarget,
    ) -> Result<(), BackendError> {
        let load = self.load_op(target.load);
        let mut encoder = self.encoder("Blit Encoder");
        {
            let (view, _, _) = output_view(target.output, &self.targets, &self.frame, &self.gpu)?;
            let input = if target.output == Output::Target(source) {
                log::warn!("Blit source is its own destination; sampling a placeholder");
                &self.placeholder
            } else {
                self.targets
                    .get(&source)
                    .ok_or(BackendError::UnknownTarget(source.id()))?
            };
            let bind_group = self
                .gpu
                .device
                .create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Blit Bind Group"),
                    layout: &self.blit.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&input.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(
                                self.samplers.get(input.sampling),
                            ),
                        },
                    ],
                });
            let pipeline = match target.output {
                Output::Screen => &self.blit.screen_pipeline,
                Output::Target(_) => &self.blit.target_pipeline,
            };

            let mut pass = color_pass(&mut encoder, "Blit", view, load);
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.submit(encoder);
        Ok(())
    }

    fn clear(&mut self, output: Output) -> Result<(), BackendError> {
        let load = self.load_op(LoadAction::Clear);
        let mut encoder = self.encoder("Clear Encoder");
        {
            let (view, _, _) = output_view(output, &self.targets, &self.frame, &self.gpu)?;
            color_pass(&mut encoder, "Clear", view, load);
        }
        self.submit(encoder);
        Ok(())
    }
}
