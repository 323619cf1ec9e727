//! Host 3-D scenes drawn in the main slot.

use crate::camera::Camera;
use crate::gpu::GpuContext;
use crate::uniforms::UniformTable;

/// Everything a scene needs to record one draw.
///
/// References are tied to the current draw; a scene cannot keep them.
pub struct RenderContext<'a> {
    /// Access to device, queue, and surface configuration.
    pub gpu: &'a GpuContext,
    /// Encoder the scene appends its render pass to.
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Camera the scene is viewed through.
    pub camera: &'a Camera,
    /// The sandbox uniforms, including `u_time` and `u_resolution`.
    pub uniforms: &'a UniformTable,
    /// Format of `target`, for pipeline selection.
    pub format: wgpu::TextureFormat,
    /// Pixel size of `target`.
    pub size: (u32, u32),
}

impl RenderContext<'_> {
    pub fn aspect(&self) -> f32 {
        self.size.0 as f32 / self.size.1.max(1) as f32
    }
}

/// A host scene rendered by [`Sandbox::render_scene`](crate::Sandbox::render_scene).
///
/// Implementations begin their own render pass on `ctx.encoder` targeting
/// `target` with the given `load` operation:
///
/// ```ignore
/// struct Teapot { pipeline: wgpu::RenderPipeline, /* ... */ }
///
/// impl SceneNode for Teapot {
///     fn render(&self, ctx: &mut RenderContext, target: &wgpu::TextureView, load: wgpu::LoadOp<wgpu::Color>) {
///         let mut pass = ctx.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
///             color_attachments: &[Some(wgpu::RenderPassColorAttachment {
///                 view: target,
///                 ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
///                 // ...
///             })],
///             // ...
///         });
///         pass.set_pipeline(&self.pipeline);
///         pass.draw(0..36, 0..1);
///     }
/// }
/// ```
///
/// `load` preserves what a background pass drew underneath the scene.
pub trait SceneNode {
    fn render(
        &self,
        ctx: &mut RenderContext<'_>,
        target: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
    );
}
