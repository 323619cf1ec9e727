//! GLSL fragment programs: parsing, reflection and pipeline creation.
//!
//! Pass shaders are GLSL 450 fragment shaders. naga's GLSL front end parses
//! them with the variant's symbols as preprocessor defines, so the directive
//! blocks select the pass. Resources are matched to the uniform table by name:
//!
//! ```glsl
//! #version 450
//! layout(set = 0, binding = 0) uniform Frame {
//!     vec2 u_resolution;
//!     float u_time;
//!     int u_frame;
//! };
//! layout(set = 0, binding = 1) uniform texture2D u_buffer0;
//! layout(set = 0, binding = 2) uniform sampler u_buffer0_sampler;
//! layout(location = 0) in vec2 v_texcoord;
//! layout(location = 0) out vec4 fragColor;
//! ```
//!
//! Block members take the table value of the same name. A `texture2D` takes
//! the target bound under its name, and `<name>_sampler` takes that target's
//! sampling. `v_texcoord` runs 0..1 with the origin at the top left, matching
//! `gl_FragCoord`.

use crate::error::BackendError;
use crate::gpu::GpuContext;
use crate::pass::ShaderVariant;
use crate::uniforms::{UniformTable, UniformValue};

/// Fullscreen triangle vertex stage plus the pass-through blit fragment.
pub(crate) const FULLSCREEN_WGSL: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
}

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> VertexOutput {
    let corner = vec2f(f32((vi << 1u) & 2u), f32(vi & 2u));
    var out: VertexOutput;
    out.position = vec4f(corner * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2f(corner.x, 1.0 - corner.y);
    return out;
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn blit(in: VertexOutput) -> @location(0) vec4f {
    return textureSample(source, source_sampler, in.uv);
}
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UniformMember {
    pub name: String,
    pub offset: u32,
    pub kind: MemberKind,
}

/// The uniform block a program reads its scalar and vector uniforms from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct UniformBlock {
    pub binding: u32,
    pub size: u32,
    pub members: Vec<UniformMember>,
}

/// Group 0 resources of a program, by binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ProgramLayout {
    pub block: Option<UniformBlock>,
    /// `(binding, texture uniform name)`
    pub textures: Vec<(u32, String)>,
    /// `(binding, name of the texture it samples)`
    pub samplers: Vec<(u32, String)>,
}

/// Parses `variant` as a GLSL fragment shader with its symbols defined.
pub(crate) fn parse_glsl(variant: &ShaderVariant) -> Result<naga::Module, BackendError> {
    let mut defines = naga::FastHashMap::default();
    for symbol in &variant.defines {
        defines.insert(symbol.clone(), String::new());
    }

    let options = naga::front::glsl::Options {
        stage: naga::ShaderStage::Fragment,
        defines,
    };
    let mut frontend = naga::front::glsl::Frontend::default();
    frontend.parse(&options, &variant.source).map_err(|errors| {
        BackendError::ShaderCompilationFailed(format!("GLSL parse error:\n{errors}"))
    })
}

/// Collects the group 0 resources of `module`.
///
/// Resources declared without a `binding` are given the next free binding in
/// group 0. Resources in other groups are ignored.
pub(crate) fn reflect(module: &mut naga::Module) -> ProgramLayout {
    let mut next_binding = module
        .global_variables
        .iter()
        .filter_map(|(_, var)| var.binding.as_ref())
        .filter(|b| b.group == 0)
        .map(|b| b.binding + 1)
        .max()
        .unwrap_or(0);

    let mut layout = ProgramLayout::default();
    for (_, var) in module.global_variables.iter_mut() {
        if !matches!(
            var.space,
            naga::AddressSpace::Uniform | naga::AddressSpace::Handle
        ) {
            continue;
        }
        let binding = *var.binding.get_or_insert_with(|| {
            let assigned = naga::ResourceBinding {
                group: 0,
                binding: next_binding,
            };
            next_binding += 1;
            assigned
        });
        let name = var.name.clone().unwrap_or_default();
        if binding.group != 0 {
            log::warn!("Ignoring '{name}' in bind group {}", binding.group);
            continue;
        }

        match &module.types[var.ty].inner {
            naga::TypeInner::Struct { members, span } => {
                if layout.block.is_some() {
                    log::warn!("Only one uniform block is supported, ignoring '{name}'");
                    continue;
                }
                let members = members
                    .iter()
                    .filter_map(|m| {
                        let kind = member_kind(&module.types[m.ty].inner)?;
                        Some(UniformMember {
                            name: m.name.clone()?,
                            offset: m.offset,
                            kind,
                        })
                    })
                    .collect();
                layout.block = Some(UniformBlock {
                    binding: binding.binding,
                    size: *span,
                    members,
                });
            }
            naga::TypeInner::Image { .. } => layout.textures.push((binding.binding, name)),
            naga::TypeInner::Sampler { .. } => {
                let texture = name.strip_suffix("_sampler").unwrap_or(&name).to_string();
                layout.samplers.push((binding.binding, texture));
            }
            other => log::warn!("Unsupported resource '{name}': {other:?}"),
        }
    }
    layout
}

fn member_kind(inner: &naga::TypeInner) -> Option<MemberKind> {
    use naga::{ScalarKind, TypeInner, VectorSize};

    match *inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Float => Some(MemberKind::Float),
            ScalarKind::Sint => Some(MemberKind::Int),
            _ => None,
        },
        TypeInner::Vector { size, scalar }
            if scalar.kind == ScalarKind::Float && scalar.width == 4 =>
        {
            Some(match size {
                VectorSize::Bi => MemberKind::Vec2,
                VectorSize::Tri => MemberKind::Vec3,
                VectorSize::Quad => MemberKind::Vec4,
            })
        }
        _ => None,
    }
}

/// Lays out the table values a block reads. Missing or mismatched members
/// stay zeroed.
pub(crate) fn pack_uniforms(block: &UniformBlock, uniforms: &UniformTable) -> Vec<u8> {
    let mut bytes = vec![0u8; block.size as usize];
    for member in &block.members {
        let Some(value) = uniforms.get(&member.name) else {
            continue;
        };
        let offset = member.offset as usize;
        match (member.kind, *value) {
            (MemberKind::Float, UniformValue::Float(v)) => put(&mut bytes, offset, &[v]),
            (MemberKind::Int, UniformValue::Int(v)) => {
                put(&mut bytes, offset, bytemuck::bytes_of(&v))
            }
            (MemberKind::Vec2, UniformValue::Vec2(v)) => put(&mut bytes, offset, &v.to_array()),
            (MemberKind::Vec3, UniformValue::Vec3(v)) => put(&mut bytes, offset, &v.to_array()),
            (MemberKind::Vec4, UniformValue::Vec4(v)) => put(&mut bytes, offset, &v.to_array()),
            (kind, value) => {
                log::debug!("Uniform '{}' is {value:?}, shader expects {kind:?}", member.name);
            }
        }
    }
    bytes
}

fn put<T: bytemuck::Pod>(bytes: &mut [u8], offset: usize, data: &[T]) {
    let data: &[u8] = bytemuck::cast_slice(data);
    if let Some(slot) = bytes.get_mut(offset..offset + data.len()) {
        slot.copy_from_slice(data);
    }
}

/// A compiled pass program with pipelines for off-screen and screen output.
pub(crate) struct Program {
    pub layout: ProgramLayout,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub uniform_buffer: Option<wgpu::Buffer>,
    pub target_pipeline: wgpu::RenderPipeline,
    pub screen_pipeline: wgpu::RenderPipeline,
}

impl Program {
    pub(crate) fn compile(
        gpu: &GpuContext,
        vertex: &wgpu::ShaderModule,
        variant: &ShaderVariant,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, BackendError> {
        let mut module = parse_glsl(variant)?;
        let layout = reflect(&mut module);

        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .map_err(|e| BackendError::ShaderCompilationFailed(format!("validation error: {e}")))?;
        let wgsl =
            naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
                .map_err(|e| {
                    BackendError::ShaderCompilationFailed(format!("WGSL generation error: {e}"))
                })?;

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Pass Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Pass Bind Group Layout"),
            entries: &layout_entries(&layout),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Pass Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let uniform_buffer = layout.block.as_ref().map(|block| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Pass Uniforms"),
                size: u64::from(block.size.max(16)),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        let target_pipeline = fullscreen_pipeline(
            device,
            &pipeline_layout,
            vertex,
            (&fragment, "main"),
            target_format,
        );
        let screen_pipeline = fullscreen_pipeline(
            device,
            &pipeline_layout,
            vertex,
            (&fragment, "main"),
            gpu.config.format,
        );

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(BackendError::ShaderCompilationFailed(error.to_string()));
        }

        Ok(Self {
            layout,
            bind_group_layout,
            uniform_buffer,
            target_pipeline,
            screen_pipeline,
        })
    }
}

fn layout_entries(layout: &ProgramLayout) -> Vec<wgpu::BindGroupLayoutEntry> {
    let mut entries = Vec::new();
    if let Some(block) = &layout.block {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: block.binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }
    for (binding, _) in &layout.textures {
        entries.push(texture_entry(*binding));
    }
    for (binding, _) in &layout.samplers {
        entries.push(sampler_entry(*binding));
    }
    entries
}

pub(crate) fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// A fullscreen-triangle pipeline writing one color target.
pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    (fragment, entry_point): (&wgpu::ShaderModule, &str),
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Fullscreen Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some(entry_point),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Extent;
    use glam::Vec2;
    use std::sync::Arc;

    const SHADER: &str = "\
#version 450
layout(set = 0, binding = 0) uniform Frame {
    vec2 u_resolution;
    float u_time;
    int u_frame;
};
layout(set = 0, binding = 1) uniform texture2D u_buffer0;
layout(set = 0, binding = 2) uniform sampler u_buffer0_sampler;
layout(location = 0) out vec4 fragColor;

void main() {
#ifdef BUFFER_0
    fragColor = vec4(u_time, 0.0, 0.0, 1.0);
#else
    vec2 st = gl_FragCoord.xy / u_resolution;
    fragColor = texture(sampler2D(u_buffer0, u_buffer0_sampler), st);
#endif
}
";

    fn variant(defines: &[&str]) -> ShaderVariant {
        ShaderVariant::new(
            Arc::from(SHADER),
            defines.iter().map(|d| d.to_string()).collect(),
        )
    }

    #[test]
    fn reflects_block_textures_and_samplers() {
        let mut module = parse_glsl(&variant(&[])).unwrap();
        let layout = reflect(&mut module);

        let block = layout.block.unwrap();
        assert_eq!(block.binding, 0);
        let names: Vec<_> = block.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["u_resolution", "u_time", "u_frame"]);
        assert_eq!(block.members[0].kind, MemberKind::Vec2);
        assert_eq!(block.members[2].kind, MemberKind::Int);

        assert_eq!(layout.textures, vec![(1, "u_buffer0".to_string())]);
        assert_eq!(layout.samplers, vec![(2, "u_buffer0".to_string())]);
    }

    #[test]
    fn defines_select_the_pass_body() {
        assert!(parse_glsl(&variant(&["BUFFER_0"])).is_ok());
        assert!(parse_glsl(&variant(&[])).is_ok());
    }

    #[test]
    fn invalid_glsl_is_a_compilation_error() {
        let broken = ShaderVariant::new(Arc::from("#version 450\nvoid main() { nope }"), vec![]);
        assert!(matches!(
            parse_glsl(&broken),
            Err(BackendError::ShaderCompilationFailed(_))
        ));
    }

    #[test]
    fn packs_values_at_member_offsets() {
        let block = UniformBlock {
            binding: 0,
            size: 16,
            members: vec![
                UniformMember {
                    name: "u_resolution".to_string(),
                    offset: 0,
                    kind: MemberKind::Vec2,
                },
                UniformMember {
                    name: "u_time".to_string(),
                    offset: 8,
                    kind: MemberKind::Float,
                },
                UniformMember {
                    name: "u_frame".to_string(),
                    offset: 12,
                    kind: MemberKind::Int,
                },
            ],
        };
        let mut table = UniformTable::new();
        table.set_resolution(Extent::new(640, 480));
        table.set("u_time", 1.5f32);
        table.set("u_frame", 7i32);

        let bytes = pack_uniforms(&block, &table);
        let float_at = |at: usize| bytemuck::pod_read_unaligned::<f32>(&bytes[at..at + 4]);
        assert_eq!(Vec2::new(float_at(0), float_at(4)), Vec2::new(640.0, 480.0));
        assert_eq!(float_at(8), 1.5);
        let frame: i32 = bytemuck::pod_read_unaligned(&bytes[12..16]);
        assert_eq!(frame, 7);
    }

    #[test]
    fn mismatched_members_stay_zero() {
        let block = UniformBlock {
            binding: 0,
            size: 8,
            members: vec![UniformMember {
                name: "u_time".to_string(),
                offset: 4,
                kind: MemberKind::Vec4,
            }],
        };
        let bytes = pack_uniforms(&block, &UniformTable::new());
        assert!(bytes.iter().all(|b| *b == 0));
    }
}
