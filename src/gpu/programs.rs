// ============================================================================
// PROGRAM CACHE — one render pipeline per effect id, compiled on first use
// ============================================================================
//
// Compiling an effect = validate the assembled WGSL with naga, then create the
// shader module and pipeline inside a validation error scope.  Failures are
// remembered per id so the diagnostic is logged once and a broken effect is
// not recompiled every frame.

use std::collections::HashMap;

use crate::effects::{EffectId, ResolvedEffect};

use super::shaders::{self, FS_EFFECT_ENTRY, VS_ENTRY};
use super::texture::{Quad, TEXTURE_FORMAT};
use super::uniforms::UniformLayout;

/// Parse and validate a WGSL module.  The error carries naga's diagnostic.
pub fn validate_wgsl(source: &str) -> Result<naga::Module, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| format!("WGSL parse failed: {e}"))?;
    naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::empty())
        .validate(&module)
        .map_err(|e| format!("WGSL validation failed: {e:?}"))?;
    Ok(module)
}

pub struct CompiledProgram {
    pub pipeline: wgpu::RenderPipeline,
    pub layout: UniformLayout,
}

pub struct ProgramCache {
    vertex_module: wgpu::ShaderModule,
    uniform_bgl: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    programs: HashMap<EffectId, CompiledProgram>,
    failures: HashMap<EffectId, String>,
}

impl ProgramCache {
    pub fn new(device: &wgpu::Device, texture_bgl: &wgpu::BindGroupLayout) -> Self {
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad_vertex_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::VERTEX_SHADER.into()),
        });

        // Group 0: the effect's uniform block.
        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect_uniform_bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("effect_pipeline_layout"),
            bind_group_layouts: &[&uniform_bgl, texture_bgl],
            push_constant_ranges: &[],
        });

        Self {
            vertex_module,
            uniform_bgl,
            pipeline_layout,
            programs: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    pub fn vertex_module(&self) -> &wgpu::ShaderModule {
        &self.vertex_module
    }

    pub fn uniform_bgl(&self) -> &wgpu::BindGroupLayout {
        &self.uniform_bgl
    }

    pub fn is_compiled(&self, id: &str) -> bool {
        self.programs.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&CompiledProgram> {
        self.programs.get(id)
    }

    pub fn failure(&self, id: &str) -> Option<&str> {
        self.failures.get(id).map(String::as_str)
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &EffectId> {
        self.failures.keys()
    }

    /// Allow a failed effect to be compiled again on next use.
    pub fn forget_failure(&mut self, id: &str) -> bool {
        self.failures.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Compile `effect` if it isn't already.  Never panics on bad source:
    /// returns `false`, logs the diagnostic, and remembers the failure.
    pub fn ensure_compiled(&mut self, device: &wgpu::Device, effect: &ResolvedEffect) -> bool {
        let id = &effect.descriptor.id;
        if self.programs.contains_key(id) {
            return true;
        }
        if self.failures.contains_key(id) {
            return false;
        }
        match self.compile(device, effect) {
            Ok(program) => {
                tracing::debug!(effect = %id, "effect compiled");
                self.programs.insert(id.clone(), program);
                true
            }
            Err(diagnostic) => {
                tracing::warn!(effect = %id, "effect failed to compile:\n{diagnostic}");
                self.failures.insert(id.clone(), diagnostic);
                false
            }
        }
    }

    fn compile(&self, device: &wgpu::Device, effect: &ResolvedEffect) -> Result<CompiledProgram, String> {
        let layout = UniformLayout::for_effect(&effect.descriptor);
        let source = shaders::assemble_effect(&layout, &effect.source);
        validate_wgsl(&source)?;

        let label = format!("effect_{}", effect.descriptor.id);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&label),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex_module,
                entry_point: VS_ENTRY,
                buffers: &[Quad::layout()],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: FS_EFFECT_ENTRY,
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(format!("pipeline creation failed: {err}"));
        }
        Ok(CompiledProgram { pipeline, layout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_reports_diagnostics() {
        let err = validate_wgsl("fn broken( {").unwrap_err();
        assert!(err.contains("parse"));
        assert!(validate_wgsl("fn ok() -> f32 { return 1.0; }").is_ok());
    }
}
