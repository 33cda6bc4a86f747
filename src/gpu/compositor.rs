// ============================================================================
// COMPOSITOR — pass encoding, scissored split blits, readback
// ============================================================================
//
// Every pass is the same shape: bind one input texture, draw the fixed quad
// into one output view with hardware blending disabled.  Effect passes use
// the effect's own pipeline; identity and split passes use the blit pipeline.

use wgpu::util::DeviceExt;

use crate::error::{EngineError, EngineResult};

use super::context::GpuContext;
use super::programs::CompiledProgram;
use super::shaders::{self, FS_BLIT_ENTRY, VS_ENTRY};
use super::texture::{Quad, TEXTURE_FORMAT};

/// A cached uniform buffer + bind group, reused across frames.
struct UniformSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: u64,
}

pub struct Compositor {
    blit_pipeline: wgpu::RenderPipeline,
    quad: Quad,
    /// One slot per pass index.  All passes of a frame are recorded into one
    /// encoder, so each needs its own buffer until the submit.
    uniform_slots: Vec<UniformSlot>,
    /// Cached staging buffer for readback.
    cached_staging: Option<(wgpu::Buffer, u64)>,
}

impl Compositor {
    pub fn new(
        device: &wgpu::Device,
        vertex_module: &wgpu::ShaderModule,
        texture_bgl: &wgpu::BindGroupLayout,
    ) -> Self {
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::BLIT_SHADER.into()),
        });

        let blit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit_pipeline_layout"),
            bind_group_layouts: &[texture_bgl],
            push_constant_ranges: &[],
        });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blit_pipeline"),
            layout: Some(&blit_layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
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
                module: &blit_shader,
                entry_point: FS_BLIT_ENTRY,
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        Self {
            blit_pipeline,
            quad: Quad::new(device),
            uniform_slots: Vec::new(),
            cached_staging: None,
        }
    }

    fn begin_pass<'e>(encoder: &'e mut wgpu::CommandEncoder, output: &'e wgpu::TextureView, label: &str) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    /// Write `data` into uniform slot `index`, growing or replacing the slot
    /// if it is missing or too small.
    fn uniform_slot(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        uniform_bgl: &wgpu::BindGroupLayout,
        index: usize,
        data: &[f32],
    ) -> &wgpu::BindGroup {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as u64;
        let fits = self.uniform_slots.get(index).map(|s| s.capacity >= size).unwrap_or(false);
        if fits {
            queue.write_buffer(&self.uniform_slots[index].buffer, 0, bytes);
        } else {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("effect_uniform_buf"),
                contents: bytes,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("effect_uniform_bg"),
                layout: uniform_bgl,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            let slot = UniformSlot { buffer, bind_group, capacity: size };
            if index < self.uniform_slots.len() {
                self.uniform_slots[index] = slot;
            } else {
                self.uniform_slots.push(slot);
            }
        }
        &self.uniform_slots[index].bind_group
    }

    /// Record one effect pass: `input` → `program` → `output`.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_effect_pass(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        uniform_bgl: &wgpu::BindGroupLayout,
        pass_index: usize,
        program: &CompiledProgram,
        uniforms: &[f32],
        input: &wgpu::BindGroup,
        output: &wgpu::TextureView,
    ) {
        // Slots are only ever appended in pass order.
        let index = pass_index.min(self.uniform_slots.len());
        self.uniform_slot(&ctx.device, &ctx.queue, uniform_bgl, index, uniforms);
        let uniform_bg = &self.uniform_slots[index].bind_group;

        let mut pass = Self::begin_pass(encoder, output, "effect_pass");
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, uniform_bg, &[]);
        pass.set_bind_group(1, input, &[]);
        pass.set_vertex_buffer(0, self.quad.buffer.slice(..));
        pass.draw(0..Quad::VERTEX_COUNT, 0..1);
    }

    /// Record a straight copy of `input` onto `output`.
    pub fn encode_blit(&self, encoder: &mut wgpu::CommandEncoder, input: &wgpu::BindGroup, output: &wgpu::TextureView) {
        let mut pass = Self::begin_pass(encoder, output, "blit_pass");
        pass.set_pipeline(&self.blit_pipeline);
        pass.set_bind_group(0, input, &[]);
        pass.set_vertex_buffer(0, self.quad.buffer.slice(..));
        pass.draw(0..Quad::VERTEX_COUNT, 0..1);
    }

    /// Record a split view: columns `[0, split_x)` from `left`, columns
    /// `[split_x, width)` from `right`.  Zero-width halves are not drawn.
    #[allow(clippy::too_many_arguments)]
    pub fn encode_split(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        left: &wgpu::BindGroup,
        right: &wgpu::BindGroup,
        output: &wgpu::TextureView,
        split_x: u32,
        width: u32,
        height: u32,
    ) {
        let split_x = split_x.min(width);
        let mut pass = Self::begin_pass(encoder, output, "split_pass");
        pass.set_pipeline(&self.blit_pipeline);
        pass.set_vertex_buffer(0, self.quad.buffer.slice(..));
        if split_x > 0 {
            pass.set_scissor_rect(0, 0, split_x, height);
            pass.set_bind_group(0, left, &[]);
            pass.draw(0..Quad::VERTEX_COUNT, 0..1);
        }
        if split_x < width {
            pass.set_scissor_rect(split_x, 0, width - split_x, height);
            pass.set_bind_group(0, right, &[]);
            pass.draw(0..Quad::VERTEX_COUNT, 0..1);
        }
    }

    /// Read back a texture as tightly packed RGBA rows, top row first.
    pub fn readback_texture(
        &mut self,
        ctx: &GpuContext,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
    ) -> EngineResult<Vec<u8>> {
        let device = &ctx.device;
        let queue = &ctx.queue;

        let bytes_per_row = aligned_bytes_per_row(width);
        let buffer_size = (bytes_per_row * height) as u64;

        let need_new = !matches!(&self.cached_staging, Some((_, sz)) if *sz >= buffer_size);
        if need_new {
            let new_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_staging"),
                size: buffer_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.cached_staging = Some((new_buf, buffer_size));
        }
        let Some((staging, _)) = self.cached_staging.as_ref() else {
            return Err(EngineError::Readback("staging buffer missing".into()));
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..buffer_size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(EngineError::Readback(format!("map failed: {e:?}"))),
            Err(e) => return Err(EngineError::Readback(format!("map callback dropped: {e}"))),
        }

        let mapped = slice.get_mapped_range();
        let actual_row = (width * 4) as usize;
        let mut result = Vec::with_capacity(actual_row * height as usize);
        for y in 0..height as usize {
            let start = y * bytes_per_row as usize;
            result.extend_from_slice(&mapped[start..start + actual_row]);
        }
        drop(mapped);
        staging.unmap();

        Ok(result)
    }
}

/// wgpu requires `bytes_per_row` of buffer copies to be a multiple of 256.
pub(crate) fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// The divider column for a split fraction: `floor(f * width)`, clamped.
pub fn split_column(fraction: f32, width: u32) -> u32 {
    let f = if fraction.is_nan() { 0.5 } else { fraction.clamp(0.0, 1.0) };
    ((f * width as f32).floor() as u32).min(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_aligned_to_256_bytes() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }

    #[test]
    fn split_column_is_floored_and_clamped() {
        assert_eq!(split_column(0.0, 100), 0);
        assert_eq!(split_column(1.0, 100), 100);
        assert_eq!(split_column(0.505, 100), 50);
        assert_eq!(split_column(-2.0, 100), 0);
        assert_eq!(split_column(7.0, 100), 100);
        assert_eq!(split_column(f32::NAN, 10), 5);
    }
}
