// ============================================================================
// GPU RENDERER — the compositing engine
// ============================================================================
//
// Owns the source texture (at working resolution), the two ping-pong targets,
// and the visible surface.  Every entry point resolves + compiles the enabled
// layers first, plans the ping-pong walk over the runnable ones, records all
// passes into one encoder, and submits once.

use std::sync::Arc;

use image::RgbaImage;

use crate::components::layers::{Layer, LayerId};
use crate::effects::{EffectDescriptor, EffectId, EffectRegistry};
use crate::error::{EngineError, EngineResult};
use crate::io::fit_within;
use crate::ops::batch::FrameRenderer;

use super::compositor::{split_column, Compositor};
use super::context::GpuContext;
use super::plan::{final_slot, plan_passes, ChainEnd, PlannedPass, Slot};
use super::pool::RenderTargetPool;
use super::programs::ProgramCache;
use super::texture::{linear_clamp_sampler, texture_bind_group_layout, GpuTexture};
use super::uniforms::PassInputs;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No source image loaded; render calls do nothing.
    Empty,
    Ready,
    /// The device is gone; every call fails with `DeviceLost`.
    Lost,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    UnknownEffect,
    CompileFailed,
}

/// A layer that was enabled but contributed nothing to the frame.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedLayer {
    pub layer_id: LayerId,
    pub effect: EffectId,
    pub reason: SkipReason,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderReport {
    /// Effect passes actually executed.
    pub passes: usize,
    pub skipped: Vec<SkippedLayer>,
    pub width: u32,
    pub height: u32,
    /// The split view reused a cached composite.
    pub cached: bool,
}

impl RenderReport {
    pub fn is_degraded(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// An enabled layer whose effect resolved and compiled.
struct Runnable {
    index: usize,
    descriptor: Arc<EffectDescriptor>,
}

/// What a cached split composite was rendered from.
#[derive(PartialEq)]
struct SplitKey {
    chain: Vec<Layer>,
    generation: u64,
    dims: (u32, u32),
}

struct SplitCache {
    key: SplitKey,
    composite: Slot,
}

/// Source, targets, and surface.  Kept together so a `Slot` can be turned
/// into a texture while the compositor is borrowed mutably.
struct Textures {
    source: Option<GpuTexture>,
    targets: RenderTargetPool,
    surface: Option<GpuTexture>,
}

impl Textures {
    fn slot(&self, slot: Slot) -> EngineResult<&GpuTexture> {
        match slot {
            Slot::Source => self.source.as_ref().ok_or(EngineError::NoSource),
            Slot::Target(i) => self.targets.get(i).ok_or(EngineError::MissingResource("render target")),
            Slot::Surface => self.surface.as_ref().ok_or(EngineError::MissingResource("surface")),
        }
    }

    fn surface_dims(&self) -> Option<(u32, u32)> {
        self.surface.as_ref().map(|s| s.dims())
    }
}

pub struct GpuRenderer {
    ctx: GpuContext,
    registry: EffectRegistry,
    programs: ProgramCache,
    compositor: Compositor,
    texture_bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: Textures,
    /// Full-resolution original, kept for export and working-size changes.
    source_image: Option<RgbaImage>,
    preview_max_dim: u32,
    /// Bumped on every source upload; invalidates the split cache.
    generation: u64,
    split_cache: Option<SplitCache>,
}

impl GpuRenderer {
    /// Create a GPU context and an engine on top of it.
    pub fn try_new(preferred_gpu: &str, registry: EffectRegistry, preview_max_dim: u32) -> EngineResult<Self> {
        let ctx = GpuContext::new(preferred_gpu)?;
        Ok(Self::new(ctx, registry, preview_max_dim))
    }

    pub fn new(ctx: GpuContext, registry: EffectRegistry, preview_max_dim: u32) -> Self {
        let device = &ctx.device;
        let texture_bgl = texture_bind_group_layout(device);
        let sampler = linear_clamp_sampler(device);
        let programs = ProgramCache::new(device, &texture_bgl);
        let compositor = Compositor::new(device, programs.vertex_module(), &texture_bgl);
        Self {
            ctx,
            registry,
            programs,
            compositor,
            texture_bgl,
            sampler,
            textures: Textures { source: None, targets: RenderTargetPool::new(), surface: None },
            source_image: None,
            preview_max_dim,
            generation: 0,
            split_cache: None,
        }
    }

    pub fn state(&self) -> EngineState {
        if self.ctx.is_lost() {
            EngineState::Lost
        } else if self.textures.source.is_none() {
            EngineState::Empty
        } else {
            EngineState::Ready
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    /// Mutable registry access (e.g. to retry a failed custom effect).
    pub fn registry_mut(&mut self) -> &mut EffectRegistry {
        self.split_cache = None;
        &mut self.registry
    }

    pub fn programs(&self) -> &ProgramCache {
        &self.programs
    }

    pub fn programs_mut(&mut self) -> &mut ProgramCache {
        self.split_cache = None;
        &mut self.programs
    }

    /// Current output resolution, `None` while empty.
    pub fn working_size(&self) -> Option<(u32, u32)> {
        self.textures.surface_dims()
    }

    pub fn source_size(&self) -> Option<(u32, u32)> {
        self.source_image.as_ref().map(|i| i.dimensions())
    }

    pub fn target_reallocations(&self) -> u64 {
        self.textures.targets.reallocations()
    }

    // ========================================================================
    // SOURCE + WORKING RESOLUTION
    // ========================================================================

    /// Load a new source image.  The working resolution is the image
    /// downscaled to fit `preview_max_dim` (never upscaled).
    pub fn load_source(&mut self, image: RgbaImage) -> EngineResult<()> {
        self.ctx.check_alive()?;
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(EngineError::EmptyImage);
        }
        let (ww, wh) = fit_within(w, h, self.preview_max_dim);
        self.source_image = Some(image);
        self.set_working_size(ww, wh)?;
        tracing::info!(width = w, height = h, working_width = ww, working_height = wh, "source loaded");
        Ok(())
    }

    /// Change the preview cap; re-derives the working resolution if a
    /// source is loaded.
    pub fn set_preview_max_dim(&mut self, max_dim: u32) -> EngineResult<()> {
        if max_dim == self.preview_max_dim {
            return Ok(());
        }
        self.preview_max_dim = max_dim;
        match self.source_size() {
            Some((w, h)) => {
                let (ww, wh) = fit_within(w, h, max_dim);
                self.set_working_size(ww, wh)
            }
            None => Ok(()),
        }
    }

    /// Resample the source to exactly `width x height` and resize the
    /// targets and surface to match.
    pub fn set_working_size(&mut self, width: u32, height: u32) -> EngineResult<()> {
        self.ctx.check_alive()?;
        if width == 0 || height == 0 {
            return Err(EngineError::EmptyImage);
        }
        if !self.ctx.supports_size(width, height) {
            return Err(EngineError::TooLarge { width, height, max: self.ctx.max_texture_dim });
        }
        let Some(original) = self.source_image.as_ref() else {
            return Err(EngineError::NoSource);
        };

        let device = &self.ctx.device;
        let resampled;
        let pixels: &RgbaImage = if original.dimensions() == (width, height) {
            original
        } else {
            resampled = image::imageops::resize(original, width, height, image::imageops::FilterType::Triangle);
            &resampled
        };
        // Pending uploads into the old textures stay valid; wgpu refcounts them.
        self.textures.source = None;
        self.textures.surface = None;
        self.textures.source = Some(GpuTexture::from_rgba(
            device,
            &self.ctx.queue,
            &self.texture_bgl,
            &self.sampler,
            width,
            height,
            pixels.as_raw(),
            "source",
        ));
        self.textures.surface = Some(GpuTexture::new(device, &self.texture_bgl, &self.sampler, width, height, "surface"));
        self.textures.targets.ensure_sized(device, &self.texture_bgl, &self.sampler, width, height);
        self.generation += 1;
        self.split_cache = None;
        Ok(())
    }

    // ========================================================================
    // RENDER ENTRY POINTS
    // ========================================================================

    /// Composite the enabled layers onto the surface.  With nothing
    /// runnable the source is blitted through unchanged.
    pub fn render(&mut self, layers: &[Layer]) -> EngineResult<RenderReport> {
        self.ctx.check_alive()?;
        let Some((width, height)) = self.ready_dims() else {
            return Ok(RenderReport::default());
        };
        self.split_cache = None;
        let (runnable, skipped) = self.prepare(layers);
        let passes = plan_passes(runnable.len(), ChainEnd::Surface);

        let mut encoder = self.encoder("render_encoder");
        if passes.is_empty() {
            let source = self.textures.slot(Slot::Source)?;
            let surface = self.textures.slot(Slot::Surface)?;
            self.compositor.encode_blit(&mut encoder, &source.bind_group, &surface.view);
        } else {
            self.encode_chain(&mut encoder, layers, &runnable, &passes)?;
        }
        self.ctx.submit_one(encoder);

        Ok(RenderReport { passes: passes.len(), skipped, width, height, cached: false })
    }

    /// The untouched source on the surface, ignoring all layers.
    pub fn render_original(&mut self) -> EngineResult<RenderReport> {
        self.ctx.check_alive()?;
        let Some((width, height)) = self.ready_dims() else {
            return Ok(RenderReport::default());
        };
        self.split_cache = None;
        let mut encoder = self.encoder("original_encoder");
        let source = self.textures.slot(Slot::Source)?;
        let surface = self.textures.slot(Slot::Surface)?;
        self.compositor.encode_blit(&mut encoder, &source.bind_group, &surface.view);
        self.ctx.submit_one(encoder);
        Ok(RenderReport { width, height, ..Default::default() })
    }

    /// A/B view: original left of the divider column, composite at and
    /// right of it.  The composite is reused while the runnable chain,
    /// source, and size are unchanged.
    pub fn render_split(&mut self, layers: &[Layer], fraction: f32) -> EngineResult<RenderReport> {
        self.ctx.check_alive()?;
        let Some((width, height)) = self.ready_dims() else {
            return Ok(RenderReport::default());
        };
        let (runnable, skipped) = self.prepare(layers);
        let key = SplitKey {
            chain: runnable.iter().map(|r| layers[r.index].clone()).collect(),
            generation: self.generation,
            dims: (width, height),
        };

        let mut encoder = self.encoder("split_encoder");
        let mut passes = 0;
        let hit = match &self.split_cache {
            Some(c) if c.key == key => Some(c.composite),
            _ => None,
        };
        let cached = hit.is_some();
        let composite = match hit {
            Some(slot) => slot,
            None => {
                let plan = plan_passes(runnable.len(), ChainEnd::Offscreen);
                self.encode_chain(&mut encoder, layers, &runnable, &plan)?;
                passes = plan.len();
                final_slot(&plan)
            }
        };

        let split_x = split_column(fraction, width);
        let left = self.textures.slot(Slot::Source)?;
        let right = self.textures.slot(composite)?;
        let surface = self.textures.slot(Slot::Surface)?;
        self.compositor
            .encode_split(&mut encoder, &left.bind_group, &right.bind_group, &surface.view, split_x, width, height);
        self.ctx.submit_one(encoder);
        self.split_cache = Some(SplitCache { key, composite });

        Ok(RenderReport { passes, skipped, width, height, cached })
    }

    /// Render the loaded source at its native resolution and read it back.
    /// The working-resolution state is restored whether or not this fails.
    pub fn render_full_resolution(&mut self, layers: &[Layer]) -> EngineResult<(RgbaImage, RenderReport)> {
        self.ctx.check_alive()?;
        let Some(original) = self.source_image.take() else {
            return Err(EngineError::NoSource);
        };
        let result = self.render_offline(&original, layers);
        self.source_image = Some(original);
        result
    }

    /// Render an arbitrary image at its own resolution without touching the
    /// preview: source, surface, and target size are swapped out for the
    /// duration and always put back.
    pub fn render_offline(&mut self, image: &RgbaImage, layers: &[Layer]) -> EngineResult<(RgbaImage, RenderReport)> {
        self.ctx.check_alive()?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(EngineError::EmptyImage);
        }
        if !self.ctx.supports_size(width, height) {
            return Err(EngineError::TooLarge { width, height, max: self.ctx.max_texture_dim });
        }

        let device = self.ctx.device.clone();
        let native_source = GpuTexture::from_rgba(
            &device,
            &self.ctx.queue,
            &self.texture_bgl,
            &self.sampler,
            width,
            height,
            image.as_raw(),
            "offline_source",
        );
        let native_surface = GpuTexture::new(&device, &self.texture_bgl, &self.sampler, width, height, "offline_surface");
        let saved_source = self.textures.source.replace(native_source);
        let saved_surface = self.textures.surface.replace(native_surface);
        let saved_dims = self.textures.targets.dims();
        self.textures.targets.ensure_sized(&device, &self.texture_bgl, &self.sampler, width, height);

        let result = self.render(layers).and_then(|report| Ok((self.read_surface()?, report)));

        self.textures.source = saved_source;
        self.textures.surface = saved_surface;
        match saved_dims {
            Some((w, h)) => {
                self.textures.targets.ensure_sized(&device, &self.texture_bgl, &self.sampler, w, h);
            }
            None => self.textures.targets.clear(),
        }
        self.split_cache = None;
        if let Err(e) = &result {
            tracing::warn!(width, height, "offline render failed: {e}");
        }
        result
    }

    /// Read the surface back as an RGBA image, top row first.
    pub fn read_surface(&mut self) -> EngineResult<RgbaImage> {
        self.ctx.check_alive()?;
        let surface = self.textures.slot(Slot::Surface).map_err(|_| EngineError::NoSource)?;
        let (w, h) = surface.dims();
        let bytes = self.compositor.readback_texture(&self.ctx, &surface.texture, w, h)?;
        RgbaImage::from_raw(w, h, bytes).ok_or_else(|| EngineError::Readback("short readback buffer".into()))
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn ready_dims(&self) -> Option<(u32, u32)> {
        self.textures.source.as_ref()?;
        self.textures.surface_dims()
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Enabled layers, in order, split into runnable and skipped.
    fn prepare(&mut self, layers: &[Layer]) -> (Vec<Runnable>, Vec<SkippedLayer>) {
        let mut runnable = Vec::new();
        let mut skipped = Vec::new();
        for (index, layer) in layers.iter().enumerate().filter(|(_, l)| l.enabled) {
            let reason = match self.registry.resolve(layer.effect.as_str()) {
                None => SkipReason::UnknownEffect,
                Some(effect) if self.programs.ensure_compiled(&self.ctx.device, &effect) => {
                    runnable.push(Runnable { index, descriptor: effect.descriptor });
                    continue;
                }
                Some(_) => SkipReason::CompileFailed,
            };
            tracing::debug!(layer = %layer.id, effect = %layer.effect, ?reason, "layer skipped");
            skipped.push(SkippedLayer { layer_id: layer.id, effect: layer.effect.clone(), reason });
        }
        (runnable, skipped)
    }

    fn encode_chain(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        layers: &[Layer],
        runnable: &[Runnable],
        passes: &[PlannedPass],
    ) -> EngineResult<()> {
        let (width, height) = self.textures.surface_dims().ok_or(EngineError::MissingResource("surface"))?;
        for pass in passes {
            let step = &runnable[pass.layer];
            let layer = &layers[step.index];
            let program = self
                .programs
                .get(step.descriptor.id.as_str())
                .ok_or(EngineError::MissingResource("compiled program"))?;
            let uniforms = program.layout.pack(
                &step.descriptor,
                &PassInputs {
                    resolution: [width as f32, height as f32],
                    opacity: layer.opacity,
                    seed: layer.seed,
                    params: &layer.params,
                },
            );
            let input = self.textures.slot(pass.input)?;
            let output = self.textures.slot(pass.output)?;
            self.compositor.encode_effect_pass(
                &self.ctx,
                encoder,
                self.programs.uniform_bgl(),
                pass.layer,
                program,
                &uniforms,
                &input.bind_group,
                &output.view,
            );
        }
        Ok(())
    }
}

impl FrameRenderer for GpuRenderer {
    fn render_frame(&mut self, image: &RgbaImage, layers: &[Layer]) -> EngineResult<RgbaImage> {
        self.render_offline(image, layers).map(|(frame, _)| frame)
    }
}

impl Drop for GpuRenderer {
    fn drop(&mut self) {
        tracing::debug!(programs = self.programs.len(), "GPU renderer released");
    }
}
