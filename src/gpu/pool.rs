// ============================================================================
// RENDER TARGET POOL — the two ping-pong targets
// ============================================================================

use super::texture::GpuTexture;

/// Exactly two offscreen targets, always the same size and format.
///
/// Resizing releases the old pair before allocating the new one.  wgpu keeps
/// the released textures alive until queued work that touches them is done.
pub struct RenderTargetPool {
    targets: Option<[GpuTexture; 2]>,
    reallocations: u64,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self { targets: None, reallocations: 0 }
    }

    /// Reallocate both targets if the requested size differs from the
    /// current one (including the very first call).  Returns whether a
    /// reallocation happened.
    pub fn ensure_sized(
        &mut self,
        device: &wgpu::Device,
        bind_group_layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        width: u32,
        height: u32,
    ) -> bool {
        if self.dims() == Some((width, height)) {
            return false;
        }
        self.targets = None;
        self.targets = Some([
            GpuTexture::new(device, bind_group_layout, sampler, width, height, "pingpong_0"),
            GpuTexture::new(device, bind_group_layout, sampler, width, height, "pingpong_1"),
        ]);
        self.reallocations += 1;
        tracing::debug!(width, height, "render targets reallocated");
        true
    }

    pub fn dims(&self) -> Option<(u32, u32)> {
        self.targets.as_ref().map(|t| t[0].dims())
    }

    /// Target `index` (0 or 1).  `None` before the first `ensure_sized`.
    pub fn get(&self, index: usize) -> Option<&GpuTexture> {
        self.targets.as_ref().and_then(|t| t.get(index))
    }

    /// How many times the pair has been (re)allocated.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Release both targets.
    pub fn clear(&mut self) {
        self.targets = None;
    }
}

impl Default for RenderTargetPool {
    fn default() -> Self {
        Self::new()
    }
}
