// ============================================================================
// GPU MODULE — headless wgpu compositing engine
// ============================================================================
//
// Architecture:
//   context.rs    — wgpu Device, Queue, adapter init, device-loss flag
//   shaders.rs    — fixed WGSL (vertex, blit) + effect prelude/epilogue
//   uniforms.rs   — per-effect uniform block layout and packing
//   texture.rs    — GpuTexture wrapper, shared sampler, full-surface quad
//   plan.rs       — pure ping-pong pass planner
//   programs.rs   — naga validation + per-effect pipeline cache
//   pool.rs       — the two ping-pong render targets
//   compositor.rs — pass encoding, split blits, readback
//   renderer.rs   — top-level GpuRenderer engine
// ============================================================================

pub mod context;
pub mod shaders;
pub mod uniforms;
pub mod texture;
pub mod plan;
pub mod programs;
pub mod pool;
pub mod compositor;
pub mod renderer;

pub use context::GpuContext;
pub use renderer::{EngineState, GpuRenderer, RenderReport, SkipReason, SkippedLayer};
