// ============================================================================
// EFFECT UNIFORMS — per-effect uniform block layout and packing
// ============================================================================
//
// Every effect gets one uniform block at @group(0) @binding(0):
//
//   offset 0   u_resolution : vec2<f32>
//   offset 8   u_opacity    : f32
//   offset 12  u_seed       : f32
//   offset 16  u_<param_0>  : f32
//   ...        u_<param_n>  : f32
//   padding    _padN        : f32   (block size rounded up to 16 bytes)
//
// Booleans upload as 0.0 / 1.0.  Resolution and seed are only filled in for
// effects that declare them; otherwise they stay zero.

use crate::effects::{EffectDescriptor, ParamMap};

/// Floats occupied by `u_resolution`, `u_opacity`, `u_seed`.
const HEADER_FLOATS: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct UniformLayout {
    params: Vec<String>,
    padded_floats: usize,
}

/// Per-pass values that are not effect parameters.
#[derive(Clone, Copy, Debug)]
pub struct PassInputs<'a> {
    pub resolution: [f32; 2],
    pub opacity: f32,
    pub seed: Option<f32>,
    pub params: &'a ParamMap,
}

impl UniformLayout {
    pub fn for_effect(descriptor: &EffectDescriptor) -> Self {
        let params: Vec<String> = descriptor.params.iter().map(|p| p.name.clone()).collect();
        let used = HEADER_FLOATS + params.len();
        Self { params, padded_floats: used.div_ceil(4) * 4 }
    }

    pub fn float_count(&self) -> usize {
        self.padded_floats
    }

    pub fn byte_size(&self) -> u64 {
        (self.padded_floats * std::mem::size_of::<f32>()) as u64
    }

    /// Byte offset of `u_<name>` inside the block.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.params
            .iter()
            .position(|p| p == name)
            .map(|i| (HEADER_FLOATS + i) * 4)
    }

    /// The WGSL struct declaration matching this layout.
    pub fn wgsl_struct(&self) -> String {
        let mut s = String::from(
            "struct EffectUniforms {\n    u_resolution: vec2<f32>,\n    u_opacity: f32,\n    u_seed: f32,\n",
        );
        for p in &self.params {
            s.push_str(&format!("    u_{}: f32,\n", p));
        }
        for i in 0..self.padded_floats - HEADER_FLOATS - self.params.len() {
            s.push_str(&format!("    _pad{}: f32,\n", i));
        }
        s.push_str("};\n");
        s
    }

    /// Packs one pass's uniforms.  A parameter missing from the layer falls
    /// back to the descriptor default.
    pub fn pack(&self, descriptor: &EffectDescriptor, inputs: &PassInputs<'_>) -> Vec<f32> {
        let mut data = vec![0.0f32; self.padded_floats];
        if descriptor.needs_resolution {
            data[0] = inputs.resolution[0];
            data[1] = inputs.resolution[1];
        }
        data[2] = inputs.opacity.clamp(0.0, 1.0);
        if descriptor.needs_seed {
            data[3] = inputs.seed.unwrap_or(0.0);
        }
        for (i, spec) in descriptor.params.iter().enumerate() {
            let value = match inputs.params.get(&spec.name) {
                Some(v) => v.as_uniform(),
                None => {
                    tracing::debug!(
                        effect = %descriptor.id,
                        param = %spec.name,
                        "param missing on layer, using default"
                    );
                    spec.default_uniform()
                }
            };
            data[HEADER_FLOATS + i] = value;
        }
        data
    }
}
