// ============================================================================
// GPU SHADERS — shared vertex stage, blit, and effect module assembly
// ============================================================================
//
// Effect modules are assembled as  prelude + effect body + epilogue.  The
// prelude declares the uniform block (see uniforms.rs), the input texture and
// sampler, and a handful of helpers effect bodies may call.  The epilogue owns
// the fragment entry point: it clamps the effect's output and mixes it with
// the unfiltered input by the layer opacity, so opacity 0 is an exact
// pass-through for every effect.

use super::uniforms::UniformLayout;

/// Entry point names shared by all pipelines.
pub const VS_ENTRY: &str = "vs_main";
pub const FS_EFFECT_ENTRY: &str = "fs_main";
pub const FS_BLIT_ENTRY: &str = "fs_blit";

// ============================================================================
// VERTEX SHADER — one copy for the whole engine
// ============================================================================
//
// Consumes the fixed full-surface quad from texture.rs.  uv (0,0) is the top
// left of the surface, matching texture row order.
pub const VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(position, 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

// ============================================================================
// BLIT SHADER — straight copy, used for identity and split view
// ============================================================================
pub const BLIT_SHADER: &str = r#"
@group(0) @binding(0) var blit_tex: texture_2d<f32>;
@group(0) @binding(1) var blit_samp: sampler;

@fragment
fn fs_blit(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSampleLevel(blit_tex, blit_samp, uv, 0.0);
}
"#;

// ============================================================================
// EFFECT PRELUDE / EPILOGUE
// ============================================================================

const EFFECT_BINDINGS: &str = r#"
@group(0) @binding(0) var<uniform> u: EffectUniforms;
@group(1) @binding(0) var u_image: texture_2d<f32>;
@group(1) @binding(1) var u_sampler: sampler;

fn sample_image(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(u_image, u_sampler, uv, 0.0);
}

fn luma(c: vec3<f32>) -> f32 {
    return dot(c, vec3<f32>(0.299, 0.587, 0.114));
}

fn texel_size() -> vec2<f32> {
    return vec2<f32>(1.0) / max(u.u_resolution, vec2<f32>(1.0));
}

fn hash12(p: vec2<f32>) -> f32 {
    return fract(sin(dot(p, vec2<f32>(12.9898, 78.233))) * 43758.5453);
}

fn rgb_to_hsv(c: vec3<f32>) -> vec3<f32> {
    let k = vec4<f32>(0.0, -1.0 / 3.0, 2.0 / 3.0, -1.0);
    let p = mix(vec4<f32>(c.bg, k.wz), vec4<f32>(c.gb, k.xy), vec4<f32>(step(c.b, c.g)));
    let q = mix(vec4<f32>(p.xyw, c.r), vec4<f32>(c.r, p.yzx), vec4<f32>(step(p.x, c.r)));
    let d = q.x - min(q.w, q.y);
    let e = 1.0e-10;
    return vec3<f32>(abs(q.z + (q.w - q.y) / (6.0 * d + e)), d / (q.x + e), q.x);
}

fn hsv_to_rgb(c: vec3<f32>) -> vec3<f32> {
    let k = vec4<f32>(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    let p = abs(fract(c.xxx + k.xyz) * 6.0 - k.www);
    return c.z * mix(k.xxx, clamp(p - k.xxx, vec3<f32>(0.0), vec3<f32>(1.0)), vec3<f32>(c.y));
}
"#;

const EFFECT_EPILOGUE: &str = r#"
@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let base = sample_image(uv);
    let filtered = clamp(effect(base, uv), vec4<f32>(0.0), vec4<f32>(1.0));
    return mix(base, filtered, vec4<f32>(u.u_opacity));
}
"#;

/// Full fragment module for one effect body.
pub fn assemble_effect(layout: &UniformLayout, body: &str) -> String {
    let mut src = layout.wgsl_struct();
    src.push_str(EFFECT_BINDINGS);
    src.push('\n');
    src.push_str(body);
    src.push('\n');
    src.push_str(EFFECT_EPILOGUE);
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::BuiltinEffects;
    use crate::effects::ShaderRef;
    use crate::gpu::programs::validate_wgsl;

    #[test]
    fn fixed_shaders_validate() {
        validate_wgsl(VERTEX_SHADER).unwrap();
        validate_wgsl(BLIT_SHADER).unwrap();
    }

    #[test]
    fn every_builtin_effect_assembles_to_valid_wgsl() {
        let table = BuiltinEffects::new();
        for d in table.iter() {
            let ShaderRef::Inline(body) = d.shader else {
                panic!("{} is not inline", d.id);
            };
            let src = assemble_effect(&UniformLayout::for_effect(d), body);
            if let Err(e) = validate_wgsl(&src) {
                panic!("{} failed validation:\n{}", d.id, e);
            }
        }
    }

    #[test]
    fn broken_body_is_rejected() {
        let table = BuiltinEffects::new();
        let d = table.get("brightness").unwrap();
        let src = assemble_effect(&UniformLayout::for_effect(d), "fn effect(color: vec4<f32>) -> f32 { return 1; }");
        assert!(validate_wgsl(&src).is_err());
    }
}
