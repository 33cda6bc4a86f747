// ============================================================================
// BUILT-IN EFFECTS — immutable table, WGSL bodies kept inline
// ============================================================================
//
// Each body defines `fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32>`
// and may add its own helper functions.  The generated prelude provides the
// uniforms (`u.u_<param>`, `u.u_resolution`, `u.u_seed`) and the helpers
// `sample_image`, `luma`, `hash12`, `rgb_to_hsv`, `hsv_to_rgb`, `texel_size`.
// Clamping to [0, 1] and the opacity mix happen in the shared epilogue.

use std::collections::HashMap;
use std::sync::Arc;

use super::{EffectDescriptor, EffectId, ParamSpec, ShaderRef};

/// The process-wide built-in table.  Constructed once at startup and shared
/// by reference (`Arc`); never mutated afterwards.
pub struct BuiltinEffects {
    by_id: HashMap<EffectId, Arc<EffectDescriptor>>,
    order: Vec<Arc<EffectDescriptor>>,
}

impl BuiltinEffects {
    pub fn new() -> Self {
        let order: Vec<Arc<EffectDescriptor>> = catalogue().into_iter().map(Arc::new).collect();
        let by_id = order.iter().map(|d| (d.id.clone(), d.clone())).collect();
        Self { by_id, order }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<EffectDescriptor>> {
        self.by_id.get(id)
    }

    /// Iterates in catalogue order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<EffectDescriptor>> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for BuiltinEffects {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit flags for the two capability declarations.
const RES: u8 = 1;
const SEED: u8 = 2;

fn fx(
    id: &str,
    name: &str,
    category: &str,
    source: &'static str,
    params: Vec<ParamSpec>,
    needs: u8,
) -> EffectDescriptor {
    EffectDescriptor {
        id: EffectId::new(id),
        name: name.to_string(),
        category: category.to_string(),
        shader: ShaderRef::Inline(source),
        params,
        needs_resolution: needs & RES != 0,
        needs_seed: needs & SEED != 0,
        is_custom: false,
    }
}

fn amount(min: f32, max: f32, step: f32, default: f32) -> ParamSpec {
    ParamSpec::range("amount", "Amount", min, max, step, default)
}

fn catalogue() -> Vec<EffectDescriptor> {
    vec![
        // ---- Basic ----
        fx("desaturate", "Desaturate", "Basic", DESATURATE, vec![amount(0.0, 1.0, 0.01, 1.0)], 0),
        fx("brightness", "Brightness", "Basic", BRIGHTNESS, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx("contrast", "Contrast", "Basic", CONTRAST, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx("exposure", "Exposure", "Basic", EXPOSURE, vec![amount(-3.0, 3.0, 0.01, 0.0)], 0),
        fx("gamma", "Gamma", "Basic", GAMMA, vec![amount(0.1, 3.0, 0.01, 1.0)], 0),
        fx("vibrance", "Vibrance", "Basic", VIBRANCE, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx("saturation", "Saturation", "Basic", SATURATION, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        // ---- Color ----
        fx("hueShift", "Hue Shift", "Color", HUE_SHIFT, vec![amount(-0.5, 0.5, 0.01, 0.0)], 0),
        fx("temperature", "Temperature", "Color", TEMPERATURE, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx("tint", "Tint", "Color", TINT, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx(
            "colorize",
            "Colorize",
            "Color",
            COLORIZE,
            vec![
                ParamSpec::range("hue", "Hue", 0.0, 1.0, 0.01, 0.0),
                ParamSpec::range("saturation", "Saturation", 0.0, 1.0, 0.01, 0.5),
            ],
            0,
        ),
        fx(
            "channelMixer",
            "Channel Mixer",
            "Color",
            CHANNEL_MIXER,
            vec![
                ParamSpec::range("redShift", "Red", -1.0, 1.0, 0.01, 0.0),
                ParamSpec::range("greenShift", "Green", -1.0, 1.0, 0.01, 0.0),
                ParamSpec::range("blueShift", "Blue", -1.0, 1.0, 0.01, 0.0),
            ],
            0,
        ),
        // ---- Tone ----
        fx("highlights", "Highlights", "Tone", HIGHLIGHTS, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx("shadows", "Shadows", "Tone", SHADOWS, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx("whites", "Whites", "Tone", WHITES, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx("blacks", "Blacks", "Tone", BLACKS, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx(
            "levels",
            "Levels",
            "Tone",
            LEVELS,
            vec![
                ParamSpec::range("blackPoint", "Black Point", 0.0, 1.0, 0.01, 0.0),
                ParamSpec::range("whitePoint", "White Point", 0.0, 1.0, 0.01, 1.0),
                ParamSpec::range("midtones", "Midtones", 0.1, 3.0, 0.01, 1.0),
            ],
            0,
        ),
        fx(
            "curves",
            "Curves",
            "Tone",
            CURVES,
            vec![
                ParamSpec::range("shadows", "Shadows", -1.0, 1.0, 0.01, 0.0),
                ParamSpec::range("midtones", "Midtones", -1.0, 1.0, 0.01, 0.0),
                ParamSpec::range("highlights", "Highlights", -1.0, 1.0, 0.01, 0.0),
            ],
            0,
        ),
        // ---- Blur & Sharpen ----
        fx("blur", "Blur", "Blur & Sharpen", BLUR, vec![amount(0.0, 20.0, 0.1, 5.0)], RES),
        fx("sharpen", "Sharpen", "Blur & Sharpen", SHARPEN, vec![amount(0.0, 2.0, 0.01, 0.5)], RES),
        fx("clarity", "Clarity", "Blur & Sharpen", CLARITY, vec![amount(-1.0, 1.0, 0.01, 0.0)], RES),
        fx("dehaze", "Dehaze", "Blur & Sharpen", DEHAZE, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        // ---- Stylize ----
        fx(
            "vignette",
            "Vignette",
            "Stylize",
            VIGNETTE,
            vec![
                amount(0.0, 1.0, 0.01, 0.5),
                ParamSpec::range("softness", "Softness", 0.01, 1.0, 0.01, 0.2),
            ],
            0,
        ),
        fx(
            "grain",
            "Film Grain",
            "Stylize",
            GRAIN,
            vec![amount(0.0, 0.5, 0.01, 0.1), ParamSpec::toggle("animate", "Animate", false)],
            RES | SEED,
        ),
        fx(
            "posterize",
            "Posterize",
            "Stylize",
            POSTERIZE,
            vec![ParamSpec::range("levels", "Levels", 2.0, 32.0, 1.0, 8.0)],
            0,
        ),
        fx(
            "threshold",
            "Threshold",
            "Stylize",
            THRESHOLD,
            vec![ParamSpec::range("threshold", "Threshold", 0.0, 1.0, 0.01, 0.5)],
            0,
        ),
        fx("invert", "Invert", "Stylize", INVERT, vec![amount(0.0, 1.0, 0.01, 1.0)], 0),
        fx("sepia", "Sepia", "Stylize", SEPIA, vec![amount(0.0, 1.0, 0.01, 1.0)], 0),
        fx(
            "duotone",
            "Duotone",
            "Stylize",
            DUOTONE,
            vec![
                ParamSpec::range("shadowR", "Shadow R", 0.0, 1.0, 0.01, 0.1),
                ParamSpec::range("shadowG", "Shadow G", 0.0, 1.0, 0.01, 0.0),
                ParamSpec::range("shadowB", "Shadow B", 0.0, 1.0, 0.01, 0.2),
                ParamSpec::range("highlightR", "Highlight R", 0.0, 1.0, 0.01, 1.0),
                ParamSpec::range("highlightG", "Highlight G", 0.0, 1.0, 0.01, 0.9),
                ParamSpec::range("highlightB", "Highlight B", 0.0, 1.0, 0.01, 0.6),
            ],
            0,
        ),
        // ---- Edge & Detail ----
        fx("emboss", "Emboss", "Edge & Detail", EMBOSS, vec![amount(0.0, 5.0, 0.1, 2.0)], RES),
        fx("edgeDetect", "Edge Detect", "Edge & Detail", EDGE_DETECT, vec![amount(0.0, 5.0, 0.1, 1.0)], RES),
        fx("sketch", "Sketch", "Edge & Detail", SKETCH, vec![amount(0.0, 10.0, 0.1, 4.0)], RES),
        // ---- Creative ----
        fx(
            "pixelate",
            "Pixelate",
            "Creative",
            PIXELATE,
            vec![ParamSpec::range("size", "Size", 1.0, 64.0, 1.0, 8.0)],
            RES,
        ),
        fx("chromatic", "Chromatic Aberration", "Creative", CHROMATIC, vec![amount(0.0, 20.0, 0.5, 2.0)], RES),
        fx(
            "glitch",
            "Glitch",
            "Creative",
            GLITCH,
            vec![amount(0.0, 1.0, 0.01, 0.3), ParamSpec::toggle("animate", "Animate", false)],
            SEED,
        ),
        // ---- Lens ----
        fx("lensDistort", "Lens Distortion", "Lens", LENS_DISTORT, vec![amount(-1.0, 1.0, 0.01, 0.0)], 0),
        fx(
            "tiltShift",
            "Tilt Shift",
            "Lens",
            TILT_SHIFT,
            vec![
                ParamSpec::range("focus", "Focus", 0.0, 1.0, 0.01, 0.5),
                ParamSpec::range("range", "Range", 0.01, 1.0, 0.01, 0.2),
                ParamSpec::range("blur", "Blur", 0.0, 20.0, 0.1, 8.0),
            ],
            RES,
        ),
        fx("radialBlur", "Radial Blur", "Lens", RADIAL_BLUR, vec![amount(0.0, 1.0, 0.01, 0.3)], 0),
    ]
}

// ============================================================================
// WGSL BODIES
// ============================================================================

const DESATURATE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let gray = vec3<f32>(luma(color.rgb));
    return vec4<f32>(mix(color.rgb, gray, vec3<f32>(u.u_amount)), color.a);
}
"#;

const BRIGHTNESS: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    return vec4<f32>(color.rgb + vec3<f32>(u.u_amount), color.a);
}
"#;

const CONTRAST: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let c = (color.rgb - vec3<f32>(0.5)) * (1.0 + u.u_amount) + vec3<f32>(0.5);
    return vec4<f32>(c, color.a);
}
"#;

const EXPOSURE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    return vec4<f32>(color.rgb * exp2(u.u_amount), color.a);
}
"#;

const GAMMA: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let g = 1.0 / max(u.u_amount, 0.01);
    return vec4<f32>(pow(max(color.rgb, vec3<f32>(0.0)), vec3<f32>(g)), color.a);
}
"#;

const VIBRANCE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let c = color.rgb;
    let sat = max(c.r, max(c.g, c.b)) - min(c.r, min(c.g, c.b));
    let amt = u.u_amount * (1.0 - sat);
    let gray = vec3<f32>(luma(c));
    return vec4<f32>(gray + (c - gray) * (1.0 + amt), color.a);
}
"#;

const SATURATION: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let gray = vec3<f32>(luma(color.rgb));
    return vec4<f32>(gray + (color.rgb - gray) * (1.0 + u.u_amount), color.a);
}
"#;

const HUE_SHIFT: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let hsv = rgb_to_hsv(color.rgb);
    let shifted = vec3<f32>(fract(hsv.x + u.u_amount), hsv.y, hsv.z);
    return vec4<f32>(hsv_to_rgb(shifted), color.a);
}
"#;

const TEMPERATURE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let d = u.u_amount * 0.3;
    return vec4<f32>(color.r + d, color.g, color.b - d, color.a);
}
"#;

const TINT: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let d = u.u_amount;
    return vec4<f32>(color.r - d * 0.15, color.g + d * 0.3, color.b - d * 0.15, color.a);
}
"#;

const COLORIZE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let rgb = hsv_to_rgb(vec3<f32>(u.u_hue, u.u_saturation, luma(color.rgb)));
    return vec4<f32>(rgb, color.a);
}
"#;

const CHANNEL_MIXER: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let shift = vec3<f32>(u.u_redShift, u.u_greenShift, u.u_blueShift);
    return vec4<f32>(color.rgb + shift, color.a);
}
"#;

const HIGHLIGHTS: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let mask = clamp((luma(color.rgb) - 0.5) * 2.0, 0.0, 1.0);
    return vec4<f32>(color.rgb + vec3<f32>(u.u_amount * mask), color.a);
}
"#;

const SHADOWS: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let mask = clamp(1.0 - luma(color.rgb) * 2.0, 0.0, 1.0);
    return vec4<f32>(color.rgb + vec3<f32>(u.u_amount * mask), color.a);
}
"#;

const WHITES: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let mask = clamp((luma(color.rgb) - 0.7) / 0.3, 0.0, 1.0);
    return vec4<f32>(color.rgb + vec3<f32>(u.u_amount * mask), color.a);
}
"#;

const BLACKS: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let mask = clamp(1.0 - luma(color.rgb) / 0.3, 0.0, 1.0);
    return vec4<f32>(color.rgb + vec3<f32>(u.u_amount * mask), color.a);
}
"#;

const LEVELS: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let span = max(u.u_whitePoint - u.u_blackPoint, 0.001);
    let c = clamp((color.rgb - vec3<f32>(u.u_blackPoint)) / span, vec3<f32>(0.0), vec3<f32>(1.0));
    let g = 1.0 / max(u.u_midtones, 0.01);
    return vec4<f32>(pow(c, vec3<f32>(g)), color.a);
}
"#;

const CURVES: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    var c = color.rgb;
    let one = vec3<f32>(1.0);
    c = c + u.u_shadows * (one - c) * (one - c) * c;
    c = c + u.u_midtones * c * (one - c);
    c = c + u.u_highlights * c * c * (one - c);
    return vec4<f32>(c, color.a);
}
"#;

const BLUR: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    if (u.u_amount <= 0.0) {
        return color;
    }
    let step_uv = texel_size() * (u.u_amount / 4.0);
    var acc: vec4<f32> = vec4<f32>(0.0);
    var total: f32 = 0.0;
    for (var y: i32 = -4; y <= 4; y = y + 1) {
        for (var x: i32 = -4; x <= 4; x = x + 1) {
            let o = vec2<f32>(f32(x), f32(y));
            let w = exp(-dot(o, o) / 8.0);
            acc = acc + sample_image(uv + o * step_uv) * w;
            total = total + w;
        }
    }
    return acc / total;
}
"#;

const SHARPEN: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let t = texel_size();
    let blurred = (sample_image(uv + vec2<f32>(t.x, 0.0))
        + sample_image(uv - vec2<f32>(t.x, 0.0))
        + sample_image(uv + vec2<f32>(0.0, t.y))
        + sample_image(uv - vec2<f32>(0.0, t.y))) * 0.25;
    let detail = color.rgb - blurred.rgb;
    return vec4<f32>(color.rgb + detail * u.u_amount, color.a);
}
"#;

const CLARITY: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let t = texel_size() * 2.0;
    let blurred = (sample_image(uv + vec2<f32>(t.x, 0.0))
        + sample_image(uv - vec2<f32>(t.x, 0.0))
        + sample_image(uv + vec2<f32>(0.0, t.y))
        + sample_image(uv - vec2<f32>(0.0, t.y))
        + color) * 0.2;
    let high_pass = color.rgb - blurred.rgb;
    let mid_mask = 1.0 - abs(luma(color.rgb) - 0.5) * 2.0;
    return vec4<f32>(color.rgb + high_pass * (u.u_amount * mid_mask), color.a);
}
"#;

const DEHAZE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let gray = vec3<f32>(luma(color.rgb));
    let c = (color.rgb - vec3<f32>(0.5)) * (1.0 + u.u_amount * 0.5) + vec3<f32>(0.5);
    return vec4<f32>(gray + (c - gray) * (1.0 + u.u_amount * 0.3), color.a);
}
"#;

const VIGNETTE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let dist = length((uv - vec2<f32>(0.5)) * 2.0);
    let soft = max(u.u_softness, 0.001);
    let vig = 1.0 - clamp((dist - (1.0 - soft)) / soft * u.u_amount, 0.0, 1.0);
    return vec4<f32>(color.rgb * vig, color.a);
}
"#;

const GRAIN: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let cell = floor(uv * u.u_resolution);
    let n = hash12(cell + vec2<f32>(u.u_seed * 17.0, u.u_seed * 31.0)) * 2.0 - 1.0;
    return vec4<f32>(color.rgb + vec3<f32>(n * u.u_amount), color.a);
}
"#;

const POSTERIZE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let lv = max(floor(u.u_levels), 2.0);
    return vec4<f32>(floor(color.rgb * lv) / (lv - 1.0), color.a);
}
"#;

const THRESHOLD: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let v = select(0.0, 1.0, luma(color.rgb) > u.u_threshold);
    return vec4<f32>(vec3<f32>(v), color.a);
}
"#;

const INVERT: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let inverted = vec3<f32>(1.0) - color.rgb;
    return vec4<f32>(mix(color.rgb, inverted, vec3<f32>(u.u_amount)), color.a);
}
"#;

const SEPIA: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let c = color.rgb;
    let sepia = clamp(vec3<f32>(
        dot(c, vec3<f32>(0.393, 0.769, 0.189)),
        dot(c, vec3<f32>(0.349, 0.686, 0.168)),
        dot(c, vec3<f32>(0.272, 0.534, 0.131)),
    ), vec3<f32>(0.0), vec3<f32>(1.0));
    return vec4<f32>(mix(c, sepia, vec3<f32>(u.u_amount)), color.a);
}
"#;

const DUOTONE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let shadow = vec3<f32>(u.u_shadowR, u.u_shadowG, u.u_shadowB);
    let highlight = vec3<f32>(u.u_highlightR, u.u_highlightG, u.u_highlightB);
    return vec4<f32>(mix(shadow, highlight, vec3<f32>(luma(color.rgb))), color.a);
}
"#;

const EMBOSS: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let t = texel_size();
    let diff = sample_image(uv + t).rgb - sample_image(uv - t).rgb;
    let e = luma(diff) * u.u_amount + 0.5;
    return vec4<f32>(vec3<f32>(e), color.a);
}
"#;

const EDGE_DETECT: &str = r#"
fn sobel(uv: vec2<f32>) -> f32 {
    let t = texel_size();
    let tl = luma(sample_image(uv + vec2<f32>(-t.x, -t.y)).rgb);
    let tm = luma(sample_image(uv + vec2<f32>(0.0, -t.y)).rgb);
    let tr = luma(sample_image(uv + vec2<f32>(t.x, -t.y)).rgb);
    let ml = luma(sample_image(uv + vec2<f32>(-t.x, 0.0)).rgb);
    let mr = luma(sample_image(uv + vec2<f32>(t.x, 0.0)).rgb);
    let bl = luma(sample_image(uv + vec2<f32>(-t.x, t.y)).rgb);
    let bm = luma(sample_image(uv + vec2<f32>(0.0, t.y)).rgb);
    let br = luma(sample_image(uv + vec2<f32>(t.x, t.y)).rgb);
    let gx = -tl - 2.0 * ml - bl + tr + 2.0 * mr + br;
    let gy = -tl - 2.0 * tm - tr + bl + 2.0 * bm + br;
    return sqrt(gx * gx + gy * gy);
}

fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    return vec4<f32>(vec3<f32>(sobel(uv) * u.u_amount), color.a);
}
"#;

const SKETCH: &str = r#"
fn edge_strength(uv: vec2<f32>) -> f32 {
    let t = texel_size();
    let gx = luma(sample_image(uv + vec2<f32>(t.x, 0.0)).rgb) - luma(sample_image(uv - vec2<f32>(t.x, 0.0)).rgb);
    let gy = luma(sample_image(uv + vec2<f32>(0.0, t.y)).rgb) - luma(sample_image(uv - vec2<f32>(0.0, t.y)).rgb);
    return sqrt(gx * gx + gy * gy);
}

fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let v = 1.0 - clamp(edge_strength(uv) * u.u_amount, 0.0, 1.0);
    return vec4<f32>(vec3<f32>(v), color.a);
}
"#;

const PIXELATE: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let size = max(floor(u.u_size), 1.0);
    let cell = floor(uv * u.u_resolution / size) * size + vec2<f32>(size * 0.5);
    return sample_image(cell * texel_size());
}
"#;

const CHROMATIC: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let off = vec2<f32>(u.u_amount * texel_size().x, 0.0);
    let r = sample_image(uv - off).r;
    let b = sample_image(uv + off).b;
    return vec4<f32>(r, color.g, b, color.a);
}
"#;

const GLITCH: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let band = floor(uv.y * 20.0);
    let rnd = hash12(vec2<f32>(band, u.u_seed));
    var shift = (rnd - 0.5) * u.u_amount * 0.1;
    if (rnd > 0.9) {
        shift = shift * 3.0;
    }
    let r = sample_image(uv - vec2<f32>(shift, 0.0)).r;
    let b = sample_image(uv + vec2<f32>(shift, 0.0)).b;
    return vec4<f32>(r, color.g, b, color.a);
}
"#;

const LENS_DISTORT: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let c = uv - vec2<f32>(0.5);
    let d = c * 2.0;
    let distortion = 1.0 + dot(d, d) * u.u_amount;
    return sample_image(vec2<f32>(0.5) + c * distortion);
}
"#;

const TILT_SHIFT: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    let band = max(u.u_range, 0.001);
    let mask = clamp((abs(uv.y - u.u_focus) - band * 0.5) / band, 0.0, 1.0);
    let radius = u.u_blur * mask;
    if (radius <= 0.0) {
        return color;
    }
    let step_uv = texel_size() * (radius / 3.0);
    var acc: vec4<f32> = vec4<f32>(0.0);
    var total: f32 = 0.0;
    for (var y: i32 = -3; y <= 3; y = y + 1) {
        for (var x: i32 = -3; x <= 3; x = x + 1) {
            let o = vec2<f32>(f32(x), f32(y));
            let w = exp(-dot(o, o) / 4.5);
            acc = acc + sample_image(uv + o * step_uv) * w;
            total = total + w;
        }
    }
    return acc / total;
}
"#;

const RADIAL_BLUR: &str = r#"
fn effect(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> {
    if (u.u_amount <= 0.0) {
        return color;
    }
    let center = vec2<f32>(0.5);
    var acc: vec4<f32> = vec4<f32>(0.0);
    for (var i: i32 = 0; i < 10; i = i + 1) {
        let scale = max(1.0 - u.u_amount * 0.02 * f32(i), 0.01);
        acc = acc + sample_image(center + (uv - center) / scale);
    }
    return acc / 10.0;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_descriptors_are_valid() {
        let table = BuiltinEffects::new();
        assert!(!table.is_empty());
        for d in table.iter() {
            d.validate().unwrap_or_else(|e| panic!("{}: {}", d.id, e));
            assert!(matches!(d.shader, ShaderRef::Inline(_)));
            assert!(!d.is_custom);
        }
    }

    #[test]
    fn ids_are_unique() {
        let table = BuiltinEffects::new();
        assert_eq!(table.by_id.len(), table.len());
    }

    #[test]
    fn stochastic_effects_declare_seed() {
        let table = BuiltinEffects::new();
        assert!(table.get("grain").unwrap().needs_seed);
        assert!(table.get("glitch").unwrap().needs_seed);
        assert!(!table.get("brightness").unwrap().needs_seed);
        assert!(table.get("blur").unwrap().needs_resolution);
    }
}
