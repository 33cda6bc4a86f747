// ============================================================================
// PRESETS — named layer stacks, built-ins + a user preset directory
// ============================================================================

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::layers::Layer;
use crate::effects::{EffectId, ParamMap, ParamValue};
use crate::error::{FxError, FxResult};

/// Category given to presets saved by the user.
pub const USER_CATEGORY: &str = "My Presets";

/// A preset layer carries no id, seed, or enabled flag; those are drawn
/// fresh when the preset is loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetLayer {
    pub effect: EffectId,
    #[serde(default)]
    pub params: ParamMap,
    #[serde(default = "full_opacity")]
    pub opacity: f32,
}

fn full_opacity() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub layers: Vec<PresetLayer>,
}

impl Preset {
    /// Capture the enabled layers of a stack.  Disabled layers are left out
    /// so loading a preset never brings back a hidden layer.
    pub fn from_layers(name: &str, category: &str, layers: &[Layer]) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            layers: layers
                .iter()
                .filter(|l| l.enabled)
                .map(|l| PresetLayer { effect: l.effect.clone(), params: l.params.clone(), opacity: l.opacity })
                .collect(),
        }
    }
}

// ============================================================================
// BUILT-IN PRESETS
// ============================================================================

fn preset_layer(effect: &str, params: &[(&str, f32)], opacity: f32) -> PresetLayer {
    PresetLayer {
        effect: EffectId::new(effect),
        params: params.iter().map(|(k, v)| (k.to_string(), ParamValue::Number(*v))).collect(),
        opacity,
    }
}

pub fn builtin_presets() -> Vec<Preset> {
    vec![
        Preset {
            name: "Vintage".into(),
            category: "Film".into(),
            layers: vec![
                preset_layer("sepia", &[("amount", 0.6)], 1.0),
                preset_layer("contrast", &[("amount", -0.1)], 1.0),
                preset_layer("vignette", &[("amount", 0.5), ("softness", 0.4)], 1.0),
                preset_layer("grain", &[("amount", 0.08)], 1.0),
            ],
        },
        Preset {
            name: "Noir".into(),
            category: "Film".into(),
            layers: vec![
                preset_layer("desaturate", &[("amount", 1.0)], 1.0),
                preset_layer("contrast", &[("amount", 0.4)], 1.0),
                preset_layer("vignette", &[("amount", 0.7), ("softness", 0.3)], 1.0),
            ],
        },
        Preset {
            name: "Warm Glow".into(),
            category: "Color".into(),
            layers: vec![
                preset_layer("temperature", &[("amount", 0.4)], 1.0),
                preset_layer("highlights", &[("amount", 0.15)], 1.0),
                preset_layer("vibrance", &[("amount", 0.3)], 1.0),
            ],
        },
        Preset {
            name: "VHS".into(),
            category: "Creative".into(),
            layers: vec![
                preset_layer("chromatic", &[("amount", 3.0)], 1.0),
                preset_layer("glitch", &[("amount", 0.2)], 0.8),
                preset_layer("grain", &[("amount", 0.12)], 1.0),
            ],
        },
    ]
}

// ============================================================================
// PRESET LIBRARY — one JSON file per user preset
// ============================================================================

pub struct PresetLibrary {
    dir: PathBuf,
}

impl PresetLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `"My Cool Look!"` → `"my_cool_look"`.
    pub fn sanitize_key(name: &str) -> String {
        name.trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
            .map(|c| if c == ' ' { '_' } else { c })
            .collect()
    }

    /// Keys are only ever produced by `sanitize_key`; anything else could
    /// point outside the preset directory.
    fn path_for(&self, key: &str) -> FxResult<PathBuf> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if !valid {
            return Err(FxError::preset(format!("invalid preset key '{}'", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    /// All readable presets, sorted by key.  Corrupt files are skipped.
    pub fn list(&self) -> FxResult<Vec<(String, Preset)>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = self.dir.join("*.json");
        let entries = glob::glob(&pattern.to_string_lossy()).map_err(|e| FxError::preset(e.to_string()))?;
        let mut out = Vec::new();
        for path in entries.flatten() {
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match Self::read(&path) {
                Ok(p) => out.push((key, p)),
                Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable preset: {e}"),
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn read(path: &Path) -> FxResult<Preset> {
        let text = std::fs::read_to_string(path).map_err(|e| FxError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn load(&self, key: &str) -> FxResult<Preset> {
        Self::read(&self.path_for(key)?)
    }

    /// Save the enabled layers under a key derived from `name`.  Returns the key.
    pub fn save(&self, name: &str, layers: &[Layer]) -> FxResult<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(FxError::preset("preset name is empty"));
        }
        let preset = Preset::from_layers(name, USER_CATEGORY, layers);
        if preset.layers.is_empty() {
            return Err(FxError::preset("preset has no enabled layers"));
        }
        let mut key = Self::sanitize_key(name);
        if key.is_empty() {
            let secs = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            key = format!("preset_{}", secs);
        }
        let path = self.path_for(&key)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| FxError::io(&self.dir, e))?;
        let json = serde_json::to_string_pretty(&preset)?;
        std::fs::write(&path, json).map_err(|e| FxError::io(&path, e))?;
        tracing::info!(key = %key, layers = preset.layers.len(), "preset saved");
        Ok(key)
    }

    pub fn delete(&self, key: &str) -> FxResult<()> {
        let path = self.path_for(key)?;
        std::fs::remove_file(&path).map_err(|e| FxError::io(&path, e))
    }
}
