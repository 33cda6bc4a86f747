// ============================================================================
// CUSTOM EFFECTS — manifest discovery + lazy shader source fetching
// ============================================================================
//
// The manifest is fetched once when the table is built.  Shader sources are
// fetched on the first `resolve` of each effect and cached for the session.
// A failed fetch is remembered so a broken effect does not hit the fetcher
// on every frame; `forget_failure` re-arms it for a user-initiated retry.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{EffectDescriptor, EffectId, ParamSpec, ParamValue, ResolvedEffect, ShaderRef};
use crate::error::{FxError, FxResult};

// ============================================================================
// MANIFEST FORMAT
// ============================================================================

/// `{ "effects": { "<id>": { ... } } }`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub effects: BTreeMap<String, ManifestEntry>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Shader path relative to the shader root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shader: Option<String>,
    /// Capability flags: `"resolution"`, `"seed"`.
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub params: Vec<ManifestParam>,
    #[serde(default = "default_true")]
    pub is_custom: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ManifestParam {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// `"checkbox"` marks a boolean toggle.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

impl ManifestParam {
    fn to_spec(&self) -> ParamSpec {
        let label = self.label.clone().unwrap_or_else(|| title_case(&self.name));
        let is_toggle =
            self.kind.as_deref() == Some("checkbox") || matches!(self.default, Some(ParamValue::Bool(_)));
        if is_toggle {
            let default = self.default.map(ParamValue::as_bool).unwrap_or(false);
            return ParamSpec::toggle(&self.name, &label, default);
        }
        let min = self.min.unwrap_or(0.0);
        let max = self.max.unwrap_or(1.0);
        let default = self.default.map(ParamValue::as_uniform).unwrap_or(min);
        ParamSpec::range(&self.name, &label, min, max, self.step.unwrap_or(0.01), default)
    }
}

impl ManifestEntry {
    /// Converts and validates one manifest entry.
    pub fn to_descriptor(&self, id: &str) -> Result<EffectDescriptor, String> {
        if id.trim().is_empty() {
            return Err("effect id is empty".to_string());
        }
        let shader = self
            .shader
            .clone()
            .ok_or_else(|| format!("effect '{}' has no shader path", id))?;
        let mut needs_resolution = false;
        let mut needs_seed = false;
        for need in &self.needs {
            match need.as_str() {
                "resolution" => needs_resolution = true,
                "seed" => needs_seed = true,
                other => tracing::debug!(effect = id, need = other, "ignoring unknown capability"),
            }
        }
        let descriptor = EffectDescriptor {
            id: EffectId::new(id),
            name: self.name.clone().unwrap_or_else(|| title_case(id)),
            category: self.category.clone().unwrap_or_else(|| "Custom".to_string()),
            shader: ShaderRef::Path(shader),
            params: self.params.iter().map(ManifestParam::to_spec).collect(),
            needs_resolution,
            needs_seed,
            is_custom: self.is_custom,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Entry used for a shader file that has no sidecar description.
    pub fn generated(shader_path: String) -> Self {
        Self {
            name: None,
            category: Some("Custom".to_string()),
            shader: Some(shader_path),
            needs: Vec::new(),
            params: vec![ManifestParam {
                name: "amount".to_string(),
                label: Some("Amount".to_string()),
                kind: None,
                min: Some(0.0),
                max: Some(1.0),
                step: Some(0.01),
                default: Some(ParamValue::Number(0.5)),
            }],
            is_custom: true,
        }
    }
}

/// `my_cool-fx` → `My Cool Fx`
fn title_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == '-' || c == ' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// FETCHERS
// ============================================================================

/// Source of custom-effect manifests and shader text.
pub trait ShaderFetcher: Send {
    fn fetch_manifest(&self) -> FxResult<Manifest>;
    fn fetch_source(&self, path: &str) -> FxResult<String>;
}

/// Reads `effects.json` and `custom/*.wgsl` from a shader directory.
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `rel` under the root, refusing anything that could escape it.
    fn contained(&self, rel: &str) -> FxResult<PathBuf> {
        let rel_path = Path::new(rel);
        let escapes = rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if rel.is_empty() || escapes {
            return Err(FxError::Fetch {
                path: rel.to_string(),
                reason: "path escapes the shader directory".to_string(),
            });
        }
        Ok(self.root.join(rel_path))
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> FxResult<T> {
        let text = std::fs::read_to_string(path).map_err(|e| FxError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl ShaderFetcher for DirFetcher {
    fn fetch_manifest(&self) -> FxResult<Manifest> {
        let manifest_path = self.root.join("effects.json");
        let mut manifest: Manifest = if manifest_path.is_file() {
            Self::read_json(&manifest_path)?
        } else {
            Manifest::default()
        };

        let pattern = self.root.join("custom").join("*.wgsl");
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern).map_err(|e| FxError::manifest(e.to_string()))?;
        for entry in entries.flatten() {
            let Some(stem) = entry.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('_') || manifest.effects.contains_key(stem) {
                continue;
            }
            let shader_path = format!("custom/{}.wgsl", stem);
            let sidecar = entry.with_extension("json");
            let described = if sidecar.is_file() {
                match Self::read_json::<ManifestEntry>(&sidecar) {
                    Ok(mut e) => {
                        e.shader = Some(shader_path);
                        e
                    }
                    Err(err) => {
                        tracing::warn!(path = %sidecar.display(), "unreadable sidecar: {err}");
                        continue;
                    }
                }
            } else {
                ManifestEntry::generated(shader_path)
            };
            manifest.effects.insert(stem.to_string(), described);
        }
        Ok(manifest)
    }

    fn fetch_source(&self, path: &str) -> FxResult<String> {
        let full = self.contained(path)?;
        std::fs::read_to_string(&full).map_err(|e| FxError::Fetch {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// EXTENSION TABLE
// ============================================================================

/// Mutable extension table for runtime-discovered effects.
pub struct CustomEffects {
    fetcher: Option<Box<dyn ShaderFetcher>>,
    descriptors: HashMap<EffectId, Arc<EffectDescriptor>>,
    order: Vec<Arc<EffectDescriptor>>,
    sources: HashMap<EffectId, Arc<str>>,
    failures: HashMap<EffectId, String>,
}

impl CustomEffects {
    pub fn empty() -> Self {
        Self {
            fetcher: None,
            descriptors: HashMap::new(),
            order: Vec::new(),
            sources: HashMap::new(),
            failures: HashMap::new(),
        }
    }

    /// Fetches the manifest once.  Invalid entries are skipped with a
    /// warning; only a failure to obtain the manifest itself is an error.
    pub fn load(fetcher: Box<dyn ShaderFetcher>) -> FxResult<Self> {
        let manifest = fetcher.fetch_manifest()?;
        let mut table = Self::empty();
        for (id, entry) in &manifest.effects {
            match entry.to_descriptor(id) {
                Ok(d) => table.insert(d),
                Err(reason) => tracing::warn!(effect = %id, "rejected custom effect: {reason}"),
            }
        }
        tracing::info!(count = table.len(), "custom effects discovered");
        table.fetcher = Some(fetcher);
        Ok(table)
    }

    fn insert(&mut self, descriptor: EffectDescriptor) {
        let d = Arc::new(descriptor);
        if self.descriptors.insert(d.id.clone(), d.clone()).is_none() {
            self.order.push(d);
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, descriptor: EffectDescriptor) {
        self.insert(descriptor);
    }

    pub fn descriptor(&self, id: &str) -> Option<&Arc<EffectDescriptor>> {
        self.descriptors.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EffectDescriptor>> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_fetched(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Last fetch error for `id`, if the effect is currently marked failed.
    pub fn failure(&self, id: &str) -> Option<&str> {
        self.failures.get(id).map(String::as_str)
    }

    /// Clears a remembered fetch failure so the next `resolve` tries again.
    pub fn forget_failure(&mut self, id: &str) -> bool {
        self.failures.remove(id).is_some()
    }

    pub fn resolve(&mut self, id: &str) -> Option<ResolvedEffect> {
        let descriptor = self.descriptors.get(id)?.clone();
        if let Some(source) = self.sources.get(id) {
            return Some(ResolvedEffect { descriptor, source: source.clone() });
        }
        if self.failures.contains_key(id) {
            return None;
        }
        let fetched = match &descriptor.shader {
            ShaderRef::Inline(src) => Ok(src.to_string()),
            ShaderRef::Path(path) => match &self.fetcher {
                Some(f) => f.fetch_source(path),
                None => Err(FxError::Fetch {
                    path: path.clone(),
                    reason: "no shader fetcher configured".to_string(),
                }),
            },
        };
        match fetched {
            Ok(text) => {
                let source: Arc<str> = Arc::from(text);
                self.sources.insert(descriptor.id.clone(), source.clone());
                tracing::debug!(effect = id, "custom shader source cached");
                Some(ResolvedEffect { descriptor, source })
            }
            Err(e) => {
                tracing::warn!(effect = id, "custom shader fetch failed: {e}");
                self.failures.insert(descriptor.id.clone(), e.to_string());
                None
            }
        }
    }
}

impl Default for CustomEffects {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MemoryFetcher {
        manifest: String,
        sources: Mutex<HashMap<String, String>>,
        calls: Arc<AtomicUsize>,
    }

    impl ShaderFetcher for MemoryFetcher {
        fn fetch_manifest(&self) -> FxResult<Manifest> {
            Ok(serde_json::from_str(&self.manifest)?)
        }

        fn fetch_source(&self, path: &str) -> FxResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sources
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| FxError::Fetch { path: path.into(), reason: "404".into() })
        }
    }

    const MANIFEST: &str = r#"{
        "effects": {
            "wave": {
                "name": "Wave",
                "category": "Distort",
                "shader": "custom/wave.wgsl",
                "needs": ["resolution"],
                "params": [
                    {"name": "amount", "min": 0, "max": 2, "step": 0.1, "default": 1},
                    {"name": "animate", "type": "checkbox", "default": false}
                ],
                "isCustom": true
            },
            "broken": {"shader": "custom/broken.wgsl", "params": [{"name": "bad-name"}]},
            "missing": {"shader": "custom/missing.wgsl"}
        }
    }"#;

    fn fetcher(calls: Arc<AtomicUsize>) -> MemoryFetcher {
        let mut sources = HashMap::new();
        sources.insert("custom/wave.wgsl".to_string(), "fn effect() {}".to_string());
        MemoryFetcher { manifest: MANIFEST.to_string(), sources: Mutex::new(sources), calls }
    }

    #[test]
    fn invalid_entries_are_skipped() {
        let table = CustomEffects::load(Box::new(fetcher(Arc::default()))).unwrap();
        assert!(table.descriptor("wave").is_some());
        assert!(table.descriptor("missing").is_some());
        assert!(table.descriptor("broken").is_none());

        let wave = table.descriptor("wave").unwrap();
        assert!(wave.needs_resolution);
        assert!(!wave.needs_seed);
        assert_eq!(wave.params.len(), 2);
        assert!(matches!(wave.params[1].kind, super::super::ParamKind::Toggle { default: false }));
    }

    #[test]
    fn sources_are_fetched_lazily_and_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut table = CustomEffects::load(Box::new(fetcher(calls.clone()))).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!table.is_fetched("wave"));

        assert!(table.resolve("wave").is_some());
        assert!(table.resolve("wave").is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(table.is_fetched("wave"));
    }

    #[test]
    fn failed_fetch_is_remembered_until_forgotten() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut table = CustomEffects::load(Box::new(fetcher(calls.clone()))).unwrap();

        assert!(table.resolve("missing").is_none());
        assert!(table.resolve("missing").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(table.failure("missing").is_some());

        assert!(table.forget_failure("missing"));
        assert!(table.resolve("missing").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn title_case_names() {
        assert_eq!(title_case("my_cool-fx"), "My Cool Fx");
        assert_eq!(title_case("wave"), "Wave");
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shaderstack-{}-{}", tag, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("custom")).unwrap();
        dir
    }

    #[test]
    fn dir_fetcher_discovers_shader_files() {
        let dir = scratch_dir("fetch");
        std::fs::write(dir.join("custom/ripple.wgsl"), "// ripple").unwrap();
        std::fs::write(dir.join("custom/_scratch.wgsl"), "// ignored").unwrap();
        std::fs::write(dir.join("custom/tone_map.wgsl"), "// tone").unwrap();
        std::fs::write(
            dir.join("custom/tone_map.json"),
            r#"{"name": "Tone Map", "category": "Tone", "params": []}"#,
        )
        .unwrap();

        let fetcher = DirFetcher::new(&dir);
        let manifest = fetcher.fetch_manifest().unwrap();
        assert!(!manifest.effects.contains_key("_scratch"));

        let ripple = manifest.effects["ripple"].to_descriptor("ripple").unwrap();
        assert_eq!(ripple.name, "Ripple");
        assert_eq!(ripple.category, "Custom");
        assert_eq!(ripple.params[0].default_uniform(), 0.5);

        let tone = manifest.effects["tone_map"].to_descriptor("tone_map").unwrap();
        assert_eq!(tone.category, "Tone");
        assert_eq!(tone.shader, ShaderRef::Path("custom/tone_map.wgsl".into()));

        assert_eq!(fetcher.fetch_source("custom/ripple.wgsl").unwrap(), "// ripple");
        assert!(fetcher.fetch_source("../etc/passwd").is_err());
        assert!(fetcher.fetch_source("/etc/passwd").is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
    #[test]
    fn file_stems_need_not_be_identifiers() {
        let dir = scratch_dir("stems");
        std::fs::write(dir.join("custom/my-glow.wgsl"), "// glow").unwrap();
        std::fs::write(dir.join("custom/2tone.wgsl"), "// two tone").unwrap();

        let mut table = CustomEffects::load(Box::new(DirFetcher::new(&dir))).unwrap();
        assert_eq!(table.len(), 2);
        let glow = table.resolve("my-glow").unwrap();
        assert_eq!(glow.descriptor.name, "My Glow");
        assert_eq!(&*glow.source, "// glow");
        assert!(table.resolve("2tone").is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sidecar_cannot_redirect_the_shader_path() {
        let dir = scratch_dir("sidecar");
        std::fs::write(dir.join("custom/halo.wgsl"), "// halo").unwrap();
        std::fs::write(dir.join("custom/halo.json"), r#"{"shader": "custom/other.wgsl", "params": []}"#).unwrap();

        let manifest = DirFetcher::new(&dir).fetch_manifest().unwrap();
        let halo = manifest.effects["halo"].to_descriptor("halo").unwrap();
        assert_eq!(halo.shader, ShaderRef::Path("custom/halo.wgsl".into()));

        std::fs::remove_dir_all(&dir).ok();
    }
}
