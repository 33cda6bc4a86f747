// ============================================================================
// EFFECT REGISTRY — effect descriptors, built-in table, custom extensions
// ============================================================================
//
//   builtin.rs — immutable table of built-in effects (WGSL bodies inline)
//   custom.rs  — manifest parsing + lazy shader fetching for custom effects
//
// Lookup order is always built-ins first, then the custom extension table,
// so a custom effect can never shadow a built-in of the same id.

pub mod builtin;
pub mod custom;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use builtin::BuiltinEffects;
pub use custom::{CustomEffects, DirFetcher, ShaderFetcher};

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Strongly-typed effect identifier (`"brightness"`, `"glitch"`, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(String);

impl EffectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Borrow<str> for EffectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EffectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EffectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// PARAMETER SPECS
// ============================================================================

/// Declared parameter of an effect.  `name` becomes the uniform field
/// `u_<name>` in the generated shader prelude.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub label: String,
    pub kind: ParamKind,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamKind {
    /// Continuous slider parameter.
    Range { min: f32, max: f32, step: f32, default: f32 },
    /// Boolean checkbox parameter, uploaded as 0.0 / 1.0.
    Toggle { default: bool },
}

impl ParamSpec {
    pub fn range(name: &str, label: &str, min: f32, max: f32, step: f32, default: f32) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: ParamKind::Range { min, max, step, default },
        }
    }

    pub fn toggle(name: &str, label: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind: ParamKind::Toggle { default },
        }
    }

    /// Default as the value a layer stores.
    pub fn default_value(&self) -> ParamValue {
        match self.kind {
            ParamKind::Range { default, .. } => ParamValue::Number(default),
            ParamKind::Toggle { default } => ParamValue::Bool(default),
        }
    }

    /// Default as the float that is uploaded to the GPU.
    pub fn default_uniform(&self) -> f32 {
        self.default_value().as_uniform()
    }

    /// Checks the name is a usable WGSL identifier and the default lies in range.
    pub fn validate(&self) -> Result<(), String> {
        if !is_wgsl_ident(&self.name) {
            return Err(format!("param name '{}' is not a valid shader identifier", self.name));
        }
        if RESERVED_PARAM_NAMES.contains(&self.name.as_str()) {
            return Err(format!("param name '{}' collides with an engine uniform", self.name));
        }
        if let ParamKind::Range { min, max, step, default } = self.kind {
            if !(min <= max) {
                return Err(format!("param '{}': min {} > max {}", self.name, min, max));
            }
            if !(min..=max).contains(&default) {
                return Err(format!(
                    "param '{}': default {} outside [{}, {}]",
                    self.name, default, min, max
                ));
            }
            if !(step > 0.0) {
                return Err(format!("param '{}': step must be positive", self.name));
            }
        }
        Ok(())
    }
}

/// A layer's stored parameter value (`number | bool` in layer JSON).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f32),
}

impl ParamValue {
    pub fn as_uniform(self) -> f32 {
        match self {
            ParamValue::Number(v) => v,
            ParamValue::Bool(true) => 1.0,
            ParamValue::Bool(false) => 0.0,
        }
    }

    pub fn as_bool(self) -> bool {
        match self {
            ParamValue::Bool(b) => b,
            ParamValue::Number(v) => v != 0.0,
        }
    }
}

/// A layer's parameter values keyed by param name.
pub type ParamMap = std::collections::BTreeMap<String, ParamValue>;

/// Uniform names the engine always declares (`u_resolution`, ...).
const RESERVED_PARAM_NAMES: &[&str] = &["resolution", "opacity", "seed", "image", "sampler"];

pub(crate) fn is_wgsl_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    // A leading double underscore is reserved in WGSL.
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// Where an effect's WGSL body comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ShaderRef {
    /// Compiled into the binary.
    Inline(&'static str),
    /// Relative path inside the shader directory, fetched on first use.
    Path(String),
}

/// Immutable registry entry.  Never mutated after creation.
#[derive(Clone, Debug)]
pub struct EffectDescriptor {
    pub id: EffectId,
    pub name: String,
    pub category: String,
    pub shader: ShaderRef,
    pub params: Vec<ParamSpec>,
    pub needs_resolution: bool,
    pub needs_seed: bool,
    pub is_custom: bool,
}

impl EffectDescriptor {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (i, p) in self.params.iter().enumerate() {
            p.validate()?;
            if self.params[..i].iter().any(|q| q.name == p.name) {
                return Err(format!("duplicate param '{}'", p.name));
            }
        }
        Ok(())
    }
}

/// A descriptor together with its (possibly lazily fetched) WGSL body.
#[derive(Clone, Debug)]
pub struct ResolvedEffect {
    pub descriptor: Arc<EffectDescriptor>,
    pub source: Arc<str>,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Built-ins (shared, immutable) merged with custom extensions at lookup time.
pub struct EffectRegistry {
    builtins: Arc<BuiltinEffects>,
    custom: CustomEffects,
}

impl EffectRegistry {
    pub fn new(builtins: Arc<BuiltinEffects>) -> Self {
        Self {
            builtins,
            custom: CustomEffects::empty(),
        }
    }

    /// Registry with built-ins plus a custom-effect extension table.
    pub fn with_custom(builtins: Arc<BuiltinEffects>, custom: CustomEffects) -> Self {
        Self { builtins, custom }
    }

    pub fn builtins(&self) -> &Arc<BuiltinEffects> {
        &self.builtins
    }

    pub fn custom(&self) -> &CustomEffects {
        &self.custom
    }

    pub fn custom_mut(&mut self) -> &mut CustomEffects {
        &mut self.custom
    }

    /// Descriptor lookup without fetching any shader source.
    pub fn describe(&self, id: &str) -> Option<Arc<EffectDescriptor>> {
        self.builtins
            .get(id)
            .or_else(|| self.custom.descriptor(id))
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.builtins.get(id).is_some() || self.custom.descriptor(id).is_some()
    }

    /// Full resolution: descriptor plus WGSL body.  Custom sources are
    /// fetched on first use; a failed fetch leaves the effect unresolved.
    pub fn resolve(&mut self, id: &str) -> Option<ResolvedEffect> {
        if let Some(descriptor) = self.builtins.get(id) {
            if let ShaderRef::Inline(src) = descriptor.shader {
                return Some(ResolvedEffect {
                    descriptor: descriptor.clone(),
                    source: Arc::from(src),
                });
            }
        }
        self.custom.resolve(id)
    }

    /// All descriptors grouped by category, built-ins first.
    pub fn by_category(&self) -> Vec<(String, Vec<Arc<EffectDescriptor>>)> {
        let mut groups: Vec<(String, Vec<Arc<EffectDescriptor>>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let all = self
            .builtins
            .iter()
            .chain(self.custom.iter().filter(|d| self.builtins.get(d.id.as_str()).is_none()));
        for d in all {
            let slot = *index.entry(d.category.clone()).or_insert_with(|| {
                groups.push((d.category.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(d.clone());
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgsl_identifiers() {
        assert!(is_wgsl_ident("amount"));
        assert!(is_wgsl_ident("shadow_r2"));
        assert!(!is_wgsl_ident("2amount"));
        assert!(!is_wgsl_ident("blur-radius"));
        assert!(!is_wgsl_ident("__x"));
        assert!(!is_wgsl_ident(""));
    }

    #[test]
    fn param_default_must_be_in_range() {
        assert!(ParamSpec::range("amount", "Amount", 0.0, 1.0, 0.01, 0.5).validate().is_ok());
        assert!(ParamSpec::range("amount", "Amount", 0.0, 1.0, 0.01, 1.5).validate().is_err());
        assert!(ParamSpec::range("amount", "Amount", 1.0, 0.0, 0.01, 0.5).validate().is_err());
        assert!(ParamSpec::range("amount", "Amount", 0.0, 1.0, 0.0, 0.5).validate().is_err());
        assert!(ParamSpec::toggle("animate", "Animate", false).validate().is_ok());
    }

    #[test]
    fn param_values_upload_as_floats() {
        assert_eq!(ParamValue::Bool(true).as_uniform(), 1.0);
        assert_eq!(ParamValue::Bool(false).as_uniform(), 0.0);
        assert_eq!(ParamValue::Number(0.25).as_uniform(), 0.25);
        let v: ParamValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ParamValue::Bool(true));
        let v: ParamValue = serde_json::from_str("0.5").unwrap();
        assert_eq!(v, ParamValue::Number(0.5));
    }

    #[test]
    fn builtins_win_over_custom_ids() {
        let builtins = Arc::new(BuiltinEffects::new());
        let mut custom = CustomEffects::empty();
        custom.insert_for_test(EffectDescriptor {
            id: EffectId::new("brightness"),
            name: "Impostor".into(),
            category: "Custom".into(),
            shader: ShaderRef::Path("custom/brightness.wgsl".into()),
            params: vec![],
            needs_resolution: false,
            needs_seed: false,
            is_custom: true,
        });
        let registry = EffectRegistry::with_custom(builtins, custom);
        let d = registry.describe("brightness").unwrap();
        assert!(!d.is_custom);
        assert_ne!(d.name, "Impostor");
    }

    #[test]
    fn unknown_effect_does_not_resolve() {
        let mut registry = EffectRegistry::new(Arc::new(BuiltinEffects::new()));
        assert!(registry.resolve("doesNotExist").is_none());
        assert!(registry.resolve("invert").is_some());
    }
}
