// ============================================================================
// LAYER MODEL — ordered filter layers, monotonic ids, seeds, undo/redo
// ============================================================================
//
// The list order is render order.  Disabled layers stay in place; filtering
// happens inside the engine.  Ids are never reused, even across undo, so
// reordering and history always re-match layers by id.

use serde::{Deserialize, Serialize};

use super::history::{HistoryManager, LayerEdit};
use super::presets::Preset;
use crate::effects::{EffectDescriptor, EffectId, EffectRegistry, ParamMap, ParamValue};
use crate::error::FxResult;

/// Session-unique layer identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub u64);

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One filter layer.  Serialises as
/// `{id, effect, enabled, opacity, params, seed?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub effect: EffectId,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub params: ParamMap,
    /// Frozen random seed for effects that declare `needs_seed`.  Drawn at
    /// creation / effect switch, never at render time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<f32>,
}

fn default_enabled() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

impl Layer {
    /// Fresh layer for `descriptor` with every declared param back-filled.
    pub fn new(id: LayerId, descriptor: &EffectDescriptor, seeds: &mut dyn SeedSource) -> Self {
        let mut layer = Self {
            id,
            effect: descriptor.id.clone(),
            enabled: true,
            opacity: 1.0,
            params: ParamMap::new(),
            seed: None,
        };
        layer.reset_for(descriptor, seeds);
        layer
    }

    /// Re-default params and redraw the seed for `descriptor`.
    fn reset_for(&mut self, descriptor: &EffectDescriptor, seeds: &mut dyn SeedSource) {
        self.effect = descriptor.id.clone();
        self.params = descriptor.params.iter().map(|p| (p.name.clone(), p.default_value())).collect();
        self.seed = descriptor.needs_seed.then(|| seeds.next_seed());
    }

    /// Adds defaults for declared params the layer does not carry yet.
    pub fn backfill(&mut self, descriptor: &EffectDescriptor) {
        for p in &descriptor.params {
            self.params.entry(p.name.clone()).or_insert_with(|| p.default_value());
        }
    }

    /// Animated layers carry a seed and `params.animate == true`.
    pub fn is_animated(&self) -> bool {
        self.seed.is_some() && self.params.get("animate").map(|v| v.as_bool()).unwrap_or(false)
    }
}

// ============================================================================
// SEEDS
// ============================================================================

/// Exclusive upper bound for drawn seeds.
pub const SEED_RANGE: f32 = 1000.0;

/// Where fresh layer seeds come from.
pub trait SeedSource: Send {
    /// A value in `[0, SEED_RANGE)`.
    fn next_seed(&mut self) -> f32;
}

/// Seeds from the random bits of a v4 uuid.
#[derive(Default)]
pub struct EntropySeeds;

impl SeedSource for EntropySeeds {
    fn next_seed(&mut self) -> f32 {
        let bits = uuid::Uuid::new_v4().as_u128();
        (bits % 1_000_000) as f32 / 1000.0
    }
}

/// Deterministic arithmetic sequence, wrapping inside the seed range.
pub struct SequenceSeeds {
    next: f32,
    step: f32,
}

impl SequenceSeeds {
    pub fn new(start: f32, step: f32) -> Self {
        Self { next: start, step }
    }
}

impl SeedSource for SequenceSeeds {
    fn next_seed(&mut self) -> f32 {
        let seed = self.next.rem_euclid(SEED_RANGE);
        self.next += self.step;
        seed
    }
}

// ============================================================================
// LAYER STACK
// ============================================================================

pub struct LayerStack {
    layers: Vec<Layer>,
    next_id: u64,
    history: HistoryManager,
    seeds: Box<dyn SeedSource>,
}

impl LayerStack {
    pub fn new(max_undo_steps: usize) -> Self {
        Self::with_seed_source(max_undo_steps, Box::new(EntropySeeds))
    }

    pub fn with_seed_source(max_undo_steps: usize, seeds: Box<dyn SeedSource>) -> Self {
        Self {
            layers: Vec::new(),
            next_id: 1,
            history: HistoryManager::new(max_undo_steps),
            seeds,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Direct mutable access that bypasses history.  Used by the animation
    /// loop, which only advances seeds.
    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    fn fresh_id(&mut self) -> LayerId {
        let id = LayerId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Apply `edit` and record it as one undo step.  Edits that change
    /// nothing are not recorded.
    fn record(&mut self, description: &str, edit: impl FnOnce(&mut Self) -> bool) -> bool {
        let before = self.layers.clone();
        if !edit(self) || before == self.layers {
            return false;
        }
        let after = self.layers.clone();
        self.history.record(LayerEdit::new(description, before, after));
        true
    }

    /// Append a new layer for `descriptor`.
    pub fn add(&mut self, descriptor: &EffectDescriptor) -> LayerId {
        let id = self.fresh_id();
        let label = format!("Add {}", descriptor.name);
        self.record(&label, |s| {
            let layer = Layer::new(id, descriptor, s.seeds.as_mut());
            s.layers.push(layer);
            true
        });
        id
    }

    pub fn remove(&mut self, id: LayerId) -> bool {
        self.record("Remove layer", |s| match s.index_of(id) {
            Some(i) => {
                s.layers.remove(i);
                true
            }
            None => false,
        })
    }

    /// Splice layer `id` to position `to` (clamped to the list).
    pub fn move_layer(&mut self, id: LayerId, to: usize) -> bool {
        self.record("Move layer", |s| match s.index_of(id) {
            Some(from) => {
                let layer = s.layers.remove(from);
                let to = to.min(s.layers.len());
                s.layers.insert(to, layer);
                true
            }
            None => false,
        })
    }

    pub fn set_enabled(&mut self, id: LayerId, enabled: bool) -> bool {
        let label = if enabled { "Enable layer" } else { "Disable layer" };
        self.record(label, |s| match s.index_of(id) {
            Some(i) => {
                s.layers[i].enabled = enabled;
                true
            }
            None => false,
        })
    }

    pub fn set_opacity(&mut self, id: LayerId, opacity: f32) -> bool {
        let opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        self.record("Change opacity", |s| match s.index_of(id) {
            Some(i) => {
                s.layers[i].opacity = opacity;
                true
            }
            None => false,
        })
    }

    pub fn set_param(&mut self, id: LayerId, name: &str, value: ParamValue) -> bool {
        let label = format!("Change {}", name);
        self.record(&label, |s| match s.index_of(id) {
            Some(i) => {
                s.layers[i].params.insert(name.to_string(), value);
                true
            }
            None => false,
        })
    }

    /// Point layer `id` at a different effect, re-defaulting its params and
    /// drawing a fresh seed if the new effect needs one.
    pub fn switch_effect(&mut self, id: LayerId, descriptor: &EffectDescriptor) -> bool {
        let label = format!("Switch to {}", descriptor.name);
        self.record(&label, |s| match s.index_of(id) {
            Some(i) => {
                s.layers[i].reset_for(descriptor, s.seeds.as_mut());
                true
            }
            None => false,
        })
    }

    pub fn clear(&mut self) -> bool {
        self.record("Clear layers", |s| {
            s.layers.clear();
            true
        })
    }

    /// Replace the list with a preset's layers: fresh ids, fresh seeds.
    /// Effects the registry does not know are kept as-is and will be
    /// skipped at render time.
    pub fn load_preset(&mut self, preset: &Preset, registry: &EffectRegistry) -> bool {
        let label = format!("Load preset {}", preset.name);
        self.record(&label, |s| {
            let mut loaded = Vec::with_capacity(preset.layers.len());
            for pl in &preset.layers {
                let id = s.fresh_id();
                let mut layer = match registry.describe(pl.effect.as_str()) {
                    Some(d) => Layer::new(id, &d, s.seeds.as_mut()),
                    None => {
                        tracing::warn!(effect = %pl.effect, preset = %preset.name, "preset references unknown effect");
                        Layer {
                            id,
                            effect: pl.effect.clone(),
                            enabled: true,
                            opacity: 1.0,
                            params: ParamMap::new(),
                            seed: None,
                        }
                    }
                };
                layer.params.extend(pl.params.iter().map(|(k, v)| (k.clone(), *v)));
                layer.opacity = pl.opacity.clamp(0.0, 1.0);
                loaded.push(layer);
            }
            s.layers = loaded;
            true
        })
    }

    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.layers)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.layers)
    }

    // ------------------------------------------------------------------------
    // JSON
    // ------------------------------------------------------------------------

    pub fn to_json(&self) -> FxResult<String> {
        Ok(serde_json::to_string_pretty(&self.layers)?)
    }

    /// Replace the list from layer JSON.  Imported ids are kept; the id
    /// counter moves past them so later layers never collide.
    pub fn import_json(&mut self, json: &str, registry: &EffectRegistry) -> FxResult<()> {
        let mut imported: Vec<Layer> = serde_json::from_str(json)?;
        for layer in &mut imported {
            layer.opacity = layer.opacity.clamp(0.0, 1.0);
            if let Some(d) = registry.describe(layer.effect.as_str()) {
                layer.backfill(&d);
                if d.needs_seed && layer.seed.is_none() {
                    layer.seed = Some(self.seeds.next_seed());
                }
            }
        }
        let max_id = imported.iter().map(|l| l.id.0).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id + 1);
        self.record("Import layers", |s| {
            s.layers = imported;
            true
        });
        Ok(())
    }
}
