// ============================================================================
// LAYER HISTORY — bounded undo/redo over whole-list snapshots
// ============================================================================
//
// Layer lists are a handful of small structs, so every edit stores the list
// as it was before and after.  Undo/redo swap the stored list back in; the
// stack's id counter lives outside the history and is never rewound.

use std::collections::VecDeque;

use super::layers::Layer;

/// One recorded edit.
#[derive(Clone, Debug)]
pub struct LayerEdit {
    pub label: String,
    before: Vec<Layer>,
    after: Vec<Layer>,
}

impl LayerEdit {
    pub fn new(label: impl Into<String>, before: Vec<Layer>, after: Vec<Layer>) -> Self {
        Self { label: label.into(), before, after }
    }
}

pub struct HistoryManager {
    done: VecDeque<LayerEdit>,
    undone: Vec<LayerEdit>,
    max_steps: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(50)
    }
}

impl HistoryManager {
    /// `max_steps == 0` disables history entirely.
    pub fn new(max_steps: usize) -> Self {
        Self { done: VecDeque::new(), undone: Vec::new(), max_steps }
    }

    /// Record an edit.  Anything that could have been redone is dropped, and
    /// the oldest edits fall off once the bound is reached.
    pub fn record(&mut self, edit: LayerEdit) {
        self.undone.clear();
        if self.max_steps == 0 {
            return;
        }
        self.done.push_back(edit);
        while self.done.len() > self.max_steps {
            self.done.pop_front();
        }
    }

    pub fn undo(&mut self, layers: &mut Vec<Layer>) -> Option<String> {
        let edit = self.done.pop_back()?;
        layers.clone_from(&edit.before);
        let label = edit.label.clone();
        self.undone.push(edit);
        Some(label)
    }

    pub fn redo(&mut self, layers: &mut Vec<Layer>) -> Option<String> {
        let edit = self.undone.pop()?;
        layers.clone_from(&edit.after);
        let label = edit.label.clone();
        self.done.push_back(edit);
        Some(label)
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.done.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.undone.last().map(|e| e.label.as_str())
    }

    /// Undo labels, most recent first.
    pub fn labels(&self) -> Vec<&str> {
        self.done.iter().rev().map(|e| e.label.as_str()).collect()
    }

    pub fn clear(&mut self) {
        self.done.clear();
        self.undone.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layers::LayerId;
    use crate::effects::{EffectId, ParamMap};

    fn layer(id: u64) -> Layer {
        Layer {
            id: LayerId(id),
            effect: EffectId::new("invert"),
            enabled: true,
            opacity: 1.0,
            params: ParamMap::new(),
            seed: None,
        }
    }

    #[test]
    fn undo_then_redo_restores_lists() {
        let mut history = HistoryManager::new(10);
        let mut layers = vec![layer(1)];
        let before = layers.clone();
        layers.push(layer(2));
        history.record(LayerEdit::new("Add layer", before, layers.clone()));

        assert_eq!(history.undo(&mut layers).as_deref(), Some("Add layer"));
        assert_eq!(layers.len(), 1);
        assert_eq!(history.redo_label(), Some("Add layer"));

        assert_eq!(history.redo(&mut layers).as_deref(), Some("Add layer"));
        assert_eq!(layers.len(), 2);
        assert!(!history.can_redo());
    }

    #[test]
    fn new_edits_drop_redo_and_old_edits_fall_off() {
        let mut history = HistoryManager::new(2);
        let mut layers = Vec::new();
        for i in 0..3 {
            let before = layers.clone();
            layers.push(layer(i));
            history.record(LayerEdit::new(format!("step {i}"), before, layers.clone()));
        }
        assert_eq!(history.labels(), vec!["step 2", "step 1"]);

        history.undo(&mut layers);
        assert!(history.can_redo());
        history.record(LayerEdit::new("fork", layers.clone(), layers.clone()));
        assert!(!history.can_redo());
        assert_eq!(history.undo_label(), Some("fork"));

        history.clear();
        assert!(!history.can_undo());
    }

    #[test]
    fn zero_steps_keeps_nothing() {
        let mut history = HistoryManager::new(0);
        history.record(LayerEdit::new("Add layer", vec![], vec![layer(1)]));
        assert!(!history.can_undo());
        assert!(history.undo(&mut Vec::new()).is_none());
    }
}
