// ============================================================================
// SESSION STATUS — the one-line outcome shown to the user
// ============================================================================

use std::fmt;

use crate::gpu::renderer::{RenderReport, SkipReason};

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Idle,
    Success(String),
    Error(String),
}

/// Latest terminal outcome plus whether any layer has been skipped since
/// the last clean render.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionStatus {
    outcome: Outcome,
    degraded: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self { outcome: Outcome::Idle, degraded: None }
    }
}

impl SessionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn success(&mut self, msg: impl Into<String>) {
        self.outcome = Outcome::Success(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::error!("{msg}");
        self.outcome = Outcome::Error(msg);
    }

    /// Fold a render report in: a frame with skipped layers marks the
    /// session degraded, a clean frame clears it.
    pub fn record_render(&mut self, report: &RenderReport) {
        if report.skipped.is_empty() {
            self.degraded = None;
            return;
        }
        let unknown = report.skipped.iter().filter(|s| s.reason == SkipReason::UnknownEffect).count();
        let broken = report.skipped.len() - unknown;
        let mut parts = Vec::new();
        if unknown > 0 {
            parts.push(format!("{} unknown effect{}", unknown, if unknown == 1 { "" } else { "s" }));
        }
        if broken > 0 {
            parts.push(format!("{} shader{} failed to compile", broken, if broken == 1 { "" } else { "s" }));
        }
        self.degraded = Some(parts.join(", "));
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Idle => write!(f, "Ready")?,
            Outcome::Success(msg) => write!(f, "OK: {}", msg)?,
            Outcome::Error(msg) => write!(f, "Error: {}", msg)?,
        }
        if let Some(d) = &self.degraded {
            write!(f, " (degraded: {})", d)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layers::LayerId;
    use crate::effects::EffectId;
    use crate::gpu::renderer::SkippedLayer;

    fn skipped(reason: SkipReason) -> SkippedLayer {
        SkippedLayer { layer_id: LayerId(1), effect: EffectId::new("nope"), reason }
    }

    #[test]
    fn degraded_state_tracks_the_latest_frame() {
        let mut status = SessionStatus::new();
        status.success("rendered 3 passes");
        assert_eq!(status.to_string(), "OK: rendered 3 passes");

        let report = RenderReport {
            skipped: vec![skipped(SkipReason::UnknownEffect), skipped(SkipReason::CompileFailed)],
            ..Default::default()
        };
        status.record_render(&report);
        assert!(status.is_degraded());
        assert_eq!(
            status.to_string(),
            "OK: rendered 3 passes (degraded: 1 unknown effect, 1 shader failed to compile)"
        );

        status.record_render(&RenderReport::default());
        assert!(!status.is_degraded());
        status.error("device lost");
        assert_eq!(status.outcome(), &Outcome::Error("device lost".into()));
    }
}
