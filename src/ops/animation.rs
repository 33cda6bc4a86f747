// ============================================================================
// ANIMATION — seed advancement for animated layers at a fixed cadence
// ============================================================================
//
// Only the `seed` of layers whose `animate` param is on ever changes.  The
// frame number comes from elapsed time at the configured fps, so a slow
// frame skips seeds instead of slowing the animation down.  When a layer
// stops animating its seed returns to the value it had before.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::components::layers::{Layer, LayerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    NothingAnimated,
    FrameLimit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Seeds were advanced to `frame`; render now.
    Continue { frame: u64 },
    Stop(StopReason),
}

pub struct Animator {
    fps: u32,
    stride: f32,
    started: Option<Instant>,
    /// Seed each layer had at its first animated tick.
    bases: HashMap<LayerId, f32>,
    cancel: Arc<AtomicBool>,
}

impl Animator {
    pub fn new(fps: u32, stride: f32) -> Self {
        Self {
            fps: fps.max(1),
            stride,
            started: None,
            bases: HashMap::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps as f64)
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Advance using wall-clock time since the first tick.
    pub fn tick(&mut self, layers: &mut [Layer]) -> Tick {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.tick_at(layers, started.elapsed())
    }

    /// Advance as if `elapsed` had passed since the animation started.
    pub fn tick_at(&mut self, layers: &mut [Layer], elapsed: Duration) -> Tick {
        if self.cancel.load(Ordering::SeqCst) {
            return Tick::Stop(StopReason::Cancelled);
        }

        let frame = (elapsed.as_secs_f64() * self.fps as f64).floor() as u64;
        let mut any = false;
        for layer in layers.iter_mut() {
            if layer.is_animated() {
                any = true;
                let base = *self.bases.entry(layer.id).or_insert(layer.seed.unwrap_or(0.0));
                layer.seed = Some(base + frame as f32 * self.stride);
            } else if let Some(base) = self.bases.remove(&layer.id) {
                // Animation switched off: freeze the layer at its original seed.
                if layer.seed.is_some() {
                    layer.seed = Some(base);
                }
            }
        }

        if any {
            Tick::Continue { frame }
        } else {
            Tick::Stop(StopReason::NothingAnimated)
        }
    }

    /// Put every animated layer back on its original seed.
    pub fn restore(&mut self, layers: &mut [Layer]) {
        for layer in layers.iter_mut() {
            if let (Some(base), Some(_)) = (self.bases.get(&layer.id), layer.seed) {
                layer.seed = Some(*base);
            }
        }
        self.bases.clear();
        self.started = None;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnimationSummary {
    pub frames_rendered: u64,
    pub stop: StopReason,
}

/// Drives an `Animator` at its cadence, rendering after every tick.
pub struct AnimationLoop {
    animator: Animator,
    max_frames: Option<u64>,
}

impl AnimationLoop {
    pub fn new(animator: Animator, max_frames: Option<u64>) -> Self {
        Self { animator, max_frames }
    }

    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    /// Run until cancelled, until no layer animates, or until the frame
    /// limit.  A render error ends the loop and is returned.
    pub fn run<E, F>(&mut self, layers: &mut [Layer], mut render: F) -> Result<AnimationSummary, E>
    where
        F: FnMut(u64, &[Layer]) -> Result<(), E>,
    {
        let interval = self.animator.frame_interval();
        let start = Instant::now();
        let mut frames_rendered = 0u64;

        let stop = loop {
            if self.max_frames.is_some_and(|max| frames_rendered >= max) {
                break StopReason::FrameLimit;
            }
            let frame = match self.animator.tick(layers) {
                Tick::Stop(reason) => break reason,
                Tick::Continue { frame } => frame,
            };
            render(frame, layers)?;
            frames_rendered += 1;

            let next = start + interval * frames_rendered as u32;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        };

        tracing::debug!(frames = frames_rendered, ?stop, "animation loop stopped");
        Ok(AnimationSummary { frames_rendered, stop })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{EffectId, ParamMap, ParamValue};

    fn layer(id: u64, animate: bool, seed: Option<f32>) -> Layer {
        let mut params = ParamMap::new();
        params.insert("animate".into(), ParamValue::Bool(animate));
        Layer {
            id: LayerId(id),
            effect: EffectId::new("grain"),
            enabled: true,
            opacity: 1.0,
            params,
            seed,
        }
    }

    #[test]
    fn seeds_advance_with_elapsed_frames() {
        let mut animator = Animator::new(30, 2.0);
        let mut layers = vec![layer(1, true, Some(100.0)), layer(2, false, Some(7.0))];

        assert_eq!(animator.tick_at(&mut layers, Duration::ZERO), Tick::Continue { frame: 0 });
        assert_eq!(layers[0].seed, Some(100.0));

        assert_eq!(animator.tick_at(&mut layers, Duration::from_millis(100)), Tick::Continue { frame: 3 });
        assert_eq!(layers[0].seed, Some(106.0));
        assert_eq!(layers[1].seed, Some(7.0));
    }

    #[test]
    fn stops_when_nothing_animates_or_cancelled() {
        let mut animator = Animator::new(30, 1.0);
        let mut still = vec![layer(1, false, Some(3.0)), layer(2, true, None)];
        assert_eq!(animator.tick_at(&mut still, Duration::ZERO), Tick::Stop(StopReason::NothingAnimated));

        let mut moving = vec![layer(1, true, Some(3.0))];
        animator.cancel();
        assert_eq!(animator.tick_at(&mut moving, Duration::ZERO), Tick::Stop(StopReason::Cancelled));
        assert_eq!(moving[0].seed, Some(3.0));
    }

    #[test]
    fn turning_animation_off_restores_the_seed() {
        let mut animator = Animator::new(10, 1.0);
        let mut layers = vec![layer(1, true, Some(50.0)), layer(2, true, Some(1.0))];
        animator.tick_at(&mut layers, Duration::from_secs(2));
        assert_eq!(layers[0].seed, Some(70.0));

        layers[0].params.insert("animate".into(), ParamValue::Bool(false));
        animator.tick_at(&mut layers, Duration::from_secs(3));
        assert_eq!(layers[0].seed, Some(50.0));
        assert_eq!(layers[1].seed, Some(31.0));

        animator.restore(&mut layers);
        assert_eq!(layers[1].seed, Some(1.0));
    }

    #[test]
    fn loop_honours_frame_limit_and_render_errors() {
        let mut layers = vec![layer(1, true, Some(0.0))];
        let mut seen = Vec::new();
        let summary = AnimationLoop::new(Animator::new(1000, 1.0), Some(3))
            .run(&mut layers, |frame, ls| {
                seen.push((frame, ls[0].seed));
                Ok::<(), String>(())
            })
            .unwrap();
        assert_eq!(summary, AnimationSummary { frames_rendered: 3, stop: StopReason::FrameLimit });
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));

        let err = AnimationLoop::new(Animator::new(1000, 1.0), None)
            .run(&mut layers, |_, _| Err("device lost".to_string()))
            .unwrap_err();
        assert_eq!(err, "device lost");
    }

    #[test]
    fn loop_stops_on_cancel_from_inside_a_frame() {
        let animator = Animator::new(1000, 1.0);
        let cancel = animator.cancel_handle();
        let mut layers = vec![layer(1, true, Some(0.0))];
        let summary = AnimationLoop::new(animator, None)
            .run(&mut layers, |_, _| {
                cancel.store(true, Ordering::SeqCst);
                Ok::<(), String>(())
            })
            .unwrap();
        assert_eq!(summary, AnimationSummary { frames_rendered: 1, stop: StopReason::Cancelled });
    }
}
