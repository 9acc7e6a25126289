use crate::grid::{GridMapper, NodeHandle, PixelPos, RenderLayer};
use crate::store::Snapshot;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// `1 - (1 - t)^3`, clamped to `[0, 1]`.
pub fn ease_out_cubic(progress: f64) -> f64 {
    let t = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tween {
    from: (f64, f64),
    to: (f64, f64),
    started: Instant,
    duration: Duration,
}

impl Tween {
    fn progress(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    fn position(&self, progress: f64) -> (f64, f64) {
        let eased = ease_out_cubic(progress);
        (
            self.from.0 + (self.to.0 - self.from.0) * eased,
            self.from.1 + (self.to.1 - self.from.1) * eased,
        )
    }
}

/// Interpolated position for one node in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnimatedNode {
    pub node: NodeHandle,
    pub x: f64,
    pub y: f64,
}

/// Per-entity pixel tweens. Tweens are keyed by entity id and resolved to
/// nodes through the render layer each frame, so a re-render mid-flight keeps
/// the animation on the right marker.
#[derive(Debug, Default)]
pub struct AnimationScheduler {
    tweens: HashMap<String, Tween>,
}

impl AnimationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn animate(
        &mut self,
        entity_id: impl Into<String>,
        from: PixelPos,
        to: PixelPos,
        duration: Duration,
        now: Instant,
    ) {
        self.tweens.insert(
            entity_id.into(),
            Tween {
                from: (from.x as f64, from.y as f64),
                to: (to.x as f64, to.y as f64),
                started: now,
                duration,
            },
        );
    }

    /// Starts a tween for every driver whose cell changed between snapshots.
    pub fn track_moves(
        &mut self,
        previous: &Snapshot,
        current: &Snapshot,
        mapper: &GridMapper,
        duration: Duration,
        now: Instant,
    ) -> usize {
        let mut moved = 0;
        for driver in &current.drivers {
            let Some(before) = previous.driver(&driver.id) else {
                continue;
            };
            if before.location == driver.location
                || !mapper.contains(before.location)
                || !mapper.contains(driver.location)
            {
                continue;
            }
            self.animate(
                driver.id.clone(),
                mapper.to_pixel(before.location),
                mapper.to_pixel(driver.location),
                duration,
                now,
            );
            moved += 1;
        }
        moved
    }

    /// Positions for this frame. A tween reports its final position once and is
    /// then dropped; tweens whose entity left the layer are dropped silently.
    pub fn frame(&mut self, layer: &RenderLayer, now: Instant) -> Vec<AnimatedNode> {
        let mut out = Vec::with_capacity(self.tweens.len());
        self.tweens.retain(|id, tween| {
            let Some(node) = layer.driver_node(id) else {
                return false;
            };
            let progress = tween.progress(now);
            let (x, y) = tween.position(progress);
            out.push(AnimatedNode { node, x, y });
            progress < 1.0
        });
        out.sort_by_key(|n| n.node.0);
        out
    }

    pub fn is_idle(&self) -> bool {
        self.tweens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tweens.len()
    }
}
