use std::time::Duration;

pub const DEFAULT_GRID_SIZE: i64 = 100;
pub const DEFAULT_SCALE: i64 = 6;
/// Upper bound on cells per side.
pub const MAX_GRID_SIZE: i64 = 10_000;
/// Upper bound on pixels per cell.
pub const MAX_SCALE: i64 = 256;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cells per side; valid coordinates are `0..grid_size`.
    pub grid_size: i64,
    /// Pixels per cell.
    pub scale: i64,
    pub notification_ttl: Duration,
    /// Fade applied to a visible notification displaced by a newer one.
    pub retire_fade: Duration,
    /// Fade applied when a notification outlives its ttl.
    pub expire_fade: Duration,
    /// Attached notifications, fading ones included.
    pub max_attached: usize,
    pub animation_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            scale: DEFAULT_SCALE,
            notification_ttl: Duration::from_millis(3_000),
            retire_fade: Duration::from_millis(300),
            expire_fade: Duration::from_millis(400),
            max_attached: 4,
            animation_duration: Duration::from_millis(800),
        }
    }
}

impl EngineConfig {
    pub fn with_grid_size(mut self, grid_size: i64) -> Self {
        self.grid_size = grid_size.clamp(1, MAX_GRID_SIZE);
        self
    }

    pub fn with_scale(mut self, scale: i64) -> Self {
        self.scale = scale.clamp(1, MAX_SCALE);
        self
    }
}
