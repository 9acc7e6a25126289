use clap::Parser;
use dispatchgrid_engine::config::{DEFAULT_GRID_SIZE, DEFAULT_SCALE};
use dispatchgrid_engine::EngineConfig;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "dispatchgrid-console", about = "Local operator console for the dispatch grid")]
pub struct Cli {
    /// Address the console listens on.
    #[arg(long, default_value = "127.0.0.1:39333")]
    pub listen: SocketAddr,

    /// Base URL of the dispatch authority API.
    #[arg(
        long,
        env = "DISPATCHGRID_AUTHORITY_URL",
        default_value = "http://127.0.0.1:8000/api"
    )]
    pub authority_url: String,

    /// Poll interval in milliseconds; 0 disables periodic refreshes.
    #[arg(long, default_value_t = 2000)]
    pub poll_ms: u64,

    /// Pixels per grid cell.
    #[arg(long, default_value_t = DEFAULT_SCALE)]
    pub scale: i64,

    /// Grid extent in cells. Skips asking the authority.
    #[arg(long)]
    pub grid_size: Option<i64>,
}

impl Cli {
    pub fn poll_interval(&self) -> Option<Duration> {
        (self.poll_ms > 0).then(|| Duration::from_millis(self.poll_ms))
    }

    /// Engine settings for a grid of `reported` cells, unless overridden.
    pub fn engine_config(&self, reported: Option<i64>) -> EngineConfig {
        let grid_size = self
            .grid_size
            .or(reported)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_GRID_SIZE);
        EngineConfig::default()
            .with_grid_size(grid_size)
            .with_scale(self.scale)
    }
}
