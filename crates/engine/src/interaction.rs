use crate::authority::Authority;
use crate::gateway::{CommandError, CommandGateway};
use crate::grid::GridMapper;
use crate::notify::{Notifier, Severity};
use dispatchgrid_protocol::Location;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    None,
    #[serde(alias = "driver-placement")]
    Driver,
    #[serde(alias = "rider-placement")]
    Rider,
}

impl InteractionMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "View Only",
            Self::Driver => "Click grid to add Driver",
            Self::Rider => "Click grid to add Rider",
        }
    }

    pub fn cursor(&self) -> Cursor {
        match self {
            Self::None => Cursor::Default,
            Self::Driver | Self::Rider => Cursor::Crosshair,
        }
    }

    fn announcement(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Driver => {
                Some("Driver mode activated! Click anywhere on the grid to add drivers.")
            }
            Self::Rider => Some("Rider mode activated! Click anywhere on the grid to add riders."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cursor {
    Default,
    Crosshair,
}

impl Cursor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Crosshair => "crosshair",
        }
    }
}

/// What the UI needs to reflect a mode switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeChange {
    pub mode: InteractionMode,
    pub cursor: Cursor,
    pub label: &'static str,
}

/// A grid click resolved to a creation command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Driver(Location),
    Rider(Location),
}

#[derive(Debug)]
pub enum Placed {
    Driver(dispatchgrid_protocol::Driver),
    Rider(dispatchgrid_protocol::Rider),
}

/// Exclusive placement mode plus the pixel -> command translation.
#[derive(Debug, Clone)]
pub struct InteractionController {
    mode: InteractionMode,
    mapper: GridMapper,
    notifier: Notifier,
}

impl InteractionController {
    pub fn new(mapper: GridMapper, notifier: Notifier) -> Self {
        Self {
            mode: InteractionMode::None,
            mapper,
            notifier,
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn status(&self) -> ModeChange {
        ModeChange {
            mode: self.mode,
            cursor: self.mode.cursor(),
            label: self.mode.label(),
        }
    }

    pub fn select_mode(&mut self, mode: InteractionMode) -> ModeChange {
        self.mode = mode;
        if let Some(text) = mode.announcement() {
            self.notifier.push(text, Severity::Info);
        }
        self.status()
    }

    /// Resolves a pixel click under the current mode. Clicks in view-only mode
    /// and clicks off the grid resolve to nothing.
    pub fn placement_at(&self, px: f64, py: f64) -> Option<Placement> {
        let cell = self.mapper.to_cell(px, py)?;
        match self.mode {
            InteractionMode::None => None,
            InteractionMode::Driver => Some(Placement::Driver(cell)),
            InteractionMode::Rider => Some(Placement::Rider(cell)),
        }
    }
}

/// Dispatches a resolved placement through the gateway.
pub async fn dispatch<A: Authority>(
    gateway: &CommandGateway<A>,
    placement: Placement,
) -> Result<Placed, CommandError> {
    match placement {
        Placement::Driver(at) => gateway.create_driver(at).await.map(Placed::Driver),
        Placement::Rider(at) => gateway.create_rider(at).await.map(Placed::Rider),
    }
}
