use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub x: i64,
    pub y: i64,
}

impl Location {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn within(&self, extent: i64) -> bool {
        (0..extent).contains(&self.x) && (0..extent).contains(&self.y)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    // Older authorities report an idle driver as "available".
    #[serde(alias = "available")]
    Idle,
    Assigned,
    OnTrip,
    Offline,
}

impl DriverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Assigned => "assigned",
            Self::OnTrip => "on_trip",
            Self::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Waiting,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    Rejected,
    Failed,
}

impl RideStatus {
    /// Waiting and assigned rides are drawn on the grid and may be cancelled.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Assigned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub id: String,
    pub location: Location,
    pub status: DriverStatus,
    #[serde(default)]
    pub assigned_rides: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rider {
    pub id: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: String,
    pub rider_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub status: RideStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_driver_id: Option<String>,
}

/// Opaque trip record passed through from the aggregate state endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveTrip(pub serde_json::Value);

impl ActiveTrip {
    pub fn ride_id(&self) -> Option<&str> {
        self.0.get("ride_id").and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    #[serde(default)]
    pub active_trips: Vec<ActiveTrip>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequestBody {
    pub rider_id: String,
    pub pickup: Location,
    pub dropoff: Location,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickResponse {
    pub message: String,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridInfo {
    pub width: i64,
    pub height: i64,
}

/// Error body returned by the authority on rejected calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Swap {
    Replace,
    Remove,
}

impl Default for Swap {
    fn default() -> Self {
        Self::Replace
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub target: String,
    #[serde(default)]
    pub swap: Swap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Patch {
    pub fn replace(target: &str, html: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            swap: Swap::Replace,
            html: Some(html.into()),
            payload: None,
        }
    }

    pub fn remove(target: &str) -> Self {
        Self {
            target: target.to_string(),
            swap: Swap::Remove,
            html: None,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiUpdate {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub patches: Vec<Patch>,
}

impl UiUpdate {
    pub fn new(event: impl Into<String>, patches: Vec<Patch>) -> Self {
        Self {
            event: event.into(),
            payload: None,
            patches,
        }
    }

    pub fn patch(&self, target: &str) -> Option<&Patch> {
        self.patches.iter().find(|p| p.target == target)
    }
}

pub mod targets {
    pub const GRID: &str = "grid";
    pub const MODE_STATUS: &str = "mode.status";
    pub const NOTIFICATION: &str = "notification";
    pub const DRIVERS_TABLE: &str = "table.drivers";
    pub const RIDERS_TABLE: &str = "table.riders";
    pub const RIDES_TABLE: &str = "table.rides";
    pub const RIDER_SELECT: &str = "form.rider";
}
