use crate::config::{EngineConfig, MAX_GRID_SIZE, MAX_SCALE};
use crate::store::Snapshot;
use dispatchgrid_protocol::{DriverStatus, Location};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelPos {
    pub x: i64,
    pub y: i64,
}

/// Grid <-> pixel transform. Pixel to grid is the exact inverse of the scaling
/// and refuses anything that lands outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridMapper {
    grid_size: i64,
    scale: i64,
}

impl GridMapper {
    pub fn new(grid_size: i64, scale: i64) -> Self {
        Self {
            grid_size: grid_size.clamp(1, MAX_GRID_SIZE),
            scale: scale.clamp(1, MAX_SCALE),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.grid_size, config.scale)
    }

    pub fn grid_size(&self) -> i64 {
        self.grid_size
    }

    pub fn scale(&self) -> i64 {
        self.scale
    }

    /// Side length of the whole grid in pixels.
    pub fn extent_px(&self) -> i64 {
        self.grid_size.saturating_mul(self.scale)
    }

    pub fn contains(&self, cell: Location) -> bool {
        cell.within(self.grid_size)
    }

    /// Saturates for cells far outside the grid; callers that draw should
    /// check `contains` first.
    pub fn to_pixel(&self, cell: Location) -> PixelPos {
        PixelPos {
            x: cell.x.saturating_mul(self.scale),
            y: cell.y.saturating_mul(self.scale),
        }
    }

    pub fn to_cell(&self, px: f64, py: f64) -> Option<Location> {
        if !px.is_finite() || !py.is_finite() {
            return None;
        }
        let scale = self.scale as f64;
        let cell = Location::new((px / scale).floor() as i64, (py / scale).floor() as i64);
        self.contains(cell).then_some(cell)
    }
}

/// Horizontal run at the pickup row, then the vertical run at the dropoff column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManhattanPath {
    /// From pickup.x toward dropoff.x, both ends included.
    pub horizontal: Vec<Location>,
    /// From dropoff.y back toward pickup.y; the corner cell belongs to `horizontal`.
    pub vertical: Vec<Location>,
}

impl ManhattanPath {
    pub fn cells(&self) -> impl Iterator<Item = Location> + '_ {
        self.horizontal.iter().chain(self.vertical.iter()).copied()
    }
}

pub fn manhattan_path(pickup: Location, dropoff: Location) -> ManhattanPath {
    let dx = dropoff.x - pickup.x;
    let horizontal = (0..=dx.abs())
        .map(|i| Location::new(pickup.x + dx.signum() * i, pickup.y))
        .collect();

    let dy = dropoff.y - pickup.y;
    let vertical = (0..dy.abs())
        .map(|i| Location::new(dropoff.x, dropoff.y - dy.signum() * i))
        .collect();

    ManhattanPath {
        horizontal,
        vertical,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MarkerKind {
    Driver(DriverStatus),
    Rider,
    Pickup,
    Dropoff,
    Path,
}

impl MarkerKind {
    pub fn css_class(&self) -> String {
        match self {
            Self::Driver(status) => format!("entity driver {}", status.as_str()),
            Self::Rider => "entity rider".to_string(),
            Self::Pickup => "entity pickup".to_string(),
            Self::Dropoff => "entity dropoff".to_string(),
            Self::Path => "entity path".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub cell: Location,
    pub pixel: PixelPos,
    pub entity_id: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NodeHandle(pub usize);

/// The rendered grid: every marker plus per-family entity id -> node lookups.
/// Driver and rider ids live in separate namespaces on the authority, so they
/// get separate maps here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderLayer {
    markers: Vec<Marker>,
    drivers: HashMap<String, NodeHandle>,
    riders: HashMap<String, NodeHandle>,
}

impl RenderLayer {
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn marker(&self, handle: NodeHandle) -> Option<&Marker> {
        self.markers.get(handle.0)
    }

    /// Node drawn for a driver; animations target these.
    pub fn driver_node(&self, driver_id: &str) -> Option<NodeHandle> {
        self.drivers.get(driver_id).copied()
    }

    pub fn rider_node(&self, rider_id: &str) -> Option<NodeHandle> {
        self.riders.get(rider_id).copied()
    }

    pub fn path_cells(&self) -> impl Iterator<Item = Location> + '_ {
        self.markers
            .iter()
            .filter(|m| m.kind == MarkerKind::Path)
            .map(|m| m.cell)
    }

    fn clear(&mut self) {
        self.markers.clear();
        self.drivers.clear();
        self.riders.clear();
    }

    fn emit(&mut self, kind: MarkerKind, cell: Location, mapper: &GridMapper) -> NodeHandle {
        let handle = NodeHandle(self.markers.len());
        self.markers.push(Marker {
            kind,
            cell,
            pixel: mapper.to_pixel(cell),
            entity_id: None,
            title: None,
        });
        handle
    }

    fn emit_entity(
        &mut self,
        kind: MarkerKind,
        cell: Location,
        id: &str,
        title: String,
        mapper: &GridMapper,
    ) -> NodeHandle {
        let handle = self.emit(kind, cell, mapper);
        let marker = &mut self.markers[handle.0];
        marker.entity_id = Some(id.to_string());
        marker.title = Some(title);
        handle
    }
}

/// Sole writer of the render layer; every render starts from empty.
#[derive(Debug, Clone)]
pub struct GridRenderer {
    mapper: GridMapper,
    layer: RenderLayer,
}

impl GridRenderer {
    pub fn new(mapper: GridMapper) -> Self {
        Self {
            mapper,
            layer: RenderLayer::default(),
        }
    }

    pub fn mapper(&self) -> &GridMapper {
        &self.mapper
    }

    pub fn layer(&self) -> &RenderLayer {
        &self.layer
    }

    /// Entities whose cells fall outside the grid are skipped, as are rides
    /// with an off-grid pickup or dropoff.
    pub fn render(&mut self, snapshot: &Snapshot) -> &RenderLayer {
        let mapper = self.mapper;
        let layer = &mut self.layer;
        layer.clear();

        for driver in &snapshot.drivers {
            if !mapper.contains(driver.location) {
                tracing::debug!(driver = %driver.id, location = %driver.location, "driver off grid, not drawn");
                continue;
            }
            let title = format!("Driver {} ({})", driver.id, driver.status.as_str());
            let handle = layer.emit_entity(
                MarkerKind::Driver(driver.status),
                driver.location,
                &driver.id,
                title,
                &mapper,
            );
            layer.drivers.insert(driver.id.clone(), handle);
        }

        for rider in &snapshot.riders {
            if !mapper.contains(rider.location) {
                tracing::debug!(rider = %rider.id, location = %rider.location, "rider off grid, not drawn");
                continue;
            }
            let title = format!("Rider {}", rider.id);
            let handle =
                layer.emit_entity(MarkerKind::Rider, rider.location, &rider.id, title, &mapper);
            layer.riders.insert(rider.id.clone(), handle);
        }

        for ride in snapshot.active_rides() {
            if !mapper.contains(ride.pickup) || !mapper.contains(ride.dropoff) {
                tracing::debug!(ride = %ride.id, "ride endpoint off grid, not drawn");
                continue;
            }
            layer.emit_entity(
                MarkerKind::Pickup,
                ride.pickup,
                &ride.id,
                format!("Pickup for ride {}", ride.id),
                &mapper,
            );
            layer.emit_entity(
                MarkerKind::Dropoff,
                ride.dropoff,
                &ride.id,
                format!("Dropoff for ride {}", ride.id),
                &mapper,
            );
            for cell in manhattan_path(ride.pickup, ride.dropoff).cells() {
                layer.emit(MarkerKind::Path, cell, &mapper);
            }
        }

        &self.layer
    }
}
