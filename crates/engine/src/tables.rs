//! Operator-facing tables and the ride request form, derived from a snapshot.

use crate::gateway::RideDraft;
use crate::store::Snapshot;
use dispatchgrid_protocol::{DriverStatus, Location, RideStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverRow {
    pub id: String,
    pub location: Location,
    pub status: DriverStatus,
    pub assigned_rides: u32,
    pub removable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiderRow {
    pub id: String,
    pub location: Location,
    pub has_active_request: bool,
}

impl RiderRow {
    pub fn removable(&self) -> bool {
        !self.has_active_request
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideRow {
    pub id: String,
    pub rider_id: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub status: RideStatus,
    pub driver: Option<String>,
    pub cancellable: bool,
}

pub fn driver_rows(snapshot: &Snapshot) -> Vec<DriverRow> {
    snapshot
        .drivers
        .iter()
        .map(|d| DriverRow {
            id: d.id.clone(),
            location: d.location,
            status: d.status,
            assigned_rides: d.assigned_rides,
            removable: d.status != DriverStatus::OnTrip,
        })
        .collect()
}

pub fn rider_rows(snapshot: &Snapshot) -> Vec<RiderRow> {
    snapshot
        .riders
        .iter()
        .map(|r| RiderRow {
            id: r.id.clone(),
            location: r.location,
            has_active_request: snapshot.rider_has_active_ride(&r.id),
        })
        .collect()
}

pub fn ride_rows(snapshot: &Snapshot) -> Vec<RideRow> {
    snapshot
        .rides
        .iter()
        .map(|r| RideRow {
            id: r.id.clone(),
            rider_id: r.rider_id.clone(),
            pickup: r.pickup,
            dropoff: r.dropoff,
            status: r.status,
            driver: r.assigned_driver_id.clone(),
            cancellable: r.status.is_active(),
        })
        .collect()
}

/// Ride request form state. The pickup follows the selected rider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RideForm {
    rider_id: Option<String>,
    pickup: Option<Location>,
    dropoff: Option<Location>,
}

impl RideForm {
    pub fn rider_id(&self) -> Option<&str> {
        self.rider_id.as_deref()
    }

    pub fn pickup(&self) -> Option<Location> {
        self.pickup
    }

    pub fn dropoff(&self) -> Option<Location> {
        self.dropoff
    }

    pub fn set_dropoff(&mut self, dropoff: Option<Location>) {
        self.dropoff = dropoff;
    }

    /// Selects `rider_id` (or clears the selection) and fills the pickup from
    /// the rider's position.
    pub fn select_rider(&mut self, rider_id: Option<&str>, snapshot: &Snapshot) {
        match rider_id.and_then(|id| snapshot.rider(id)) {
            Some(rider) => {
                self.rider_id = Some(rider.id.clone());
                self.pickup = Some(rider.location);
            }
            None => {
                self.rider_id = None;
                self.pickup = None;
            }
        }
    }

    /// Keeps the selection across a sync when the rider still exists, otherwise
    /// falls back to the only rider, if there is exactly one.
    pub fn reconcile(&mut self, snapshot: &Snapshot) {
        let keep = self
            .rider_id
            .as_deref()
            .filter(|id| snapshot.rider(id).is_some())
            .map(str::to_string);
        match (keep, snapshot.riders.as_slice()) {
            (Some(id), _) => self.select_rider(Some(&id), snapshot),
            (None, [only]) => {
                let id = only.id.clone();
                self.select_rider(Some(&id), snapshot);
            }
            (None, _) => self.select_rider(None, snapshot),
        }
    }

    pub fn draft(&self) -> RideDraft {
        RideDraft {
            rider_id: self.rider_id.clone(),
            pickup: self.pickup,
            dropoff: self.dropoff,
        }
    }
}
