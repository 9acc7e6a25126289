use dispatchgrid_protocol::{ActiveTrip, Driver, RideRequest, Rider};
use std::sync::{Arc, PoisonError, RwLock};

/// One sync cycle's worth of authority state. Never edited after assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Ticket of the refresh that produced this snapshot; 0 for the empty seed.
    pub seq: u64,
    pub drivers: Vec<Driver>,
    pub riders: Vec<Rider>,
    pub rides: Vec<RideRequest>,
    pub active_trips: Vec<ActiveTrip>,
}

impl Snapshot {
    pub fn driver(&self, id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    pub fn rider(&self, id: &str) -> Option<&Rider> {
        self.riders.iter().find(|r| r.id == id)
    }

    pub fn ride(&self, id: &str) -> Option<&RideRequest> {
        self.rides.iter().find(|r| r.id == id)
    }

    /// Rides still drawn on the grid (waiting or assigned).
    pub fn active_rides(&self) -> impl Iterator<Item = &RideRequest> {
        self.rides.iter().filter(|r| r.status.is_active())
    }

    pub fn rider_has_active_ride(&self, rider_id: &str) -> bool {
        self.active_rides().any(|r| r.rider_id == rider_id)
    }
}

/// Holds the current snapshot. Readers get a whole `Arc<Snapshot>`; commits swap
/// the pointer, so a reader never sees two sync cycles mixed together.
#[derive(Debug, Default)]
pub struct StateStore {
    current: RwLock<Arc<Snapshot>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the held snapshot and hands back the one it displaced.
    pub fn commit(&self, next: Snapshot) -> Arc<Snapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(next))
    }

    /// Like [`commit`](Self::commit), but refuses a snapshot whose ticket is older
    /// than the held one. Returns `None` when the snapshot was discarded.
    /// Takes the `Arc` so the caller keeps the exact value it committed.
    pub fn commit_if_newer(&self, next: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if next.seq < guard.seq {
            return None;
        }
        Some(std::mem::replace(&mut *guard, next))
    }
}
