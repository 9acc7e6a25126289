use crate::authority::{Authority, AuthorityError};
use crate::notify::{Notifier, Severity};
use crate::store::{Snapshot, StateStore};
use dispatchgrid_protocol::{Driver, RideRequest, Rider, SystemState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const REFRESH_FAILED: &str = "Failed to refresh system state";

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Snapshot held before this refresh committed.
    pub previous: Arc<Snapshot>,
    /// Snapshot held after this refresh; a newer one when `committed` is false.
    pub current: Arc<Snapshot>,
    /// False when a later-issued refresh had already committed.
    pub committed: bool,
}

pub struct SyncEngine<A> {
    authority: Arc<A>,
    store: Arc<StateStore>,
    notifier: Notifier,
    issued: AtomicU64,
}

impl<A: Authority> SyncEngine<A> {
    pub fn new(authority: Arc<A>, store: Arc<StateStore>, notifier: Notifier) -> Self {
        Self {
            authority,
            store,
            notifier,
            issued: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn authority(&self) -> &Arc<A> {
        &self.authority
    }

    pub async fn refresh(&self) -> Result<Arc<Snapshot>, AuthorityError> {
        self.refresh_tracked().await.map(|outcome| outcome.current)
    }

    /// Fetches all four collections together and commits them as one snapshot.
    /// Any failed fetch aborts the whole refresh and leaves the store untouched.
    pub async fn refresh_tracked(&self) -> Result<SyncOutcome, AuthorityError> {
        let seq = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        let (drivers, riders, rides, state) = tokio::join!(
            self.authority.list_drivers(),
            self.authority.list_riders(),
            self.authority.list_rides(),
            self.authority.system_state(),
        );

        let next = match assemble(seq, drivers, riders, rides, state) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(seq, error = %e, "refresh aborted");
                self.notifier.push(REFRESH_FAILED, Severity::Error);
                return Err(e);
            }
        };

        let current = Arc::new(next);
        match self.store.commit_if_newer(current.clone()) {
            Some(previous) => {
                tracing::debug!(
                    seq,
                    drivers = current.drivers.len(),
                    riders = current.riders.len(),
                    rides = current.rides.len(),
                    "snapshot committed"
                );
                Ok(SyncOutcome {
                    previous,
                    current,
                    committed: true,
                })
            }
            None => {
                let current = self.store.snapshot();
                tracing::debug!(seq, held = current.seq, "discarding stale snapshot");
                Ok(SyncOutcome {
                    previous: current.clone(),
                    current,
                    committed: false,
                })
            }
        }
    }
}

fn assemble(
    seq: u64,
    drivers: Result<Vec<Driver>, AuthorityError>,
    riders: Result<Vec<Rider>, AuthorityError>,
    rides: Result<Vec<RideRequest>, AuthorityError>,
    state: Result<SystemState, AuthorityError>,
) -> Result<Snapshot, AuthorityError> {
    Ok(Snapshot {
        seq,
        drivers: drivers?,
        riders: riders?,
        rides: rides?,
        active_trips: state?.active_trips,
    })
}

/// Periodic polling. Each interval issues a refresh without waiting for the
/// previous one; failures are already reported by the refresh itself.
pub fn spawn_poller<A: Authority>(sync: Arc<SyncEngine<A>>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let sync = sync.clone();
            tokio::spawn(async move {
                let _ = sync.refresh().await;
            });
        }
    })
}
