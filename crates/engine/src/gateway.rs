use crate::animate::AnimationScheduler;
use crate::authority::{Authority, AuthorityError};
use crate::config::EngineConfig;
use crate::grid::GridMapper;
use crate::notify::{Notifier, Severity};
use crate::sync::SyncEngine;
use dispatchgrid_protocol::{Driver, Location, RideRequest, RideRequestBody, Rider, TickResponse};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please select a rider first")]
    MissingRider,
    #[error("Pickup location not set. Please select a rider first.")]
    MissingPickup,
    #[error("Please enter a valid dropoff location")]
    MissingDropoff,
    #[error("{what} {at} is outside the grid (0-{max})")]
    OutOfBounds {
        what: &'static str,
        at: Location,
        max: i64,
    },
    #[error("Pickup and dropoff locations cannot be the same")]
    SamePickupDropoff,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Operator input for a ride request, as typed or picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RideDraft {
    pub rider_id: Option<String>,
    pub pickup: Option<Location>,
    pub dropoff: Option<Location>,
}

/// One method per mutating authority call. Every method validates locally,
/// dispatches, and on success refreshes the mirror; every failure surfaces
/// as exactly one notification and leaves the mirror alone.
pub struct CommandGateway<A> {
    sync: Arc<SyncEngine<A>>,
    notifier: Notifier,
    animations: Arc<Mutex<AnimationScheduler>>,
    mapper: GridMapper,
    config: EngineConfig,
}

impl<A: Authority> CommandGateway<A> {
    pub fn new(
        sync: Arc<SyncEngine<A>>,
        notifier: Notifier,
        animations: Arc<Mutex<AnimationScheduler>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sync,
            notifier,
            animations,
            mapper: GridMapper::from_config(&config),
            config,
        }
    }

    pub fn sync(&self) -> &Arc<SyncEngine<A>> {
        &self.sync
    }

    pub fn mapper(&self) -> &GridMapper {
        &self.mapper
    }

    pub async fn create_driver(&self, at: Location) -> Result<Driver, CommandError> {
        self.check_cell("Driver location", at)?;
        let outcome = self.sync.authority().create_driver(at).await;
        let driver = self.settle(outcome, "Failed to add driver. Please try again.")?;
        self.succeed(format!("Driver {} added at {at}", driver.id), Severity::Success)
            .await;
        Ok(driver)
    }

    pub async fn create_rider(&self, at: Location) -> Result<Rider, CommandError> {
        self.check_cell("Rider location", at)?;
        let outcome = self.sync.authority().create_rider(at).await;
        let rider = self.settle(outcome, "Failed to add rider. Please try again.")?;
        self.succeed(format!("Rider {} added at {at}", rider.id), Severity::Success)
            .await;
        Ok(rider)
    }

    pub async fn remove_driver(&self, id: &str) -> Result<(), CommandError> {
        let outcome = self.sync.authority().delete_driver(id).await;
        self.settle(outcome, "Failed to remove driver")?;
        self.succeed(format!("Driver {id} removed"), Severity::Success)
            .await;
        Ok(())
    }

    pub async fn remove_rider(&self, id: &str) -> Result<(), CommandError> {
        let outcome = self.sync.authority().delete_rider(id).await;
        self.settle(outcome, "Failed to remove rider")?;
        self.succeed(format!("Rider {id} removed"), Severity::Success)
            .await;
        Ok(())
    }

    pub async fn request_ride(&self, draft: &RideDraft) -> Result<RideRequest, CommandError> {
        let body = self.validate_ride(draft).map_err(|e| self.reject(e))?;
        let outcome = self.sync.authority().request_ride(&body).await;
        let ride = self.settle(outcome, "Failed to request ride")?;
        self.succeed(
            "Ride requested successfully! Driver dispatch in progress...",
            Severity::Success,
        )
        .await;
        Ok(ride)
    }

    /// Asks `confirm` before dispatching; a declined prompt sends nothing and
    /// yields `Ok(false)`.
    pub async fn cancel_ride(
        &self,
        id: &str,
        confirm: impl FnOnce(&str) -> bool,
    ) -> Result<bool, CommandError> {
        if !confirm(&format!("Are you sure you want to cancel ride {id}?")) {
            tracing::debug!(ride = id, "cancel declined by operator");
            return Ok(false);
        }
        let outcome = self.sync.authority().cancel_ride(id).await;
        self.settle(outcome, "Failed to cancel ride")?;
        self.succeed(format!("Ride {id} cancelled successfully"), Severity::Warning)
            .await;
        Ok(true)
    }

    /// Advances the simulation and tweens every driver that moved.
    pub async fn advance_tick(&self) -> Result<TickResponse, CommandError> {
        let outcome = self.sync.authority().advance_tick().await;
        let tick = self.settle(outcome, "Failed to advance simulation")?;
        self.notifier.push(tick.message.clone(), Severity::Success);
        if let Ok(sync) = self.sync.refresh_tracked().await {
            if sync.committed {
                let mut animations = self
                    .animations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let moved = animations.track_moves(
                    &sync.previous,
                    &sync.current,
                    &self.mapper,
                    self.config.animation_duration,
                    Instant::now(),
                );
                tracing::debug!(moved, "tick applied");
            }
        }
        Ok(tick)
    }

    fn check_cell(&self, what: &'static str, at: Location) -> Result<(), CommandError> {
        if self.mapper.contains(at) {
            return Ok(());
        }
        Err(self.reject(ValidationError::OutOfBounds {
            what,
            at,
            max: self.mapper.grid_size() - 1,
        }))
    }

    fn validate_ride(&self, draft: &RideDraft) -> Result<RideRequestBody, ValidationError> {
        let rider_id = draft
            .rider_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(ValidationError::MissingRider)?;
        let pickup = draft.pickup.ok_or(ValidationError::MissingPickup)?;
        let dropoff = draft.dropoff.ok_or(ValidationError::MissingDropoff)?;
        let max = self.mapper.grid_size() - 1;
        if !self.mapper.contains(pickup) {
            return Err(ValidationError::OutOfBounds {
                what: "Pickup",
                at: pickup,
                max,
            });
        }
        if !self.mapper.contains(dropoff) {
            return Err(ValidationError::OutOfBounds {
                what: "Dropoff",
                at: dropoff,
                max,
            });
        }
        if pickup == dropoff {
            return Err(ValidationError::SamePickupDropoff);
        }
        Ok(RideRequestBody {
            rider_id: rider_id.to_string(),
            pickup,
            dropoff,
        })
    }

    fn reject(&self, error: ValidationError) -> CommandError {
        self.notifier.push(error.to_string(), Severity::Error);
        CommandError::Invalid(error)
    }

    fn settle<T>(
        &self,
        outcome: Result<T, AuthorityError>,
        fallback: &str,
    ) -> Result<T, CommandError> {
        outcome.map_err(|e| {
            tracing::warn!(call = e.call(), error = %e, "command failed");
            let message = e.detail().unwrap_or(fallback).to_string();
            self.notifier.push(message, Severity::Error);
            CommandError::Authority(e)
        })
    }

    async fn succeed(&self, message: impl Into<String>, severity: Severity) {
        self.notifier.push(message, severity);
        // A failed refresh reports itself; the command already went through.
        let _ = self.sync.refresh().await;
    }
}
