//! In-memory authority for tests: records every call and can fail any of them.

use crate::authority::{Authority, AuthorityError};
use dispatchgrid_protocol::{
    ActiveTrip, Driver, DriverStatus, GridInfo, Location, RideRequest, RideRequestBody,
    RideStatus, Rider, SystemState, TickResponse,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListDrivers,
    ListRiders,
    ListRides,
    SystemState,
    CreateDriver(Location),
    DeleteDriver(String),
    CreateRider(Location),
    DeleteRider(String),
    RequestRide(String, Location, Location),
    CancelRide(String),
    AdvanceTick,
    GridInfo,
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::ListDrivers | Self::ListRiders | Self::ListRides | Self::SystemState | Self::GridInfo
        )
    }
}

#[derive(Default)]
struct World {
    drivers: Vec<Driver>,
    riders: Vec<Rider>,
    rides: Vec<RideRequest>,
    trips: Vec<ActiveTrip>,
    calls: Vec<Call>,
    failures: HashMap<&'static str, AuthorityError>,
    tick_moves: Vec<(String, Location)>,
    next_id: u32,
}

impl World {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:04}", self.next_id)
    }

    fn check(&self, call: &'static str) -> Result<(), AuthorityError> {
        match self.failures.get(call) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct FakeAuthority {
    world: Mutex<World>,
    driver_gate: Mutex<Option<Arc<Notify>>>,
}

fn rejected(call: &'static str, detail: &str) -> AuthorityError {
    AuthorityError::Status {
        call,
        status: 400,
        detail: Some(detail.to_string()),
    }
}

impl FakeAuthority {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut World) -> R) -> R {
        f(&mut self.world.lock().unwrap())
    }

    pub fn add_driver(&self, id: &str, x: i64, y: i64, status: DriverStatus) {
        self.with(|w| {
            w.drivers.push(Driver {
                id: id.to_string(),
                location: Location::new(x, y),
                status,
                assigned_rides: 0,
            })
        });
    }

    pub fn add_rider(&self, id: &str, x: i64, y: i64) {
        self.with(|w| {
            w.riders.push(Rider {
                id: id.to_string(),
                location: Location::new(x, y),
            })
        });
    }

    pub fn add_ride(&self, id: &str, rider_id: &str, status: RideStatus) {
        self.with(|w| {
            w.rides.push(RideRequest {
                id: id.to_string(),
                rider_id: rider_id.to_string(),
                pickup: Location::new(1, 1),
                dropoff: Location::new(4, 5),
                status,
                assigned_driver_id: None,
            })
        });
    }

    pub fn move_on_tick(&self, driver_id: &str, to: Location) {
        self.with(|w| w.tick_moves.push((driver_id.to_string(), to)));
    }

    pub fn fail(&self, call: &'static str, error: AuthorityError) {
        self.with(|w| {
            w.failures.insert(call, error);
        });
    }

    pub fn fail_status(&self, call: &'static str, status: u16, detail: Option<&str>) {
        self.fail(
            call,
            AuthorityError::Status {
                call,
                status,
                detail: detail.map(str::to_string),
            },
        );
    }

    pub fn heal(&self) {
        self.with(|w| w.failures.clear());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|w| w.calls.clone())
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn clear_calls(&self) {
        self.with(|w| w.calls.clear());
    }

    /// The next driver listing captures its answer, then waits for the returned
    /// notify before resolving.
    pub fn hold_next_driver_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.driver_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

impl Authority for FakeAuthority {
    async fn list_drivers(&self) -> Result<Vec<Driver>, AuthorityError> {
        let answer = self.with(|w| {
            w.calls.push(Call::ListDrivers);
            w.check("list drivers").map(|_| w.drivers.clone())
        });
        let gate = self.driver_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        answer
    }

    async fn list_riders(&self) -> Result<Vec<Rider>, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::ListRiders);
            w.check("list riders").map(|_| w.riders.clone())
        })
    }

    async fn list_rides(&self) -> Result<Vec<RideRequest>, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::ListRides);
            w.check("list rides").map(|_| w.rides.clone())
        })
    }

    async fn system_state(&self) -> Result<SystemState, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::SystemState);
            w.check("system state").map(|_| SystemState {
                active_trips: w.trips.clone(),
            })
        })
    }

    async fn create_driver(&self, at: Location) -> Result<Driver, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::CreateDriver(at));
            w.check("create driver")?;
            let driver = Driver {
                id: w.id("driver"),
                location: at,
                status: DriverStatus::Idle,
                assigned_rides: 0,
            };
            w.drivers.push(driver.clone());
            Ok(driver)
        })
    }

    async fn delete_driver(&self, id: &str) -> Result<(), AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::DeleteDriver(id.to_string()));
            w.check("delete driver")?;
            let Some(pos) = w.drivers.iter().position(|d| d.id == id) else {
                return Err(AuthorityError::Status {
                    call: "delete driver",
                    status: 404,
                    detail: Some("Driver not found".to_string()),
                });
            };
            if w.drivers[pos].status == DriverStatus::OnTrip {
                return Err(rejected(
                    "delete driver",
                    "Cannot remove driver who is on a trip",
                ));
            }
            w.drivers.remove(pos);
            Ok(())
        })
    }

    async fn create_rider(&self, at: Location) -> Result<Rider, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::CreateRider(at));
            w.check("create rider")?;
            let rider = Rider {
                id: w.id("rider"),
                location: at,
            };
            w.riders.push(rider.clone());
            Ok(rider)
        })
    }

    async fn delete_rider(&self, id: &str) -> Result<(), AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::DeleteRider(id.to_string()));
            w.check("delete rider")?;
            if w
                .rides
                .iter()
                .any(|r| r.rider_id == id && r.status.is_active())
            {
                return Err(rejected(
                    "delete rider",
                    "Cannot remove rider with active ride request",
                ));
            }
            w.riders.retain(|r| r.id != id);
            Ok(())
        })
    }

    async fn request_ride(&self, body: &RideRequestBody) -> Result<RideRequest, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::RequestRide(
                body.rider_id.clone(),
                body.pickup,
                body.dropoff,
            ));
            w.check("request ride")?;
            let ride = RideRequest {
                id: w.id("ride"),
                rider_id: body.rider_id.clone(),
                pickup: body.pickup,
                dropoff: body.dropoff,
                status: RideStatus::Waiting,
                assigned_driver_id: None,
            };
            w.rides.push(ride.clone());
            Ok(ride)
        })
    }

    async fn cancel_ride(&self, id: &str) -> Result<(), AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::CancelRide(id.to_string()));
            w.check("cancel ride")?;
            let Some(ride) = w.rides.iter_mut().find(|r| r.id == id) else {
                return Err(AuthorityError::Status {
                    call: "cancel ride",
                    status: 404,
                    detail: Some("Ride request not found".to_string()),
                });
            };
            if !ride.status.is_active() {
                let detail = format!("Cannot cancel ride with status: {}", ride.status.as_str());
                return Err(rejected("cancel ride", &detail));
            }
            ride.status = RideStatus::Cancelled;
            ride.assigned_driver_id = None;
            Ok(())
        })
    }

    async fn advance_tick(&self) -> Result<TickResponse, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::AdvanceTick);
            w.check("advance tick")?;
            let moves = std::mem::take(&mut w.tick_moves);
            for (id, to) in moves {
                if let Some(d) = w.drivers.iter_mut().find(|d| d.id == id) {
                    d.location = to;
                }
            }
            Ok(TickResponse {
                message: "Advanced simulation by one tick".to_string(),
                events: Vec::new(),
            })
        })
    }

    async fn grid_info(&self) -> Result<GridInfo, AuthorityError> {
        self.with(|w| {
            w.calls.push(Call::GridInfo);
            w.check("grid info")?;
            Ok(GridInfo {
                width: 100,
                height: 100,
            })
        })
    }
}
