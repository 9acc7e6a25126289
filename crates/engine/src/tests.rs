use crate::fake::{Call, FakeAuthority};
use crate::*;
use dispatchgrid_protocol::{DriverStatus, Location, RideStatus};
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct Harness {
    fake: Arc<FakeAuthority>,
    store: Arc<StateStore>,
    notifier: Notifier,
    animations: Arc<Mutex<AnimationScheduler>>,
    gateway: CommandGateway<FakeAuthority>,
}

impl Harness {
    fn new() -> Self {
        let config = EngineConfig::default();
        let fake = FakeAuthority::new();
        let store = Arc::new(StateStore::new());
        let notifier = Notifier::new(&config);
        let sync = Arc::new(SyncEngine::new(fake.clone(), store.clone(), notifier.clone()));
        let animations = Arc::new(Mutex::new(AnimationScheduler::new()));
        let gateway = CommandGateway::new(sync, notifier.clone(), animations.clone(), config);
        Self {
            fake,
            store,
            notifier,
            animations,
            gateway,
        }
    }

    fn sync(&self) -> &Arc<SyncEngine<FakeAuthority>> {
        self.gateway.sync()
    }

    fn notice(&self) -> (String, Severity) {
        self.notifier.current(Instant::now()).expect("a visible notification")
    }
}

fn draft(rider: Option<&str>, pickup: (i64, i64), dropoff: (i64, i64)) -> RideDraft {
    RideDraft {
        rider_id: rider.map(str::to_string),
        pickup: Some(Location::new(pickup.0, pickup.1)),
        dropoff: Some(Location::new(dropoff.0, dropoff.1)),
    }
}

#[tokio::test]
async fn refresh_commits_every_collection_together() {
    let h = Harness::new();
    h.fake.add_driver("driver_1", 3, 4, DriverStatus::Idle);
    h.fake.add_rider("rider_1", 5, 6);
    h.fake.add_ride("ride_1", "rider_1", RideStatus::Waiting);

    let snapshot = h.sync().refresh().await.unwrap();
    assert_eq!(snapshot.seq, 1);
    assert_eq!(snapshot.drivers.len(), 1);
    assert_eq!(snapshot.riders.len(), 1);
    assert_eq!(snapshot.rides.len(), 1);
    assert_eq!(*h.store.snapshot(), *snapshot);
    assert_eq!(
        h.fake.calls(),
        vec![Call::ListDrivers, Call::ListRiders, Call::ListRides, Call::SystemState]
    );
}

#[tokio::test]
async fn failed_sub_fetch_leaves_snapshot_untouched() {
    let h = Harness::new();
    h.fake.add_driver("driver_1", 3, 4, DriverStatus::Idle);
    h.sync().refresh().await.unwrap();
    let before = h.store.snapshot();

    h.fake.add_driver("driver_2", 8, 8, DriverStatus::Idle);
    h.fake.add_rider("rider_1", 5, 6);
    h.fake.fail_status("list rides", 500, None);

    let err = h.sync().refresh().await.unwrap_err();
    assert_eq!(err.call(), "list rides");
    assert!(Arc::ptr_eq(&before, &h.store.snapshot()));
    assert_eq!(h.store.snapshot().drivers.len(), 1);
    assert_eq!(
        h.notice(),
        ("Failed to refresh system state".to_string(), Severity::Error)
    );

    h.fake.heal();
    let after = h.sync().refresh().await.unwrap();
    assert_eq!(after.drivers.len(), 2);
    assert_eq!(after.riders.len(), 1);
}

#[tokio::test]
async fn late_refresh_cannot_overwrite_a_newer_one() {
    let h = Harness::new();
    let gate = h.fake.hold_next_driver_list();

    let slow = h.sync().refresh_tracked();
    let fast = async {
        h.fake.add_driver("driver_new", 1, 1, DriverStatus::Idle);
        let outcome = h.sync().refresh_tracked().await;
        gate.notify_one();
        outcome
    };
    let (slow, fast) = tokio::join!(slow, fast);

    let fast = fast.unwrap();
    assert!(fast.committed);
    assert_eq!(fast.current.seq, 2);

    let slow = slow.unwrap();
    assert!(!slow.committed);
    assert_eq!(slow.current.seq, 2);
    assert_eq!(h.store.snapshot().drivers[0].id, "driver_new");
}

#[tokio::test]
async fn committed_outcome_reports_its_own_snapshot() {
    let h = Harness::new();
    h.fake.add_driver("driver_1", 3, 4, DriverStatus::Idle);
    let first = h.sync().refresh_tracked().await.unwrap();
    assert!(first.committed);
    assert_eq!(first.current.seq, 1);
    assert!(Arc::ptr_eq(&first.current, &h.store.snapshot()));

    h.fake.add_driver("driver_2", 5, 5, DriverStatus::Idle);
    let second = h.sync().refresh_tracked().await.unwrap();
    assert!(Arc::ptr_eq(&second.previous, &first.current));
    assert_eq!(first.current.seq, 1);
    assert_eq!(first.current.drivers.len(), 1);
    assert_eq!(second.current.seq, 2);
}

#[tokio::test]
async fn identical_pickup_and_dropoff_never_reaches_the_authority() {
    let h = Harness::new();
    h.fake.add_rider("rider_1", 4, 4);

    let err = h
        .gateway
        .request_ride(&draft(Some("rider_1"), (4, 4), (4, 4)))
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::Invalid(ValidationError::SamePickupDropoff));
    assert!(h.fake.calls().is_empty());
    assert_eq!(
        h.notice(),
        (
            "Pickup and dropoff locations cannot be the same".to_string(),
            Severity::Error
        )
    );
}

#[tokio::test]
async fn ride_preconditions_are_checked_locally() {
    let h = Harness::new();

    let err = h
        .gateway
        .request_ride(&draft(Some("rider_1"), (4, 4), (100, 2)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Invalid(ValidationError::OutOfBounds { what: "Dropoff", .. })
    ));

    let err = h
        .gateway
        .request_ride(&draft(None, (4, 4), (5, 5)))
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::Invalid(ValidationError::MissingRider));

    let err = h
        .gateway
        .request_ride(&RideDraft {
            rider_id: Some("rider_1".to_string()),
            pickup: None,
            dropoff: Some(Location::new(1, 1)),
        })
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::Invalid(ValidationError::MissingPickup));

    let err = h
        .gateway
        .create_driver(Location::new(-1, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Invalid(_)));
    assert!(h.fake.calls().is_empty());
}

#[tokio::test]
async fn successful_request_refreshes_and_notifies() {
    let h = Harness::new();
    h.fake.add_rider("rider_1", 2, 3);

    let ride = h
        .gateway
        .request_ride(&draft(Some("rider_1"), (2, 3), (9, 9)))
        .await
        .unwrap();
    assert_eq!(ride.status, RideStatus::Waiting);
    assert_eq!(
        h.fake.mutating_calls(),
        vec![Call::RequestRide(
            "rider_1".to_string(),
            Location::new(2, 3),
            Location::new(9, 9)
        )]
    );
    assert!(h.fake.calls().contains(&Call::ListRides));
    assert_eq!(h.store.snapshot().ride(&ride.id).unwrap().rider_id, "rider_1");
    assert_eq!(
        h.notice(),
        (
            "Ride requested successfully! Driver dispatch in progress...".to_string(),
            Severity::Success
        )
    );
}

#[tokio::test]
async fn authority_detail_is_surfaced_and_state_is_not_refreshed() {
    let h = Harness::new();
    h.fake.add_driver("driver_busy", 1, 1, DriverStatus::OnTrip);
    h.sync().refresh().await.unwrap();
    let before = h.store.snapshot();
    h.fake.clear_calls();

    let err = h.gateway.remove_driver("driver_busy").await.unwrap_err();
    assert_eq!(
        err,
        CommandError::Authority(AuthorityError::Status {
            call: "delete driver",
            status: 400,
            detail: Some("Cannot remove driver who is on a trip".to_string()),
        })
    );
    assert_eq!(h.fake.calls(), vec![Call::DeleteDriver("driver_busy".to_string())]);
    assert!(Arc::ptr_eq(&before, &h.store.snapshot()));
    assert_eq!(
        h.notice(),
        (
            "Cannot remove driver who is on a trip".to_string(),
            Severity::Error
        )
    );
}

#[tokio::test]
async fn failures_without_detail_use_the_generic_message() {
    let h = Harness::new();
    h.fake.fail_status("create driver", 500, None);
    h.gateway
        .create_driver(Location::new(10, 20))
        .await
        .unwrap_err();
    assert_eq!(h.notice().0, "Failed to add driver. Please try again.");

    h.fake.fail(
        "advance tick",
        AuthorityError::Transport {
            call: "advance tick",
            message: "connection refused".to_string(),
        },
    );
    h.gateway.advance_tick().await.unwrap_err();
    assert_eq!(h.notice().0, "Failed to advance simulation");
    assert!(!h.fake.calls().contains(&Call::ListDrivers));
}

#[tokio::test]
async fn cancel_waits_for_operator_confirmation() {
    let h = Harness::new();
    h.fake.add_rider("rider_1", 1, 1);
    h.fake.add_ride("ride_1", "rider_1", RideStatus::Waiting);

    let mut prompt = String::new();
    let sent = h
        .gateway
        .cancel_ride("ride_1", |question| {
            prompt = question.to_string();
            false
        })
        .await
        .unwrap();
    assert!(!sent);
    assert_eq!(prompt, "Are you sure you want to cancel ride ride_1?");
    assert!(h.fake.calls().is_empty());

    let sent = h.gateway.cancel_ride("ride_1", |_| true).await.unwrap();
    assert!(sent);
    assert_eq!(h.fake.mutating_calls(), vec![Call::CancelRide("ride_1".to_string())]);
    assert_eq!(
        h.store.snapshot().ride("ride_1").unwrap().status,
        RideStatus::Cancelled
    );
    assert_eq!(
        h.notice(),
        (
            "Ride ride_1 cancelled successfully".to_string(),
            Severity::Warning
        )
    );
}

#[tokio::test]
async fn cancelling_a_finished_ride_reports_the_conflict() {
    let h = Harness::new();
    h.fake.add_ride("ride_done", "rider_1", RideStatus::Completed);
    h.gateway.cancel_ride("ride_done", |_| true).await.unwrap_err();
    assert_eq!(h.notice().0, "Cannot cancel ride with status: completed");
}

#[tokio::test]
async fn tick_tweens_drivers_that_moved() {
    let h = Harness::new();
    h.fake.add_driver("driver_a", 0, 0, DriverStatus::Assigned);
    h.fake.add_driver("driver_b", 5, 5, DriverStatus::Idle);
    h.sync().refresh().await.unwrap();

    h.fake.move_on_tick("driver_a", Location::new(1, 0));
    let tick = h.gateway.advance_tick().await.unwrap();
    assert_eq!(tick.message, "Advanced simulation by one tick");
    assert_eq!(
        h.store.snapshot().driver("driver_a").unwrap().location,
        Location::new(1, 0)
    );
    assert_eq!(h.animations.lock().unwrap().len(), 1);
    assert_eq!(
        h.notice(),
        ("Advanced simulation by one tick".to_string(), Severity::Success)
    );

    let mut renderer = GridRenderer::new(*h.gateway.mapper());
    let layer = renderer.render(&h.store.snapshot()).clone();
    let frame = h
        .animations
        .lock()
        .unwrap()
        .frame(&layer, Instant::now() + std::time::Duration::from_secs(2));
    assert_eq!(frame.len(), 1);
    assert_eq!(frame[0].node, layer.driver_node("driver_a").unwrap());
    assert_eq!((frame[0].x, frame[0].y), (6.0, 0.0));
}

#[tokio::test]
async fn placement_click_issues_exactly_one_create() {
    let h = Harness::new();
    let mut ctl = InteractionController::new(*h.gateway.mapper(), h.notifier.clone());

    ctl.select_mode(InteractionMode::Driver);
    let placement = ctl.placement_at(60.0, 120.0).unwrap();
    let placed = dispatch(&h.gateway, placement).await.unwrap();
    assert!(matches!(placed, Placed::Driver(ref d) if d.location == Location::new(10, 20)));
    assert_eq!(
        h.fake.mutating_calls(),
        vec![Call::CreateDriver(Location::new(10, 20))]
    );
    assert!(h.notice().0.ends_with("added at (10, 20)"));

    h.fake.clear_calls();
    ctl.select_mode(InteractionMode::None);
    assert!(ctl.placement_at(60.0, 120.0).is_none());
    assert!(h.fake.mutating_calls().is_empty());
}

#[tokio::test]
async fn rider_placement_creates_riders() {
    let h = Harness::new();
    let mut ctl = InteractionController::new(*h.gateway.mapper(), h.notifier.clone());
    ctl.select_mode(InteractionMode::Rider);
    let placement = ctl.placement_at(13.0, 1.0).unwrap();
    dispatch(&h.gateway, placement).await.unwrap();
    assert_eq!(
        h.fake.mutating_calls(),
        vec![Call::CreateRider(Location::new(2, 0))]
    );
    assert_eq!(h.store.snapshot().riders.len(), 1);
}
