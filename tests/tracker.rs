#![allow(missing_docs)]

mod provider;

use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_tracking::{
    ConnectionState, FeedConfig, HeartbeatConfig, OrderingPolicy, ReconnectPolicy,
    SnapshotSummary, Tracker, TrackerConfig, VehicleId, VehicleStatus,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use self::channel::MemoryChannel;
use self::provider::MockProvider;

fn config(ordering: OrderingPolicy) -> TrackerConfig {
    TrackerConfig {
        feed: FeedConfig {
            heartbeat: HeartbeatConfig::disabled(),
            reconnect: ReconnectPolicy::fixed(Duration::from_secs(5)),
            ..FeedConfig::default()
        },
        diagnostic_capacity: 100,
        ordering,
    }
}

fn timestamp(value: &str) -> DateTime<Utc> {
    value.parse().expect("should parse timestamp")
}

async fn connected(tracker: &Tracker<MockProvider>) {
    let mut state = tracker.feed().watch_state();
    tokio::time::timeout(Duration::from_secs(1), state.wait_for(ConnectionState::is_connected))
        .await
        .expect("should connect")
        .expect("client should be running");
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// Registry, snapshot, live update, disconnect, and reconnect in sequence.
#[tokio::test(start_paused = true)]
async fn startup_to_reconnect() {
    let provider = MockProvider::new(json!([{"id": 1, "number": "TS09UA1234", "route": "R-12"}]))
        .with_location(
            "1",
            json!({
                "latitude": 17.385,
                "longitude": 78.4867,
                "speed": 0,
                "status": "IDLE",
                "timestamp": "2026-03-02T08:00:00Z"
            }),
        );
    let channel = MemoryChannel::new();
    let tracker = Tracker::start(provider, channel.clone(), config(OrderingPolicy::default())).await;
    let vehicle_id = VehicleId::from(1_u64);

    // seeded from the registry, nothing located yet
    let vehicles = tracker.vehicles();
    assert_eq!(vehicles.len(), 1);
    assert_eq!(vehicles[0].display_number, "TS09UA1234");
    assert_eq!(vehicles[0].route_label, "R-12");
    assert!(!vehicles[0].has_data);
    assert_eq!(vehicles[0].status, VehicleStatus::Offline);

    let summary = tracker.snapshot_loaded().await.expect("snapshot should complete");
    assert_eq!(summary, SnapshotSummary { requested: 1, applied: 1, missing: 0, failed: 0 });
    let state = tracker.vehicle(&vehicle_id).expect("vehicle should exist");
    assert!(state.has_data);
    assert_eq!(state.position(), Some((17.385, 78.4867)));
    assert_eq!(state.status, VehicleStatus::Idle);

    connected(&tracker).await;
    settle().await;
    assert_eq!(channel.subscriptions(), vec![vec!["/topic/vehicle/1".to_string()]]);

    channel.push_json(
        "/topic/vehicle/1",
        &json!({
            "vehicleId": 1,
            "latitude": 17.39,
            "longitude": 78.49,
            "speed": 40,
            "status": "MOVING",
            "timestamp": "2026-03-02T08:05:00Z"
        }),
    );
    settle().await;

    let state = tracker.vehicle(&vehicle_id).expect("vehicle should exist");
    assert_eq!(state.latitude, Some(17.39));
    assert_eq!(state.longitude, Some(78.49));
    assert_eq!(state.speed, 40.0);
    assert_eq!(state.status, VehicleStatus::Moving);
    assert_eq!(state.last_update_at, Some(timestamp("2026-03-02T08:05:00Z")));

    channel.drop_session();
    settle().await;
    assert!(!tracker.is_connected());
    assert_eq!(tracker.connection_state(), ConnectionState::Disconnected { will_reconnect: true });
    assert!(
        tracker
            .diagnostics()
            .iter()
            .any(|entry| entry.message == "Disconnected from live feed: connection closed")
    );

    tokio::time::sleep(Duration::from_millis(4890)).await;
    assert_eq!(channel.opens(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(channel.opens(), 2);
    assert!(tracker.is_connected());
    assert_eq!(channel.subscriptions()[1], vec!["/topic/vehicle/1".to_string()]);

    tracker.shutdown().await;
    assert_eq!(tracker.connection_state(), ConnectionState::Stopped);
}

// Should run with an empty fleet when the registry is unavailable.
#[tokio::test]
async fn registry_unavailable() {
    let channel = MemoryChannel::new();
    let tracker =
        Tracker::start(MockProvider::registry_down(), channel.clone(), config(OrderingPolicy::default()))
            .await;

    assert!(tracker.vehicles().is_empty());
    let summary = tracker.snapshot_loaded().await.expect("snapshot should complete");
    assert_eq!(summary, SnapshotSummary::default());

    connected(&tracker).await;
    settle().await;
    assert_eq!(channel.subscriptions(), vec![Vec::<String>::new()]);
    assert!(
        tracker
            .diagnostics()
            .iter()
            .any(|entry| entry.message.starts_with("Vehicle registry unavailable"))
    );

    tracker.shutdown().await;
}

// Should isolate snapshot failures to the vehicle concerned.
#[tokio::test]
async fn snapshot_failures_isolated() {
    let provider = MockProvider::new(json!([
        {"id": 1, "number": "KA01"},
        {"id": 2, "number": "KA02"},
        {"id": 3, "number": "KA03"}
    ]))
    .with_location("1", json!({"lat": 17.4, "lng": 78.5}))
    .with_failing_location("2");

    let tracker =
        Tracker::start(provider, MemoryChannel::new(), config(OrderingPolicy::default())).await;

    let summary = tracker.snapshot_loaded().await.expect("snapshot should complete");
    assert_eq!(summary, SnapshotSummary { requested: 3, applied: 1, missing: 1, failed: 1 });

    let located: Vec<VehicleId> = tracker.located().into_iter().map(|v| v.vehicle_id).collect();
    assert_eq!(located, vec![VehicleId::from(1_u64)]);
    for id in [2_u64, 3] {
        let state = tracker.vehicle(&VehicleId::from(id)).expect("vehicle should exist");
        assert!(!state.has_data);
        assert_eq!(state.status, VehicleStatus::Offline);
    }

    tracker.shutdown().await;
}

// A lookup that never answers must not hold back the other vehicles.
#[tokio::test(start_paused = true)]
async fn snapshot_lookup_hangs() {
    let provider = MockProvider::new(json!([{"id": 1, "number": "KA01"}, {"id": 2, "number": "KA02"}]))
        .with_location("1", json!({"lat": 17.4, "lng": 78.5}))
        .with_hanging_location("2");

    let tracker =
        Tracker::start(provider, MemoryChannel::new(), config(OrderingPolicy::default())).await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    let located = tracker.vehicle(&VehicleId::from(1_u64)).expect("vehicle should exist");
    assert!(located.has_data);
    assert_eq!(located.position(), Some((17.4, 78.5)));
    let pending = tracker.vehicle(&VehicleId::from(2_u64)).expect("vehicle should exist");
    assert!(!pending.has_data);

    tracker.shutdown().await;
    assert_eq!(tracker.snapshot_loaded().await, None);
}

// Should show an injection at once and treat its echo as a no-op.
#[tokio::test]
async fn injection_echo() {
    let provider = MockProvider::new(json!([{"id": 1, "number": "KA01"}]))
        .with_location("1", json!({"latitude": 17.0, "longitude": 78.0, "speed": 5}));
    let channel = MemoryChannel::new();
    let tracker =
        Tracker::start(provider.clone(), channel.clone(), config(OrderingPolicy::default())).await;
    tracker.snapshot_loaded().await;
    connected(&tracker).await;

    let vehicle_id = VehicleId::from(1_u64);
    let sample = tracker.inject_delta(&vehicle_id, 0.25, -0.25, 30.0).expect("should inject");
    let injected = tracker.vehicle(&vehicle_id).expect("vehicle should exist");
    assert_eq!(injected.position(), Some((17.25, 77.75)));
    assert!(tracker.diagnostics()[0].message.starts_with("Injected update for vehicle 1"));

    let mut echo = serde_json::to_value(&sample).expect("should serialize");
    echo["vehicleId"] = json!(1);
    channel.push_json("/topic/vehicle/1", &echo);
    settle().await;
    assert_eq!(tracker.vehicle(&vehicle_id), Some(injected));

    tracker.shutdown().await;
    let submissions = provider.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0]["latitude"], json!(17.25));
}

// Should drop a live sample older than the snapshot under RejectOlder only.
#[tokio::test]
async fn ordering_policies() {
    let older = json!({
        "vehicleId": 1,
        "latitude": 10.0,
        "longitude": 10.0,
        "timestamp": "2026-03-02T07:00:00Z"
    });

    for (ordering, expect_applied) in
        [(OrderingPolicy::ArrivalOrder, true), (OrderingPolicy::RejectOlder, false)]
    {
        let provider = MockProvider::new(json!([{"id": 1, "number": "KA01"}])).with_location(
            "1",
            json!({"latitude": 17.0, "longitude": 78.0, "timestamp": "2026-03-02T08:00:00Z"}),
        );
        let channel = MemoryChannel::new();
        let tracker = Tracker::start(provider, channel.clone(), config(ordering)).await;
        tracker.snapshot_loaded().await;
        connected(&tracker).await;

        channel.push_json("/topic/vehicle/1", &older);
        settle().await;

        let state = tracker.vehicle(&VehicleId::from(1_u64)).expect("vehicle should exist");
        if expect_applied {
            assert_eq!(state.position(), Some((10.0, 10.0)));
        } else {
            assert_eq!(state.position(), Some((17.0, 78.0)));
            assert!(
                tracker.diagnostics().iter().any(|entry| entry.message.contains("stale sample"))
            );
        }

        tracker.shutdown().await;
    }
}
