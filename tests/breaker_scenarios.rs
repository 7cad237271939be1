//! End-to-end breaker behaviour through the public manager API.

use std::time::Duration;

use connection_breaker::resilience::LAST_FAILURE_REASON;
use connection_breaker::{
    BreakerError, CircuitState, ConfigureOptions, ConnectionKey, ConnectionManager, ConnectionOptions,
    EventData, EventFilter, EventType, GlobalConfig, SweepReport,
};

mod common;

#[tokio::test]
async fn test_registration_starts_closed() {
    let manager = common::manual_sweep_manager();

    let record = manager
        .register(("orders-db", "eu"), ConnectionOptions::new().metadata("owner", "team-a"))
        .await
        .unwrap();

    assert_eq!(record.state, CircuitState::Closed);
    assert_eq!(record.failure_count, 0);
    assert_eq!(record.scope.as_deref(), Some("eu"));
    assert_eq!(record.metadata["owner"], "team-a");
    assert_eq!(manager.status(("orders-db", "eu")).await.unwrap(), record);
}

#[tokio::test]
async fn test_opens_on_nth_consecutive_failure() {
    let manager = common::manual_sweep_manager();
    manager.register("api", ConnectionOptions::new().max_attempts(4)).await.unwrap();

    for attempt in 1..4 {
        manager.failure("api", None).await.unwrap();
        let status = manager.status("api").await.unwrap();
        assert_eq!(status.state, CircuitState::Closed, "opened early on attempt {}", attempt);
        assert!(manager.is_available("api").await);
    }

    manager.failure("api", Some("503 from upstream".into())).await.unwrap();
    let status = manager.status("api").await.unwrap();
    assert_eq!(status.state, CircuitState::Open);
    assert_eq!(status.failure_count, 4);
    assert!(status.opened_at.is_some());
    assert_eq!(status.metadata[LAST_FAILURE_REASON], "503 from upstream");
    assert!(!manager.is_available("api").await);
}

#[tokio::test]
async fn test_success_resets_count_without_state_change() {
    let manager = common::manual_sweep_manager();
    manager.register("api", ConnectionOptions::new().max_attempts(3)).await.unwrap();

    manager.failure("api", None).await.unwrap();
    manager.failure("api", None).await.unwrap();
    manager.success("api").await.unwrap();
    manager.failure("api", None).await.unwrap();
    manager.failure("api", None).await.unwrap();

    let status = manager.status("api").await.unwrap();
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.failure_count, 2);
    assert!(status.last_success_time.is_some());
    assert!(status.last_failure_time.is_some());
}

#[tokio::test]
async fn test_unlimited_attempts_never_open() {
    let manager = common::manual_sweep_manager();
    manager
        .register("best-effort", ConnectionOptions::new().unlimited_attempts())
        .await
        .unwrap();

    for _ in 0..20 {
        manager.failure("best-effort", None).await.unwrap();
    }

    let status = manager.status("best-effort").await.unwrap();
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.max_attempts, None);
}

#[tokio::test(start_paused = true)]
async fn test_open_then_expire_to_half_open() {
    let manager = common::manual_sweep_manager();
    manager.register("cache", ConnectionOptions::new()).await.unwrap();

    manager.open_circuit("cache", Some("maintenance".into()), Some(2_000)).await.unwrap();
    assert!(!manager.is_available("cache").await);

    tokio::time::advance(Duration::from_millis(1_999)).await;
    assert_eq!(manager.sweep().await.unwrap(), SweepReport::default());
    assert_eq!(manager.status("cache").await.unwrap().state, CircuitState::Open);

    tokio::time::advance(Duration::from_millis(1)).await;
    let report = manager.sweep().await.unwrap();
    assert_eq!(report, SweepReport { removed: 0, half_opened: 1 });

    let status = manager.status("cache").await.unwrap();
    assert_eq!(status.state, CircuitState::HalfOpen);
    assert!(manager.is_available("cache").await);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_probe_outcomes() {
    let manager = common::manual_sweep_manager();
    manager
        .register("flaky", ConnectionOptions::new().max_attempts(10).expiry_ms(100))
        .await
        .unwrap();
    manager.register("recovering", ConnectionOptions::new().expiry_ms(100)).await.unwrap();

    manager.open_circuit("flaky", None, None).await.unwrap();
    manager.open_circuit("recovering", None, None).await.unwrap();
    manager.failure("recovering", None).await.unwrap();

    tokio::time::advance(Duration::from_millis(100)).await;
    assert_eq!(manager.sweep().await.unwrap().half_opened, 2);

    // One failed probe is enough, whatever the count.
    manager.failure("flaky", None).await.unwrap();
    let flaky = manager.status("flaky").await.unwrap();
    assert_eq!(flaky.state, CircuitState::Open);
    assert_eq!(flaky.failure_count, 1);

    manager.success("recovering").await.unwrap();
    let recovering = manager.status("recovering").await.unwrap();
    assert_eq!(recovering.state, CircuitState::Closed);
    assert_eq!(recovering.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_threshold_expiry_and_reopen_scenario() {
    let manager = common::manual_sweep_manager();
    let mut events = manager.subscribe(EventFilter::all().connection("svc")).unwrap();

    manager.register("svc", ConnectionOptions::new().max_attempts(3)).await.unwrap();
    for _ in 0..3 {
        manager.failure("svc", Some("timeout".into())).await.unwrap();
    }

    let status = manager.status("svc").await.unwrap();
    assert_eq!(status.state, CircuitState::Open);
    let opened_at = status.opened_at.expect("opened_at not set");

    tokio::time::advance(Duration::from_millis(status.expiry_ms)).await;
    manager.sweep().await.unwrap();
    assert_eq!(manager.status("svc").await.unwrap().state, CircuitState::HalfOpen);

    manager.failure("svc", None).await.unwrap();
    let status = manager.status("svc").await.unwrap();
    assert_eq!(status.state, CircuitState::Open);
    assert!(status.opened_at.unwrap() >= opened_at + 60_000);

    let types: Vec<EventType> = {
        let mut types = Vec::new();
        for _ in 0..6 {
            types.push(common::next_event(&mut events).await.event_type);
        }
        types
    };
    assert_eq!(
        types,
        vec![
            EventType::Registration,
            EventType::Failure,
            EventType::Failure,
            EventType::CircuitOpened,
            EventType::CircuitHalfOpened,
            EventType::CircuitOpened,
        ]
    );
}

#[tokio::test]
async fn test_progressive_backoff_on_open() {
    let manager = common::manual_sweep_manager();
    manager
        .register(
            "search",
            ConnectionOptions::new().unlimited_attempts().progressive(100, 2.0, 1_000),
        )
        .await
        .unwrap();

    manager.failure("search", None).await.unwrap();
    manager.failure("search", None).await.unwrap();
    manager.open_circuit("search", None, None).await.unwrap();
    assert_eq!(manager.status("search").await.unwrap().expiry_ms, 400);

    for _ in 0..8 {
        manager.failure("search", None).await.unwrap();
    }
    manager.open_circuit("search", None, None).await.unwrap();
    assert_eq!(manager.status("search").await.unwrap().expiry_ms, 1_000);
}

#[tokio::test]
async fn test_close_and_reset() {
    let manager = common::manual_sweep_manager();
    let mut events = manager
        .subscribe(EventFilter::all().event_types(EventType::STATE_CHANGES))
        .unwrap();
    manager.register("queue", ConnectionOptions::new().max_attempts(2)).await.unwrap();

    manager.failure("queue", None).await.unwrap();
    manager.failure("queue", None).await.unwrap();
    manager.close_circuit("queue", Some("operator".into())).await.unwrap();

    let status = manager.status("queue").await.unwrap();
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.failure_count, 2);

    manager.reset_circuit("queue", None).await.unwrap();
    assert_eq!(manager.status("queue").await.unwrap().failure_count, 0);

    assert_eq!(common::next_event(&mut events).await.event_type, EventType::CircuitOpened);

    let closed = common::next_event(&mut events).await;
    assert_eq!(closed.event_type, EventType::CircuitClosed);
    assert_eq!(
        closed.data,
        EventData::StateChanged {
            previous: CircuitState::Open,
            new: CircuitState::Closed,
            reason: Some("operator".into()),
            failure_count: 2,
            expiry_ms: None,
        }
    );

    let reset = common::next_event(&mut events).await;
    assert_eq!(reset.event_type, EventType::CircuitReset);
}

#[tokio::test]
async fn test_unregister() {
    let manager = common::manual_sweep_manager();
    let mut events = manager
        .subscribe(EventFilter::all().event_types([EventType::ConnectionUnregistered, EventType::Registration]))
        .unwrap();

    assert!(manager.unregister("never-registered").await.is_ok());

    manager.register("db", ConnectionOptions::new()).await.unwrap();
    manager.unregister("db").await.unwrap();
    manager.unregister("db").await.unwrap();

    assert_eq!(
        manager.status("db").await.unwrap_err(),
        BreakerError::NotFound(ConnectionKey::new("db"))
    );

    assert_eq!(common::next_event(&mut events).await.event_type, EventType::Registration);
    assert_eq!(
        common::next_event(&mut events).await.event_type,
        EventType::ConnectionUnregistered
    );
    assert!(common::drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_configure_connection() {
    let manager = common::manual_sweep_manager();
    let mut events = manager
        .subscribe(EventFilter::all().event_types([EventType::ConnectionConfigured]))
        .unwrap();
    manager.register("api", ConnectionOptions::new()).await.unwrap();

    manager
        .configure(
            Some("api".into()),
            ConfigureOptions::new().max_attempts(1).expiry_ms(5_000),
        )
        .await
        .unwrap();

    let status = manager.status("api").await.unwrap();
    assert_eq!(status.max_attempts, Some(1));
    assert_eq!(status.expiry_ms, 5_000);
    assert_eq!(status.max_expiry_ms, 50_000);

    let event = common::next_event(&mut events).await;
    assert_eq!(event.connection_id, "api");

    manager.failure("api", None).await.unwrap();
    assert_eq!(manager.status("api").await.unwrap().state, CircuitState::Open);

    // Global settings do not touch existing connections.
    manager
        .configure(None, ConfigureOptions::new().expiry_ms(1))
        .await
        .unwrap();
    assert_eq!(manager.status("api").await.unwrap().expiry_ms, 5_000);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_connections_evicted() {
    let manager = ConnectionManager::spawn(GlobalConfig {
        cleanup_interval_ms: common::MANUAL_SWEEP_MS,
        inactive_threshold_ms: 1_000,
        ..GlobalConfig::default()
    });
    let mut removed = manager
        .subscribe(EventFilter::all().event_types([EventType::ConnectionRemoved]))
        .unwrap();

    manager.register("idle", ConnectionOptions::new()).await.unwrap();
    manager.register("busy", ConnectionOptions::new()).await.unwrap();

    tokio::time::advance(Duration::from_millis(800)).await;
    manager.success("busy").await.unwrap();
    tokio::time::advance(Duration::from_millis(500)).await;

    let report = manager.sweep().await.unwrap();
    assert_eq!(report, SweepReport { removed: 1, half_opened: 0 });

    assert!(manager.status("idle").await.is_err());
    assert!(manager.status("busy").await.is_ok());

    let event = common::next_event(&mut removed).await;
    assert_eq!(event.connection_id, "idle");
    assert!(matches!(event.data, EventData::Removed { state: CircuitState::Closed, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_timer_driven_sweep() {
    let manager = ConnectionManager::spawn(GlobalConfig {
        cleanup_interval_ms: 1_000,
        ..GlobalConfig::default()
    });
    manager.register("svc", ConnectionOptions::new()).await.unwrap();
    manager.open_circuit("svc", None, Some(500)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_100)).await;

    assert_eq!(manager.status("svc").await.unwrap().state, CircuitState::HalfOpen);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_timer_rearmed_on_interval_change() {
    let manager = common::manual_sweep_manager();
    manager.register("svc", ConnectionOptions::new()).await.unwrap();
    manager.open_circuit("svc", None, Some(100)).await.unwrap();

    manager
        .configure(None, ConfigureOptions::new().cleanup_interval_ms(200))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(manager.status("svc").await.unwrap().state, CircuitState::HalfOpen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_open_exactly_once() {
    let manager = common::manual_sweep_manager();
    let mut events = manager
        .subscribe(EventFilter::all().event_types([EventType::CircuitOpened, EventType::CircuitReset]))
        .unwrap();
    manager.register("shared", ConnectionOptions::new().max_attempts(50)).await.unwrap();

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.failure("shared", None).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let status = manager.status("shared").await.unwrap();
    assert_eq!(status.failure_count, 50);
    assert_eq!(status.state, CircuitState::Open);

    manager.reset_circuit("shared", None).await.unwrap();

    assert_eq!(common::next_event(&mut events).await.event_type, EventType::CircuitOpened);
    assert_eq!(common::next_event(&mut events).await.event_type, EventType::CircuitReset);
}

#[tokio::test]
async fn test_list_returns_every_connection() {
    let manager = common::manual_sweep_manager();
    manager.register("b", ConnectionOptions::new()).await.unwrap();
    manager.register("a", ConnectionOptions::new()).await.unwrap();
    manager.register(("a", "eu"), ConnectionOptions::new()).await.unwrap();

    let keys: Vec<ConnectionKey> = manager.list().await.unwrap().iter().map(|r| r.key()).collect();
    assert_eq!(
        keys,
        vec![
            ConnectionKey::new("a"),
            ConnectionKey::new("b"),
            ConnectionKey::scoped("a", "eu"),
        ]
    );
}
