use kubalert::core::memory::{PressureLevel, safe_spawn};

#[tokio::test]
async fn test_pressure_bands_use_inclusive_thresholds() {
    assert_eq!(PressureLevel::from_percent(0.0), PressureLevel::Normal);
    assert_eq!(PressureLevel::from_percent(69.9), PressureLevel::Normal);
    assert_eq!(PressureLevel::from_percent(70.0), PressureLevel::Warning);
    assert_eq!(PressureLevel::from_percent(84.9), PressureLevel::Warning);
    assert_eq!(PressureLevel::from_percent(85.0), PressureLevel::Critical);
    assert_eq!(PressureLevel::from_percent(95.0), PressureLevel::Emergency);
    assert_eq!(PressureLevel::from_percent(120.0), PressureLevel::Emergency);
}

#[tokio::test]
async fn test_pressure_levels_are_ordered() {
    assert!(PressureLevel::Normal < PressureLevel::Warning);
    assert!(PressureLevel::Warning < PressureLevel::Critical);
    assert!(PressureLevel::Critical < PressureLevel::Emergency);
    assert_eq!(PressureLevel::Critical.as_str(), "critical");
}

#[tokio::test]
async fn test_safe_spawn_survives_panics() {
    let handle = safe_spawn("test-worker", async {
        panic!("boom");
    });
    // The wrapper completes normally instead of propagating the panic.
    handle.await.unwrap();
}

#[tokio::test]
async fn test_safe_spawn_runs_the_future() {
    let (tx, rx) = tokio::sync::oneshot::channel();
    safe_spawn("test-worker", async move {
        tx.send(42).unwrap();
    });
    assert_eq!(rx.await.unwrap(), 42);
}
