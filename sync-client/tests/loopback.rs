//! End-to-end: a wearable engine against a companion service over the
//! in-memory loopback link.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use sync_client::{
    CompanionService, EngineConfig, EngineTasks, FixedProvider, LinkControl, LoopbackLink, ManualClock,
    SyncEngine, WearableEnd, WeatherReport,
};
use sync_core::{ConnectionEvent, ConnectionState, WeatherSnapshot};
use sync_types::{PeerId, Timestamp};
use tokio::sync::watch;

fn png() -> Vec<u8> {
    let pixels = image::RgbaImage::from_pixel(96, 96, image::Rgba([250, 220, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn sunny() -> WeatherReport {
    WeatherReport {
        condition: "Sunny".to_string(),
        high: 24.0,
        low: 13.0,
        icon: Some(png()),
    }
}

struct Harness {
    engine: Arc<SyncEngine<WearableEnd, ManualClock>>,
    provider: Arc<FixedProvider>,
    control: LinkControl,
    clock: ManualClock,
    _tasks: EngineTasks,
}

fn start(reachable: bool) -> Harness {
    let (wearable, companion) = LoopbackLink::pair(
        PeerId::new("watch").unwrap(),
        PeerId::new("phone").unwrap(),
    );
    let control = companion.control();
    control.set_reachable(reachable);

    let clock = ManualClock::new(Timestamp::zero());
    let provider = Arc::new(FixedProvider::new(sunny()));
    let service = CompanionService::new(companion, Arc::clone(&provider), clock.clone());
    tokio::spawn(async move { service.run().await });

    let config = EngineConfig::default()
        .with_default_peer("phone")
        .with_tick_interval(Duration::from_millis(20));
    let engine = Arc::new(SyncEngine::new(config, Arc::new(wearable), clock.clone()).unwrap());
    let tasks = engine.spawn();

    Harness {
        engine,
        provider,
        control,
        clock,
        _tasks: tasks,
    }
}

async fn wait_until(
    snapshots: &mut watch::Receiver<Arc<WeatherSnapshot>>,
    done: impl FnMut(&Arc<WeatherSnapshot>) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(10), snapshots.wait_for(done))
        .await
        .expect("timed out waiting for snapshot")
        .unwrap();
}

#[tokio::test]
async fn first_connection_delivers_weather_and_icon() {
    let harness = start(true);
    let mut snapshots = harness.engine.subscribe();

    wait_until(&mut snapshots, |s| s.image.bitmap().is_some()).await;

    let state = harness.engine.current_state();
    assert_eq!(state.condition.as_deref(), Some("Sunny"));
    assert_eq!(state.high, Some(24.0));
    assert_eq!(state.low, Some(13.0));
    assert_eq!(state.received_at, Some(Timestamp::zero()));
    let bitmap = state.image.bitmap().unwrap();
    assert_eq!((bitmap.width(), bitmap.height()), (70, 70));
    assert_eq!(harness.engine.last_peer().unwrap().as_str(), "phone");
}

#[tokio::test]
async fn stale_data_is_refreshed() {
    let harness = start(true);
    let mut snapshots = harness.engine.subscribe();
    wait_until(&mut snapshots, |s| s.condition.as_deref() == Some("Sunny")).await;

    harness.provider.set(WeatherReport {
        condition: "Rain".to_string(),
        high: 15.0,
        low: 10.0,
        icon: None,
    });
    // Still fresh: nothing new is requested
    harness.clock.set(Timestamp::from_millis(600_000));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        harness.engine.current_state().condition.as_deref(),
        Some("Sunny")
    );

    harness.clock.set(Timestamp::from_millis(1_800_001));
    wait_until(&mut snapshots, |s| s.condition.as_deref() == Some("Rain")).await;

    let state = harness.engine.current_state();
    assert_eq!(state.received_at, Some(Timestamp::from_millis(1_800_001)));
    // No icon in the new report; the old one stays
    assert!(state.image.bitmap().is_some());
}

#[tokio::test]
async fn unreachable_companion_is_retried() {
    let harness = start(false);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.engine.current_state().is_empty());
    assert_eq!(
        harness.engine.connection().state(),
        ConnectionState::Disconnected
    );

    harness.control.set_reachable(true);
    let mut snapshots = harness.engine.subscribe();
    wait_until(&mut snapshots, |s| s.condition.is_some()).await;
    assert!(harness.engine.connection().is_connected());
}

#[tokio::test]
async fn lost_link_reconnects() {
    let harness = start(true);
    let mut snapshots = harness.engine.subscribe();
    wait_until(&mut snapshots, |s| s.condition.is_some()).await;

    let mut events = harness.engine.connection().subscribe();
    harness.control.lose("walked away");

    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Ok(event) = events.recv().await {
            let done = event == ConnectionEvent::Connected;
            seen.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("never reconnected");

    assert!(matches!(seen[0], ConnectionEvent::Failed { .. }));
    assert!(harness.engine.connection().is_connected());
    assert_eq!(
        harness.engine.current_state().condition.as_deref(),
        Some("Sunny")
    );
}

#[tokio::test]
async fn suspension_pauses_requests() {
    let harness = start(true);
    let mut snapshots = harness.engine.subscribe();
    wait_until(&mut snapshots, |s| s.condition.is_some()).await;

    harness.control.suspend(1);
    tokio::time::timeout(Duration::from_secs(10), async {
        while !matches!(
            harness.engine.connection().state(),
            ConnectionState::Suspended { code: 1 }
        ) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("never suspended");

    harness.clock.set(Timestamp::from_millis(1_800_001));
    harness.provider.set(WeatherReport {
        condition: "Fog".to_string(),
        high: 8.0,
        low: 2.0,
        icon: None,
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        harness.engine.current_state().condition.as_deref(),
        Some("Sunny")
    );

    harness.control.resume();
    wait_until(&mut snapshots, |s| s.condition.as_deref() == Some("Fog")).await;
}

#[tokio::test]
async fn undecodable_item_is_skipped() {
    let harness = start(true);
    let mut snapshots = harness.engine.subscribe();
    wait_until(&mut snapshots, |s| s.condition.as_deref() == Some("Sunny")).await;

    harness.control.inject_bytes(b"not msgpack".to_vec());
    harness.provider.set(WeatherReport {
        condition: "Drizzle".to_string(),
        high: 12.0,
        low: 9.0,
        icon: None,
    });
    harness.clock.set(Timestamp::from_millis(1_800_001));

    wait_until(&mut snapshots, |s| s.condition.as_deref() == Some("Drizzle")).await;
    assert_eq!(harness.engine.current_state().high, Some(12.0));
}
