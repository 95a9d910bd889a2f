//! Run a wearable engine against a simulated companion.

use anyhow::{Context, Result};
use std::io::Cursor;
use std::sync::Arc;
use sync_client::{
    Clock, CompanionService, EngineConfig, FixedProvider, LoopbackLink, SyncEngine, SystemClock,
    WeatherReport,
};
use sync_core::WeatherSnapshot;
use sync_types::{PeerId, Timestamp};
use tracing::info;

/// Run the simulate command.
///
/// Prints one snapshot per tick and returns the last one.
pub async fn run(config: EngineConfig, ticks: u32, json: bool) -> Result<Arc<WeatherSnapshot>> {
    let companion_id = config.default_peer_id().context("Invalid default_peer")?;
    let wearable_id = PeerId::new("wearable")?;
    let (wearable, companion) = LoopbackLink::pair(wearable_id, companion_id);

    let service = CompanionService::new(companion, FixedProvider::new(demo_report()?), SystemClock);
    let companion_task = tokio::spawn(async move { service.run().await });

    let tick = config.tick_interval();
    let engine = Arc::new(
        SyncEngine::new(config, Arc::new(wearable), SystemClock)
            .context("Failed to start sync engine")?,
    );
    let tasks = engine.spawn();
    info!(ticks, ?tick, "simulation started");

    let mut timer = tokio::time::interval(tick);
    timer.tick().await;
    for n in 1..=ticks {
        timer.tick().await;
        let snapshot = engine.current_state();
        if json {
            let line = serde_json::json!({ "tick": n, "snapshot": &*snapshot });
            println!("{}", serde_json::to_string(&line)?);
        } else {
            println!("[{:>4}] {}", n, describe(&snapshot, SystemClock.now()));
        }
    }

    tasks.abort();
    engine.shutdown().await;
    companion_task.abort();
    info!("simulation finished");

    Ok(engine.current_state())
}

/// One-line human summary of a snapshot.
fn describe(snapshot: &WeatherSnapshot, now: Timestamp) -> String {
    let Some(received_at) = snapshot.received_at else {
        return "waiting for data".to_string();
    };

    let condition = snapshot.condition.as_deref().unwrap_or("-");
    let temperature = |value: Option<f64>| value.map_or("-".to_string(), |v| format!("{v:.1}"));
    let icon = snapshot
        .image
        .bitmap()
        .map_or("none".to_string(), |b| format!("{}x{}", b.width(), b.height()));

    format!(
        "{} {}/{} icon={} age={}s theme={}",
        condition,
        temperature(snapshot.high),
        temperature(snapshot.low),
        icon,
        now.saturating_since(received_at).as_secs(),
        snapshot.theme.value()
    )
}

fn demo_report() -> Result<WeatherReport> {
    Ok(WeatherReport {
        condition: "Partly cloudy".to_string(),
        high: 19.5,
        low: 11.0,
        icon: Some(demo_icon()?),
    })
}

fn demo_icon() -> Result<Vec<u8>> {
    let pixels = image::RgbaImage::from_pixel(48, 48, image::Rgba([135, 206, 235, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut out, image::ImageFormat::Png)
        .context("Failed to encode demo icon")?;
    Ok(out.into_inner())
}
