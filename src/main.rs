mod app;

use anyhow::Result;
use chrono::Utc;
use weatherdash_core::Config;
use weatherdash_weather::{Severity, SeverityCounts};

use crate::app::App;

#[tokio::main]
async fn main() -> Result<()> {
    weatherdash_core::init()?;

    let config = Config::load()?;
    let app = App::new(config)?;

    tracing::info!("WeatherDash started");

    let prefetch = app.spawn_prefetch();

    let current = match app.refresh().await {
        Ok(current) => current,
        Err(e) => {
            tracing::error!("Failed to load weather: {}", e);
            eprintln!("{} ({:?})", e.user_message(), e.suggested_action());
            app.shutdown();
            return Err(e.into());
        }
    };
    let location = &current.location;
    let snapshot = &current.snapshot;

    if let Some(hint) = &location.geo_hint {
        tracing::warn!("{}", hint);
    }

    println!("{} ({})", location.label, app.active().get().source_label());
    println!(
        "  {:.0}°F {} ({})",
        snapshot.current.temp,
        snapshot.current.condition,
        snapshot.scene().id()
    );
    for day in &snapshot.daily {
        println!(
            "  {}  {:>4.0}° / {:>4.0}°  {}",
            day.date.format("%a %b %-d"),
            day.temp_high,
            day.temp_low,
            day.condition
        );
    }

    let alerts = app.weather().alerts_for(location.coords).await;
    let now = Utc::now().timestamp_millis();
    let counts = SeverityCounts::tally(&alerts, true, now);
    if counts.total() > 0 {
        println!(
            "  {} active alerts ({} extreme, {} severe)",
            counts.total(),
            counts.get(Severity::Extreme),
            counts.get(Severity::Severe)
        );
    }

    match prefetch.await {
        Ok(loaded) => tracing::debug!("{} previews ready", loaded),
        Err(e) => tracing::warn!("Prefetch task failed: {}", e),
    }
    for city in app.saved().list() {
        let preview = app.weather().preview_for_label(&city.label());
        if let (Some(temp), Some(condition)) = (preview.temp, preview.condition) {
            println!("  * {}: {:.0}°F {}", city.label(), temp, condition);
        }
    }

    tracing::info!(
        "{} recent searches, {} alerts across viewed locations, geolocation {}",
        app.recent().list().len(),
        app.weather().active_alert_count(),
        if app.geo().can_use() { "available" } else { "unavailable" }
    );
    tracing::debug!("Forecast host: {}", app.config().weather.forecast_url);

    app.shutdown();
    Ok(())
}
