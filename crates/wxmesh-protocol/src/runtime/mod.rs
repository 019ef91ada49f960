/// Per-source alert loops.
///
/// Each enabled source runs as its own task that owns its engine state
/// (buffer, histories, suppression store). All tasks share one
/// [`AlertSink`]; the messenger behind it serialises the actual radio
/// traffic, so a slow confirmation in one loop simply delays the others.
///
/// Stream-driven loops (lightning, quakes) end when their input channel
/// closes. Polling loops run until their task is aborted.
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use wxmesh_transport::Channel;

use crate::config::ForecastConfig;
use crate::forecast::{send_forecasts, Alarm, AlarmClock};
use crate::geocode::GeocodeCache;
use crate::lightning::{LightningMonitor, Strike};
use crate::messenger::AlertSink;
use crate::meteo::MeteoMonitor;
use crate::quake::{QuakeEvent, QuakeMonitor};
use crate::radiation::RadiationMonitor;
use crate::sources::{ForecastSource, RadiationSource, WarningFeed};

/// How often a daily forecast alarm compares against the wall clock.
pub const ALARM_CHECK_INTERVAL: Duration = Duration::from_secs(30);

// ── Stream-driven ───────────────────────────────────────────────────────

/// Buffer strikes and evaluate the buffer every `interval`.
pub async fn run_lightning(
    mut monitor: LightningMonitor,
    mut strikes: mpsc::Receiver<Strike>,
    interval: Duration,
    geocoder: GeocodeCache,
    sink: Arc<dyn AlertSink>,
    channel: Channel,
) {
    let mut window = tokio::time::interval(interval);
    window.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    window.tick().await;

    tracing::info!("lightning: collecting strikes every {interval:?}");
    loop {
        tokio::select! {
            strike = strikes.recv() => match strike {
                Some(strike) => {
                    monitor.record(strike);
                }
                None => {
                    tracing::warn!("lightning: strike stream closed");
                    break;
                }
            },
            _ = window.tick() => {
                let sent = monitor.flush(&geocoder, sink.as_ref(), &channel).await;
                if sent > 0 {
                    tracing::info!("lightning: {sent} cluster alerts this window");
                }
            }
        }
    }
}

/// Handle seismic events as they arrive.
pub async fn run_quakes(
    mut monitor: QuakeMonitor,
    mut events: mpsc::Receiver<QuakeEvent>,
    geocoder: GeocodeCache,
    sink: Arc<dyn AlertSink>,
    channel: Channel,
) {
    while let Some(event) = events.recv().await {
        monitor.handle(&event, &geocoder, sink.as_ref(), &channel).await;
    }
    tracing::warn!("quake: event stream closed");
}

// ── Polling ─────────────────────────────────────────────────────────────

fn poll_timer(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Poll radiation stations, first poll immediately.
pub async fn run_radiation(
    mut monitor: RadiationMonitor,
    source: Arc<dyn RadiationSource>,
    period: Duration,
    sink: Arc<dyn AlertSink>,
    channel: Channel,
) {
    let mut timer = poll_timer(period);
    loop {
        timer.tick().await;
        monitor.poll(source.as_ref(), sink.as_ref(), &channel).await;
    }
}

/// Poll the warning feed, first poll immediately.
pub async fn run_meteo(
    mut monitor: MeteoMonitor,
    feed: Arc<dyn WarningFeed>,
    period: Duration,
    sink: Arc<dyn AlertSink>,
    channel: Channel,
) {
    let mut timer = poll_timer(period);
    loop {
        timer.tick().await;
        let sent = monitor.poll(feed.as_ref(), sink.as_ref(), &channel).await;
        tracing::debug!("meteo: {sent} warnings delivered this poll");
    }
}

/// Send forecasts on the configured alarm, against the local wall clock.
pub async fn run_forecast(
    config: ForecastConfig,
    alarm: Alarm,
    source: Arc<dyn ForecastSource>,
    sink: Arc<dyn AlertSink>,
    channel: Channel,
) {
    run_forecast_with_clock(config, alarm, source, sink, channel, || {
        Local::now().naive_local()
    })
    .await
}

/// [`run_forecast`] with an injectable wall clock. Returns after the
/// single send of an immediate alarm; a daily alarm runs forever.
pub async fn run_forecast_with_clock<F>(
    config: ForecastConfig,
    alarm: Alarm,
    source: Arc<dyn ForecastSource>,
    sink: Arc<dyn AlertSink>,
    channel: Channel,
    clock: F,
) where
    F: Fn() -> NaiveDateTime + Send,
{
    let mut alarm_clock = AlarmClock::new(alarm);
    if alarm == Alarm::Immediate {
        if alarm_clock.should_fire(clock()) {
            send_forecasts(source.as_ref(), sink.as_ref(), &channel, &config).await;
        }
        return;
    }

    tracing::info!("forecast: scheduled {alarm:?}");
    let mut timer = poll_timer(ALARM_CHECK_INTERVAL);
    loop {
        timer.tick().await;
        if alarm_clock.should_fire(clock()) {
            tracing::info!("forecast: alarm triggered");
            send_forecasts(source.as_ref(), sink.as_ref(), &channel, &config).await;
        }
    }
}
