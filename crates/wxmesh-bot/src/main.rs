mod inbox;
mod sources;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wxmesh_protocol::config::ConnectionKind;
use wxmesh_protocol::runtime::{run_forecast, run_lightning, run_meteo, run_quakes, run_radiation};
use wxmesh_protocol::{
    AlertConfig, AlertSink, Alarm, Channel, GeocodeCache, LightningMonitor, MeshcoreConfig,
    Messenger, MeteoMonitor, QuakeMonitor, RadiationMonitor,
};
use wxmesh_transport::{CompanionConfig, CompanionNode};

use sources::{blitzortung, meteoalarm, nominatim, open_meteo, radmon, seismic};

/// Strikes buffered between the MQTT client and the lightning loop.
const STRIKE_QUEUE: usize = 1024;
/// Quake events buffered between the WebSocket and the quake loop.
const QUAKE_QUEUE: usize = 64;

#[derive(Parser)]
#[command(name = "wxmesh-bot", about = "Weather and hazard alerts for a MeshCore mesh")]
struct Cli {
    /// TOML configuration file. Built-in defaults are used if it does not exist.
    #[arg(short, long, default_value = "wxmesh.toml")]
    config: PathBuf,

    /// Serial port of the companion radio; overrides the config file.
    #[arg(short, long)]
    port: Option<String>,

    /// Log filter (e.g. "debug" or "wxmesh_protocol=debug"). RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(path: &Path) -> anyhow::Result<AlertConfig> {
    if !path.exists() {
        tracing::warn!("bot: {} not found, using built-in defaults", path.display());
        let config = AlertConfig::default();
        config.validate()?;
        return Ok(config);
    }
    let config = AlertConfig::load_from_path(path)?;
    tracing::info!("bot: loaded {}", path.display());
    Ok(config)
}

fn companion_config(meshcore: &MeshcoreConfig) -> CompanionConfig {
    let config = match meshcore.connection {
        ConnectionKind::Serial => {
            CompanionConfig::serial(&meshcore.port).baud_rate(meshcore.baud_rate)
        }
        ConnectionKind::Tcp => CompanionConfig::tcp(&meshcore.host),
    };
    config.max_channels(meshcore.max_channels)
}

/// Channel for one alert source. A missing channel disables only that source.
async fn resolve_channel(node: &CompanionNode, source: &str, name: &str) -> Option<Channel> {
    match node.find_or_create_channel(name).await {
        Ok(channel) => {
            tracing::info!(
                "bot: {source} -> {} (slot {}, hash 0x{:02X})",
                channel.name,
                channel.index,
                channel.hash()
            );
            Some(channel)
        }
        Err(e) => {
            tracing::error!("bot: {source} disabled, channel {name} unavailable: {e}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.as_str().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&cli.config)?;
    if let Some(port) = cli.port {
        config.meshcore.connection = ConnectionKind::Serial;
        config.meshcore.port = port;
    }

    let link = companion_config(&config.meshcore);
    tracing::info!("bot: connecting to {:?}", link.link());
    let node = Arc::new(
        CompanionNode::connect(link)
            .await
            .context("connecting to the companion radio")?,
    );
    let me = node.app_start().await.context("companion handshake")?;
    tracing::info!("bot: connected as {}", me.name);

    let sink: Arc<dyn AlertSink> =
        Arc::new(Messenger::new(node.clone(), config.send.to_send_config()));
    let http = sources::http_client()?;
    let geocoder = GeocodeCache::new(Arc::new(nominatim::NominatimGeocoder::new(http.clone())));
    let home = config.home();
    let labels = config.compass.clone();

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    tasks.push(tokio::spawn(inbox::run(node.clone())));

    if config.blitz.enabled {
        if let Some(channel) = resolve_channel(&node, "lightning", &config.blitz.channel).await {
            let (tx, rx) = mpsc::channel(STRIKE_QUEUE);
            tasks.push(blitzortung::spawn(tx));
            tasks.push(tokio::spawn(run_lightning(
                LightningMonitor::new(&config.blitz, home, labels.clone()),
                rx,
                config.blitz.collection_interval(),
                geocoder.clone(),
                sink.clone(),
                channel,
            )));
        }
    }

    if config.quake.enabled {
        if let Some(channel) = resolve_channel(&node, "quake", &config.quake.channel).await {
            let (tx, rx) = mpsc::channel(QUAKE_QUEUE);
            tasks.push(seismic::spawn(seismic::SEISMIC_URL.to_string(), tx));
            tasks.push(tokio::spawn(run_quakes(
                QuakeMonitor::new(&config.quake, home, labels.clone()),
                rx,
                geocoder.clone(),
                sink.clone(),
                channel,
            )));
        }
    }

    if config.radiation.enabled {
        if let Some(channel) = resolve_channel(&node, "radiation", &config.radiation.channel).await
        {
            tasks.push(tokio::spawn(run_radiation(
                RadiationMonitor::new(config.radiation.clone(), home, labels.clone()),
                Arc::new(radmon::RadmonClient::new(http.clone())),
                config.radiation.poll_interval(),
                sink.clone(),
                channel,
            )));
        }
    }

    if config.meteo_alerts.enabled {
        if let Some(channel) =
            resolve_channel(&node, "meteo", &config.meteo_alerts.channel).await
        {
            let feed = meteoalarm::MeteoalarmFeed::new(http.clone(), &config.meteo_alerts.url);
            tasks.push(tokio::spawn(run_meteo(
                MeteoMonitor::new(config.meteo_alerts.clone()),
                Arc::new(feed),
                config.meteo_alerts.poll_interval(),
                sink.clone(),
                channel,
            )));
        }
    }

    if config.forecast.enabled {
        if let Some(channel) = resolve_channel(&node, "forecast", &config.forecast.channel).await {
            let alarm = Alarm::parse(&config.forecast.alarm)?;
            tasks.push(tokio::spawn(run_forecast(
                config.forecast.clone(),
                alarm,
                Arc::new(open_meteo::OpenMeteoClient::new(http.clone())),
                sink.clone(),
                channel,
            )));
        }
    }

    tracing::info!("bot: ready, {} tasks running", tasks.len());
    tokio::signal::ctrl_c().await?;
    tracing::info!("bot: shutting down");
    for task in tasks {
        task.abort();
    }
    Ok(())
}
