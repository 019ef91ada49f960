/// SeismicPortal standing-order WebSocket.
///
/// The server pushes one JSON message per event change. The connection is
/// re-established after a fixed delay whenever it drops.
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use wxmesh_protocol::{parse_seismic_message, QuakeEvent};

pub const SEISMIC_URL: &str = "wss://www.seismicportal.eu/standing_order/websocket";

const RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Stream new events into `events` until the receiving side is dropped.
pub fn spawn(url: String, events: mpsc::Sender<QuakeEvent>) -> JoinHandle<()> {
    tokio::spawn(run(url, events))
}

async fn run(url: String, events: mpsc::Sender<QuakeEvent>) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((mut stream, _)) => {
                tracing::info!("quake: connected to {url}");
                while let Some(message) = stream.next().await {
                    let text = match message {
                        Ok(Message::Text(text)) => text,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            tracing::warn!("quake: stream error: {e}");
                            break;
                        }
                    };
                    match parse_seismic_message(&text) {
                        Ok(Some(event)) => {
                            if events.send(event).await.is_err() {
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::debug!("quake: skipping message: {e}"),
                    }
                }
                tracing::warn!("quake: connection closed");
            }
            Err(e) => tracing::warn!("quake: connect failed: {e}"),
        }

        if events.is_closed() {
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}
