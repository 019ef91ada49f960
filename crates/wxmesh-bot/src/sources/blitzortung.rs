/// Blitzortung strike feed over MQTT.
///
/// Every published message is one strike as JSON with at least `lat` and
/// `lon`. Strikes are forwarded to the lightning loop without blocking the
/// MQTT event loop; when the loop falls behind, strikes are dropped.
use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use wxmesh_protocol::Strike;

pub const BROKER_HOST: &str = "blitzortung.ha.sed.pl";
pub const BROKER_PORT: u16 = 1883;
pub const STRIKE_TOPIC: &str = "blitzortung/1.1/#";

const RECONNECT_DELAY: Duration = Duration::from_secs(10);
const REQUEST_CAPACITY: usize = 16;

/// Decode one strike message. Anything else is `None`.
pub fn parse_strike(payload: &[u8]) -> Option<Strike> {
    serde_json::from_slice(payload).ok()
}

/// Subscribe to the strike topic and forward strikes to `strikes`.
/// The task ends when the receiving side is dropped.
pub fn spawn(strikes: mpsc::Sender<Strike>) -> JoinHandle<()> {
    tokio::spawn(run(strikes))
}

async fn run(strikes: mpsc::Sender<Strike>) {
    let client_id = format!("wxmesh-{}", std::process::id());
    let mut options = MqttOptions::new(client_id, BROKER_HOST, BROKER_PORT);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut events) = AsyncClient::new(options, REQUEST_CAPACITY);

    let mut dropped: u64 = 0;
    loop {
        match events.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("lightning: connected to {BROKER_HOST}:{BROKER_PORT}");
                // Clean session: subscribe again after every reconnect.
                if let Err(e) = client.try_subscribe(STRIKE_TOPIC, QoS::AtMostOnce) {
                    tracing::warn!("lightning: subscribe failed: {e}");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let Some(strike) = parse_strike(&publish.payload) else {
                    tracing::debug!("lightning: unparseable message on {}", publish.topic);
                    continue;
                };
                match strikes.try_send(strike) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        dropped += 1;
                        if dropped % 100 == 1 {
                            tracing::warn!("lightning: strike queue full, {dropped} strikes dropped");
                        }
                    }
                    Err(TrySendError::Closed(_)) => return,
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("lightning: MQTT connection error: {e}, retrying in {RECONNECT_DELAY:?}");
                if strikes.is_closed() {
                    return;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strike_ignores_extra_fields() {
        let payload = br#"{"time":1751371200000000000,"lat":48.31,"lon":17.52,"alt":0,"pol":0,"mds":9500,"mcg":201,"status":1,"region":1}"#;
        assert_eq!(parse_strike(payload), Some(Strike { lat: 48.31, lon: 17.52 }));
    }

    #[test]
    fn test_parse_strike_rejects_garbage() {
        assert_eq!(parse_strike(b"not json"), None);
        assert_eq!(parse_strike(br#"{"lat":48.3}"#), None);
    }
}
