/// Relay-confirmed delivery.
///
/// The mesh gives no acknowledgement for channel broadcasts. After each
/// send the messenger listens to the radio's raw receive log for a bounded
/// window: group text for our channel that carries a non-empty relay path
/// means a repeater picked the message up. Unconfirmed sends are retried a
/// fixed number of times, and every call ends with a cooldown so alerts
/// never go out back to back.
///
/// Callers never see an error. The returned [`DeliveryReport`] is purely
/// informational.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use wxmesh_transport::{Channel, RawRxEvent};

use crate::packet::MeshPacket;
use crate::text::truncate;
use crate::transport::MeshTransport;

/// Largest text payload the companion accepts for a channel message.
pub const MAX_CHANNEL_TEXT_BYTES: usize = 155;

// ── Configuration ───────────────────────────────────────────────────────

/// Delivery tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendConfig {
    /// How long to listen for a relay after each transmission.
    pub repeat_wait: Duration,
    /// Transmissions per alert, including the first.
    pub max_retries: u32,
    /// Pause after every alert, confirmed or not.
    pub cooldown: Duration,
    /// Text is truncated to this many bytes before sending.
    pub max_text_bytes: usize,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            repeat_wait: Duration::from_millis(15_000),
            max_retries: 3,
            cooldown: Duration::from_millis(30_000),
            max_text_bytes: MAX_CHANNEL_TEXT_BYTES,
        }
    }
}

// ── Reports ─────────────────────────────────────────────────────────────

/// One transmission and what was heard after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    pub attempt: u32,
    pub sent_at: Instant,
    pub channel_hash: u8,
    pub confirmed: bool,
    /// Path hash of the repeater that relayed the message.
    pub relay: Option<u8>,
}

/// Outcome of one `send_alert` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub channel: String,
    /// Text as transmitted, after truncation.
    pub text: String,
    pub attempts: Vec<DeliveryAttempt>,
}

impl DeliveryReport {
    fn new(channel: &Channel, text: String) -> Self {
        Self {
            channel: channel.name.clone(),
            text,
            attempts: Vec::new(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.attempts.iter().any(|a| a.confirmed)
    }

    /// Repeater that confirmed delivery, if any.
    pub fn relay(&self) -> Option<u8> {
        self.attempts.iter().find_map(|a| a.relay)
    }
}

/// Anything that can put an alert on a channel. Never fails.
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_alert(&self, message: &str, channel: &Channel) -> DeliveryReport;
}

// ── Messenger ───────────────────────────────────────────────────────────

/// Sends alerts one at a time and confirms them by listening for relays.
///
/// Shared by every alert source; the internal lock keeps one
/// send-and-confirm cycle (cooldown included) on air at a time.
pub struct Messenger {
    transport: Arc<dyn MeshTransport>,
    config: SendConfig,
    send_lock: Mutex<()>,
}

impl Messenger {
    pub fn new(transport: Arc<dyn MeshTransport>, config: SendConfig) -> Self {
        Self {
            transport,
            config,
            send_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SendConfig {
        &self.config
    }

    async fn deliver(&self, message: &str, channel: &Channel) -> DeliveryReport {
        let _turn = self.send_lock.lock().await;

        let text = truncate(message, self.config.max_text_bytes);
        let mut report = DeliveryReport::new(channel, text);
        if report.text.is_empty() {
            tracing::warn!(
                "messenger: [{}] nothing left after truncation, not sending: {message}",
                channel.name
            );
            return report;
        }

        let channel_hash = channel.hash();
        let max = self.config.max_retries;

        for attempt in 1..=max {
            // Subscribe before sending so a fast relay is not missed.
            let mut rx = self.transport.subscribe_raw_rx();
            let sent_at = Instant::now();

            let relay = match self
                .transport
                .send_channel_text(channel.index, &report.text)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        "messenger: sent [{}] (attempt {attempt}/{max}): {message}",
                        channel.name
                    );
                    wait_for_relay(&mut rx, channel_hash, self.config.repeat_wait).await
                }
                Err(e) => {
                    tracing::warn!(
                        "messenger: send on [{}] failed (attempt {attempt}/{max}): {e}",
                        channel.name
                    );
                    None
                }
            };
            drop(rx);

            report.attempts.push(DeliveryAttempt {
                attempt,
                sent_at,
                channel_hash,
                confirmed: relay.is_some(),
                relay,
            });

            if let Some(id) = relay {
                tracing::info!("messenger: confirmed, relayed by repeater 0x{id:02X}");
                break;
            }
            if attempt < max {
                tracing::info!("messenger: not heard by a repeater, retrying");
            } else {
                tracing::warn!("messenger: not heard by a repeater after {max} attempts");
            }
        }

        tokio::time::sleep(self.config.cooldown).await;
        report
    }
}

#[async_trait::async_trait]
impl AlertSink for Messenger {
    async fn send_alert(&self, message: &str, channel: &Channel) -> DeliveryReport {
        self.deliver(message, channel).await
    }
}

/// Listen until a relay of our channel's group text is heard or the window
/// closes. Undecodable frames are skipped.
async fn wait_for_relay(
    rx: &mut broadcast::Receiver<RawRxEvent>,
    channel_hash: u8,
    window: Duration,
) -> Option<u8> {
    let deadline = Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Err(_) => return None,
            Ok(Ok(event)) => {
                let Ok(packet) = MeshPacket::from_bytes(&event.raw) else {
                    continue;
                };
                if let Some(relay) = packet.relayed_group_text(channel_hash) {
                    return Some(relay);
                }
            }
            Ok(Err(RecvError::Lagged(missed))) => {
                tracing::debug!("messenger: receive log lagged, {missed} frames skipped");
            }
            Ok(Err(RecvError::Closed)) => {
                // Link is gone; keep the window length so retries stay paced.
                tokio::time::sleep_until(deadline).await;
                return None;
            }
        }
    }
}

// ── Recording sink (tests) ──────────────────────────────────────────────

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Sink that records every alert and reports it as sent unconfirmed.
    #[derive(Clone, Default)]
    pub struct RecordingSink {
        sent: Arc<StdMutex<Vec<(String, String)>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// `(channel name, text)` pairs in send order.
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent().into_iter().map(|(_, text)| text).collect()
        }
    }

    #[async_trait::async_trait]
    impl AlertSink for RecordingSink {
        async fn send_alert(&self, message: &str, channel: &Channel) -> DeliveryReport {
            self.sent
                .lock()
                .unwrap()
                .push((channel.name.clone(), message.to_string()));
            DeliveryReport::new(channel, message.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{header_byte, RouteType, PAYLOAD_TYPE_GRP_TXT};
    use crate::transport::mock::{Echo, MockTransport};

    fn relayed(channel: &Channel, path: &[u8]) -> Vec<u8> {
        let mut raw = vec![header_byte(RouteType::Flood, PAYLOAD_TYPE_GRP_TXT, 0)];
        raw.push(path.len() as u8);
        raw.extend_from_slice(path);
        raw.extend_from_slice(&[channel.hash(), 0xAA, 0xBB]);
        raw
    }

    fn messenger(transport: &MockTransport) -> Messenger {
        Messenger::new(Arc::new(transport.clone()), SendConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_retries_exactly_max_then_returns() {
        let transport = MockTransport::new();
        let m = messenger(&transport);
        let channel = Channel::from_name(1, "#alerts");

        let start = Instant::now();
        let report = m.send_alert("🌩️ Senec (30km North)", &channel).await;

        assert_eq!(transport.sent().len(), 3);
        assert_eq!(report.attempts.len(), 3);
        assert!(!report.is_confirmed());
        assert_eq!(report.relay(), None);
        // three windows plus the cooldown
        assert_eq!(start.elapsed(), Duration::from_secs(3 * 15 + 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_stops_retrying() {
        let transport = MockTransport::new();
        let channel = Channel::from_name(2, "#weather");
        transport.push_echo(Echo::Silence);
        transport.push_echo(Echo::Frames(vec![relayed(&channel, &[0x10, 0x9C])]));
        let m = messenger(&transport);

        let report = m.send_alert("hello", &channel).await;
        assert_eq!(transport.sent(), vec![(2, "hello".into()), (2, "hello".into())]);
        assert!(report.is_confirmed());
        assert_eq!(report.relay(), Some(0x9C));
        assert!(!report.attempts[0].confirmed);
        assert_eq!(report.attempts[1].attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_noise_during_window() {
        let transport = MockTransport::new();
        let channel = Channel::from_name(0, "#alerts");
        let other = Channel::from_name(1, "#other");
        // Skip if the two hashes happen to collide.
        if other.hash() == channel.hash() {
            return;
        }
        transport.push_echo(Echo::Frames(vec![
            vec![0x15, 0x09],          // truncated
            relayed(&channel, &[]),    // heard directly, no repeater
            relayed(&other, &[0x33]),  // someone else's channel
            relayed(&channel, &[0x21]),
        ]));
        let m = messenger(&transport);

        let report = m.send_alert("x y", &channel).await;
        assert_eq!(transport.sent().len(), 1);
        assert_eq!(report.relay(), Some(0x21));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_is_truncated_to_budget() {
        let transport = MockTransport::new();
        let m = messenger(&transport);
        let channel = Channel::from_name(0, "#alerts");
        let long = "word ".repeat(60);

        let report = m.send_alert(&long, &channel).await;
        let (_, sent) = &transport.sent()[0];
        assert!(sent.len() <= MAX_CHANNEL_TEXT_BYTES);
        assert_eq!(sent, &report.text);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_errors_are_absorbed() {
        let transport = MockTransport::new();
        transport.set_fail_sends(true);
        let m = messenger(&transport);
        let channel = Channel::from_name(0, "#alerts");

        let start = Instant::now();
        let report = m.send_alert("hello", &channel).await;
        assert_eq!(report.attempts.len(), 3);
        assert!(!report.is_confirmed());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_alerts_are_serialised() {
        let transport = MockTransport::new();
        let channel = Channel::from_name(0, "#alerts");
        transport.push_echo(Echo::Frames(vec![relayed(&channel, &[1])]));
        transport.push_echo(Echo::Frames(vec![relayed(&channel, &[2])]));
        let m = Arc::new(messenger(&transport));

        let first = {
            let (m, channel) = (m.clone(), channel.clone());
            tokio::spawn(async move { m.send_alert("one", &channel).await })
        };
        let second = {
            let (m, channel) = (m.clone(), channel.clone());
            tokio::spawn(async move { m.send_alert("two", &channel).await })
        };

        // First alert is in its cooldown; the second must still be waiting.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.sent().len(), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.sent().len(), 2);

        assert!(first.await.unwrap().is_confirmed());
        assert!(second.await.unwrap().is_confirmed());
    }
}
