use tokio::sync::broadcast;
use wxmesh_transport::{CompanionNode, RawRxEvent};

use crate::error::AlertError;

/// Radio abstraction for the messenger.
///
/// In production: implemented by [`CompanionNode`].
/// In tests: implemented by `MockTransport` (records sends, injects frames).
#[async_trait::async_trait]
pub trait MeshTransport: Send + Sync {
    /// Broadcast text on a channel slot.
    async fn send_channel_text(&self, channel_index: u8, text: &str) -> Result<(), AlertError>;

    /// Subscribe to the raw receive log. The subscription ends when the
    /// receiver is dropped.
    fn subscribe_raw_rx(&self) -> broadcast::Receiver<RawRxEvent>;
}

// ── Impl for CompanionNode (production) ─────────────────────────────────

#[async_trait::async_trait]
impl MeshTransport for CompanionNode {
    async fn send_channel_text(&self, channel_index: u8, text: &str) -> Result<(), AlertError> {
        CompanionNode::send_channel_text(self, channel_index, text)
            .await
            .map_err(AlertError::from)
    }

    fn subscribe_raw_rx(&self) -> broadcast::Receiver<RawRxEvent> {
        CompanionNode::subscribe_raw_rx(self)
    }
}

// ── MockTransport (tests) ───────────────────────────────────────────────

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// What to do after each send.
    #[derive(Debug, Clone)]
    pub enum Echo {
        /// Nobody relays.
        Silence,
        /// Inject these raw frames right after the send returns.
        Frames(Vec<Vec<u8>>),
    }

    /// Fake radio that records sends and replays scripted raw frames.
    #[derive(Clone)]
    pub struct MockTransport {
        sent: Arc<Mutex<Vec<(u8, String)>>>,
        echoes: Arc<Mutex<Vec<Echo>>>,
        fail_sends: Arc<Mutex<bool>>,
        raw_tx: broadcast::Sender<RawRxEvent>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            let (raw_tx, _) = broadcast::channel(64);
            Self {
                sent: Arc::new(Mutex::new(Vec::new())),
                echoes: Arc::new(Mutex::new(Vec::new())),
                fail_sends: Arc::new(Mutex::new(false)),
                raw_tx,
            }
        }

        /// Queue the reaction to the next send. Sends with no queued
        /// reaction are met with silence.
        pub fn push_echo(&self, echo: Echo) {
            self.echoes.lock().unwrap().push(echo);
        }

        pub fn set_fail_sends(&self, fail: bool) {
            *self.fail_sends.lock().unwrap() = fail;
        }

        pub fn sent(&self) -> Vec<(u8, String)> {
            self.sent.lock().unwrap().clone()
        }

        /// Inject a frame into the raw receive log now.
        pub fn inject(&self, raw: Vec<u8>) {
            let _ = self.raw_tx.send(RawRxEvent {
                snr: 8.0,
                rssi: -80,
                raw,
            });
        }
    }

    #[async_trait::async_trait]
    impl MeshTransport for MockTransport {
        async fn send_channel_text(&self, channel_index: u8, text: &str) -> Result<(), AlertError> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_index, text.to_string()));
            if *self.fail_sends.lock().unwrap() {
                return Err(AlertError::Transport(
                    wxmesh_transport::TransportError::Timeout {
                        command: "SendChannelText",
                    },
                ));
            }
            let echo = {
                let mut echoes = self.echoes.lock().unwrap();
                if echoes.is_empty() {
                    Echo::Silence
                } else {
                    echoes.remove(0)
                }
            };
            if let Echo::Frames(frames) = echo {
                for raw in frames {
                    self.inject(raw);
                }
            }
            Ok(())
        }

        fn subscribe_raw_rx(&self) -> broadcast::Receiver<RawRxEvent> {
            self.raw_tx.subscribe()
        }
    }
}
