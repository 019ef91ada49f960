use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;

use crate::channel::Channel;
use crate::config::{CompanionConfig, Link};
use crate::frame::{write_framed, FrameDecoder};
use crate::message::{Command, DeviceInfo, Inbound, InboundMessage, Push, RawRxEvent, Response, SelfInfo};
use crate::TransportError;

/// Responses buffered between the reader task and the waiting command.
const RESPONSE_BUFFER: usize = 16;
const READ_CHUNK: usize = 1024;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Writer half plus the response queue. Holding the lock means owning the
/// single in-flight command slot.
struct CommandPipe {
    writer: BoxedWriter,
    responses: mpsc::Receiver<Response>,
}

/// A connected MeshCore companion radio.
///
/// A background reader task decodes every frame the radio sends. Replies
/// are routed to whichever command is in flight; pushes are broadcast to
/// subscribers. Commands are strictly one at a time.
pub struct CompanionNode {
    pipe: Mutex<CommandPipe>,
    raw_rx_tx: broadcast::Sender<RawRxEvent>,
    msg_waiting_tx: broadcast::Sender<()>,
    reader: JoinHandle<()>,
    command_timeout: Duration,
    max_channels: u8,
    app_name: String,
}

impl CompanionNode {
    /// Open the configured link (TCP or serial) and start the reader task.
    pub async fn connect(config: CompanionConfig) -> Result<Self, TransportError> {
        match config.link.clone() {
            Link::Tcp { addr } => {
                let stream = TcpStream::connect(&addr)
                    .await
                    .map_err(|source| TransportError::Connect {
                        endpoint: addr.clone(),
                        source,
                    })?;
                stream.set_nodelay(true)?;
                tracing::info!("companion: connected over tcp to {addr}");
                Ok(Self::from_stream(stream, config))
            }
            Link::Serial { path, baud_rate } => {
                let port = tokio_serial::new(&path, baud_rate)
                    .open_native_async()
                    .map_err(|e| TransportError::Connect {
                        endpoint: path.clone(),
                        source: e.into(),
                    })?;
                tracing::info!("companion: opened serial port {path} at {baud_rate} baud");
                Ok(Self::from_stream(port, config))
            }
        }
    }

    /// Wrap an already-open byte stream. Must be called inside a tokio runtime.
    pub fn from_stream<S>(stream: S, config: CompanionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (response_tx, responses) = mpsc::channel(RESPONSE_BUFFER);
        let (raw_rx_tx, _) = broadcast::channel(config.event_buffer);
        let (msg_waiting_tx, _) = broadcast::channel(config.event_buffer);

        let reader = tokio::spawn(read_loop(
            read_half,
            config.max_frame_size,
            response_tx,
            raw_rx_tx.clone(),
            msg_waiting_tx.clone(),
        ));

        Self {
            pipe: Mutex::new(CommandPipe {
                writer: Box::new(write_half),
                responses,
            }),
            raw_rx_tx,
            msg_waiting_tx,
            reader,
            command_timeout: config.command_timeout,
            max_channels: config.max_channels,
            app_name: config.app_name,
        }
    }

    // ── Push subscriptions ──────────────────────────────────────────────

    /// Raw over-the-air packets heard by the radio. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_raw_rx(&self) -> broadcast::Receiver<RawRxEvent> {
        self.raw_rx_tx.subscribe()
    }

    /// Fires whenever the radio has queued messages to sync.
    pub fn subscribe_msg_waiting(&self) -> broadcast::Receiver<()> {
        self.msg_waiting_tx.subscribe()
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Send one command and wait for its reply.
    pub async fn execute(&self, command: Command) -> Result<Response, TransportError> {
        let mut pipe = self.pipe.lock().await;

        // Anything still queued belongs to a command that already timed out.
        while let Ok(stale) = pipe.responses.try_recv() {
            tracing::debug!("companion: dropping stale reply {}", stale.describe());
        }

        write_framed(&mut pipe.writer, &command.to_bytes()).await?;

        match tokio::time::timeout(self.command_timeout, pipe.responses.recv()).await {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(TransportError::Shutdown),
            Err(_) => Err(TransportError::Timeout {
                command: command.name(),
            }),
        }
    }

    /// Announce this application; the radio answers with its identity.
    pub async fn app_start(&self) -> Result<SelfInfo, TransportError> {
        let command = Command::AppStart {
            app_name: self.app_name.clone(),
        };
        match self.execute(command).await? {
            Response::SelfInfo(info) => {
                tracing::info!("companion: radio {:?} ready", info.name);
                Ok(info)
            }
            other => Err(unexpected("AppStart", other)),
        }
    }

    /// Firmware version and channel slot count.
    pub async fn device_info(&self) -> Result<DeviceInfo, TransportError> {
        match self.execute(Command::DeviceQuery).await? {
            Response::DeviceInfo(info) => Ok(info),
            other => Err(unexpected("DeviceQuery", other)),
        }
    }

    /// Read one channel slot. `None` when the radio has no such slot.
    pub async fn get_channel(&self, index: u8) -> Result<Option<Channel>, TransportError> {
        match self.execute(Command::GetChannel { index }).await? {
            Response::ChannelInfo(channel) => Ok(Some(channel)),
            Response::Err { .. } => Ok(None),
            other => Err(unexpected("GetChannel", other)),
        }
    }

    /// Write a channel slot.
    pub async fn set_channel(&self, channel: &Channel) -> Result<(), TransportError> {
        let command = Command::SetChannel {
            index: channel.index,
            name: channel.name.clone(),
            secret: channel.secret,
        };
        expect_ok("SetChannel", self.execute(command).await?)
    }

    /// Every slot the radio reports, empty ones included.
    async fn slots(&self) -> Result<Vec<Channel>, TransportError> {
        let mut slots = Vec::new();
        for index in 0..self.max_channels {
            match self.get_channel(index).await? {
                Some(channel) => slots.push(channel),
                None => break,
            }
        }
        Ok(slots)
    }

    /// Configured channels.
    pub async fn channels(&self) -> Result<Vec<Channel>, TransportError> {
        let mut slots = self.slots().await?;
        slots.retain(|c| !c.is_empty_slot());
        Ok(slots)
    }

    /// Look up a configured channel by exact name.
    pub async fn find_channel_by_name(&self, name: &str) -> Result<Option<Channel>, TransportError> {
        Ok(self.channels().await?.into_iter().find(|c| c.name == name))
    }

    /// Return the named channel, creating it in the first free slot with a
    /// secret derived from the name.
    pub async fn find_or_create_channel(&self, name: &str) -> Result<Channel, TransportError> {
        let slots = self.slots().await?;
        if let Some(existing) = slots.iter().find(|c| c.name == name) {
            tracing::debug!("companion: channel {name:?} found at slot {}", existing.index);
            return Ok(existing.clone());
        }

        let free = slots
            .iter()
            .find(|c| c.is_empty_slot())
            .map(|c| c.index)
            .ok_or_else(|| TransportError::ChannelUnavailable(name.to_string()))?;

        let channel = Channel::from_name(free, name);
        self.set_channel(&channel).await?;
        tracing::info!(
            "companion: created channel {name:?} at slot {free} (hash 0x{:02X})",
            channel.hash()
        );
        Ok(channel)
    }

    /// Broadcast plain text on a channel slot.
    pub async fn send_channel_text(&self, channel_index: u8, text: &str) -> Result<(), TransportError> {
        let command = Command::SendChannelText {
            channel_index,
            timestamp: unix_seconds(),
            text: text.to_string(),
        };
        match self.execute(command).await? {
            Response::Ok | Response::Sent => Ok(()),
            Response::Err { code } => Err(TransportError::Rejected {
                command: "SendChannelText",
                code,
            }),
            other => Err(unexpected("SendChannelText", other)),
        }
    }

    /// Pull the next queued inbound message, `None` when the queue is empty.
    pub async fn sync_next_message(&self) -> Result<Option<InboundMessage>, TransportError> {
        match self.execute(Command::SyncNextMessage).await? {
            Response::Message(message) => Ok(Some(message)),
            Response::NoMoreMessages => Ok(None),
            other => Err(unexpected("SyncNextMessage", other)),
        }
    }
}

impl Drop for CompanionNode {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ── Reader task ─────────────────────────────────────────────────────────

async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    max_frame_size: usize,
    response_tx: mpsc::Sender<Response>,
    raw_rx_tx: broadcast::Sender<RawRxEvent>,
    msg_waiting_tx: broadcast::Sender<()>,
) {
    let mut decoder = FrameDecoder::from_radio(max_frame_size);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::warn!("companion: link closed by radio");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("companion: link read failed: {e}");
                return;
            }
        };
        decoder.push(&buf[..n]);

        while let Some(frame) = decoder.next_frame() {
            let payload = match frame {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::debug!("companion: {e}");
                    continue;
                }
            };
            match Inbound::from_bytes(&payload) {
                Ok(Inbound::Response(response)) => {
                    if response_tx.try_send(response).is_err() {
                        tracing::warn!("companion: reply queue full, dropping reply");
                    }
                }
                Ok(Inbound::Push(Push::LogRxData(event))) => {
                    // No subscribers is normal outside a confirmation window.
                    let _ = raw_rx_tx.send(event);
                }
                Ok(Inbound::Push(Push::MsgWaiting)) => {
                    let _ = msg_waiting_tx.send(());
                }
                Ok(Inbound::Push(Push::Other { code, .. })) => {
                    tracing::trace!("companion: ignoring push 0x{code:02X}");
                }
                Err(e) => tracing::debug!("companion: {e}"),
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn expect_ok(command: &'static str, response: Response) -> Result<(), TransportError> {
    match response {
        Response::Ok => Ok(()),
        Response::Err { code } => Err(TransportError::Rejected { command, code }),
        other => Err(unexpected(command, other)),
    }
}

fn unexpected(command: &'static str, response: Response) -> TransportError {
    TransportError::Unexpected {
        command,
        response: response.describe(),
    }
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
