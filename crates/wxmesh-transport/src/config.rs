use std::time::Duration;

/// Physical link to the companion radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// USB/UART companion (`/dev/ttyUSB0`, `/dev/cu.usbmodem1101`, ...).
    Serial { path: String, baud_rate: u32 },
    /// WiFi companion listening on `host:port`.
    Tcp { addr: String },
}

/// Configuration for a [`CompanionNode`](crate::CompanionNode).
///
/// All fields except the link have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use wxmesh_transport::CompanionConfig;
///
/// let config = CompanionConfig::tcp("192.168.0.1:5000")
///     .max_channels(16)
///     .app_name("wxmesh");
/// ```
#[derive(Debug, Clone)]
pub struct CompanionConfig {
    pub(crate) link: Link,
    /// How long to wait for the radio to answer a command.
    pub(crate) command_timeout: Duration,
    /// Largest inbound frame payload accepted from the radio.
    pub(crate) max_frame_size: usize,
    /// Number of channel slots probed when enumerating channels.
    pub(crate) max_channels: u8,
    /// Broadcast buffer for push events (raw RX log, message waiting).
    pub(crate) event_buffer: usize,
    /// Name announced in `AppStart`.
    pub(crate) app_name: String,
}

impl CompanionConfig {
    /// Companion attached over a serial port at 115200 baud.
    pub fn serial(path: impl Into<String>) -> Self {
        Self::with_link(Link::Serial {
            path: path.into(),
            baud_rate: 115_200,
        })
    }

    /// Companion reachable over TCP.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::with_link(Link::Tcp { addr: addr.into() })
    }

    fn with_link(link: Link) -> Self {
        Self {
            link,
            command_timeout: Duration::from_secs(5),
            max_frame_size: 512,
            max_channels: 8,
            event_buffer: 256,
            app_name: "wxmesh".to_string(),
        }
    }

    /// Override the serial baud rate. No effect on TCP links.
    pub fn baud_rate(mut self, baud: u32) -> Self {
        if let Link::Serial { baud_rate, .. } = &mut self.link {
            *baud_rate = baud;
        }
        self
    }

    /// Set the per-command response timeout (default: 5 s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the maximum inbound frame size (default: 512 bytes).
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Set how many channel slots are probed (default: 8).
    pub fn max_channels(mut self, slots: u8) -> Self {
        self.max_channels = slots;
        self
    }

    /// Set the push event broadcast buffer (default: 256).
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Set the application name sent with `AppStart`.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// The configured link.
    pub fn link(&self) -> &Link {
        &self.link
    }
}
