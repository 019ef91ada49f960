//! MeshCore companion radio link.
//!
//! Talks the companion protocol over TCP or a serial port: frame codec,
//! command/response/push payloads, channel slots, and the raw receive log
//! used to observe repeaters relaying our traffic.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use wxmesh_transport::{CompanionConfig, CompanionNode};
//!
//! # async fn example() -> Result<(), wxmesh_transport::TransportError> {
//! let node = CompanionNode::connect(CompanionConfig::serial("/dev/ttyUSB0")).await?;
//! node.app_start().await?;
//!
//! let channel = node.find_or_create_channel("#alerts").await?;
//! let mut heard = node.subscribe_raw_rx();
//! node.send_channel_text(channel.index, "hello mesh").await?;
//!
//! let event = heard.recv().await.expect("radio link open");
//! println!("heard {} bytes at {} dBm", event.raw.len(), event.rssi);
//! # Ok(())
//! # }
//! ```

mod channel;
mod config;
mod error;
mod frame;
mod message;
mod node;

pub use channel::{channel_hash, derive_channel_secret, Channel, CHANNEL_NAME_LEN, CHANNEL_SECRET_LEN};
pub use config::{CompanionConfig, Link};
pub use error::TransportError;
pub use frame::{encode_frame, encode_radio_frame, FrameDecoder, FRAME_FROM_RADIO, FRAME_TO_RADIO};
pub use message::{
    command_code, push_code, response_code, Command, DeviceInfo, Inbound, InboundMessage,
    MessageOrigin, Push, RawRxEvent, Response, SelfInfo,
};
pub use node::CompanionNode;
