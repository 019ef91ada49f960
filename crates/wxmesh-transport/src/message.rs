/// Companion protocol payloads: commands we send, responses and pushes we receive.
///
/// Layouts follow the MeshCore companion firmware. Multi-byte integers are
/// little endian; fixed-width strings are NUL padded.
use crate::channel::{Channel, CHANNEL_NAME_LEN, CHANNEL_SECRET_LEN};
use crate::TransportError;

/// Command codes (host → radio).
pub mod command_code {
    pub const APP_START: u8 = 1;
    pub const SEND_CHANNEL_TXT_MSG: u8 = 3;
    pub const SYNC_NEXT_MESSAGE: u8 = 10;
    pub const DEVICE_QUERY: u8 = 22;
    pub const GET_CHANNEL: u8 = 31;
    pub const SET_CHANNEL: u8 = 32;
}

/// Response codes (radio → host, reply to a command).
pub mod response_code {
    pub const OK: u8 = 0;
    pub const ERR: u8 = 1;
    pub const SELF_INFO: u8 = 5;
    pub const SENT: u8 = 6;
    pub const CONTACT_MSG_RECV: u8 = 7;
    pub const CHANNEL_MSG_RECV: u8 = 8;
    pub const NO_MORE_MESSAGES: u8 = 10;
    pub const DEVICE_INFO: u8 = 13;
    pub const CONTACT_MSG_RECV_V3: u8 = 16;
    pub const CHANNEL_MSG_RECV_V3: u8 = 17;
    pub const CHANNEL_INFO: u8 = 18;
}

/// Push codes (radio → host, unsolicited). Always ≥ 0x80.
pub mod push_code {
    pub const MSG_WAITING: u8 = 0x83;
    pub const LOG_RX_DATA: u8 = 0x88;
}

/// Plain text message type.
const TXT_TYPE_PLAIN: u8 = 0;
/// Signed text carries a 4-byte signer prefix before the text.
const TXT_TYPE_SIGNED_PLAIN: u8 = 2;

const APP_PROTOCOL_VERSION: u8 = 1;
const DEVICE_QUERY_VERSION: u8 = 3;

// ── Commands ───────────────────────────────────────────────────────────

/// A command the host sends to the companion radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AppStart {
        app_name: String,
    },
    SendChannelText {
        channel_index: u8,
        timestamp: u32,
        text: String,
    },
    SyncNextMessage,
    DeviceQuery,
    GetChannel {
        index: u8,
    },
    SetChannel {
        index: u8,
        name: String,
        secret: [u8; CHANNEL_SECRET_LEN],
    },
}

impl Command {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::AppStart { .. } => "AppStart",
            Command::SendChannelText { .. } => "SendChannelText",
            Command::SyncNextMessage => "SyncNextMessage",
            Command::DeviceQuery => "DeviceQuery",
            Command::GetChannel { .. } => "GetChannel",
            Command::SetChannel { .. } => "SetChannel",
        }
    }

    /// Serialize to a frame payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Command::AppStart { app_name } => {
                out.push(command_code::APP_START);
                out.push(APP_PROTOCOL_VERSION);
                out.extend_from_slice(&[0u8; 6]);
                out.extend_from_slice(app_name.as_bytes());
            }
            Command::SendChannelText {
                channel_index,
                timestamp,
                text,
            } => {
                out.push(command_code::SEND_CHANNEL_TXT_MSG);
                out.push(TXT_TYPE_PLAIN);
                out.push(*channel_index);
                out.extend_from_slice(&timestamp.to_le_bytes());
                out.extend_from_slice(text.as_bytes());
            }
            Command::SyncNextMessage => out.push(command_code::SYNC_NEXT_MESSAGE),
            Command::DeviceQuery => {
                out.push(command_code::DEVICE_QUERY);
                out.push(DEVICE_QUERY_VERSION);
            }
            Command::GetChannel { index } => {
                out.push(command_code::GET_CHANNEL);
                out.push(*index);
            }
            Command::SetChannel {
                index,
                name,
                secret,
            } => {
                out.push(command_code::SET_CHANNEL);
                out.push(*index);
                out.extend_from_slice(&fixed_str(name, CHANNEL_NAME_LEN));
                out.extend_from_slice(secret);
            }
        }
        out
    }

    /// Parse a frame payload written by the host (used by fake radios).
    pub fn from_bytes(data: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader::new("command", data);
        let code = r.u8()?;
        let cmd = match code {
            command_code::APP_START => {
                r.u8()?;
                r.bytes(6)?;
                Command::AppStart {
                    app_name: String::from_utf8_lossy(r.rest()).into_owned(),
                }
            }
            command_code::SEND_CHANNEL_TXT_MSG => {
                r.u8()?;
                let channel_index = r.u8()?;
                let timestamp = r.u32()?;
                Command::SendChannelText {
                    channel_index,
                    timestamp,
                    text: String::from_utf8_lossy(r.rest()).into_owned(),
                }
            }
            command_code::SYNC_NEXT_MESSAGE => Command::SyncNextMessage,
            command_code::DEVICE_QUERY => Command::DeviceQuery,
            command_code::GET_CHANNEL => Command::GetChannel { index: r.u8()? },
            command_code::SET_CHANNEL => {
                let index = r.u8()?;
                let name = read_fixed_str(r.bytes(CHANNEL_NAME_LEN)?);
                let secret = r.array::<CHANNEL_SECRET_LEN>()?;
                Command::SetChannel {
                    index,
                    name,
                    secret,
                }
            }
            other => {
                return Err(TransportError::malformed(
                    "command",
                    format!("unknown code {other}"),
                ))
            }
        };
        Ok(cmd)
    }
}

// ── Inbound ────────────────────────────────────────────────────────────

/// Identity the radio reports after `AppStart`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfInfo {
    pub public_key: [u8; 32],
    pub name: String,
}

/// Firmware details from `DeviceQuery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub firmware_version: u8,
    /// Channel slot count, reported by firmware v3 and newer.
    pub max_channels: Option<u8>,
}

/// Where an inbound text message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Direct message; first six bytes of the sender's public key.
    Contact { pubkey_prefix: [u8; 6] },
    /// Group message on a channel slot.
    Channel { index: u8 },
}

/// A text message pulled with `SyncNextMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub origin: MessageOrigin,
    /// Hop count, 0xFF for direct-routed.
    pub path_len: u8,
    pub sender_timestamp: u32,
    pub text: String,
}

/// A raw over-the-air packet the radio heard (`LogRxData`).
#[derive(Debug, Clone, PartialEq)]
pub struct RawRxEvent {
    pub snr: f32,
    pub rssi: i8,
    pub raw: Vec<u8>,
}

/// Reply to a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Err { code: Option<u8> },
    SelfInfo(SelfInfo),
    Sent,
    Message(InboundMessage),
    NoMoreMessages,
    DeviceInfo(DeviceInfo),
    ChannelInfo(Channel),
    Unknown { code: u8, data: Vec<u8> },
}

/// Unsolicited event.
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    MsgWaiting,
    LogRxData(RawRxEvent),
    Other { code: u8, data: Vec<u8> },
}

/// Any frame received from the radio.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(Response),
    Push(Push),
}

impl Inbound {
    /// Parse a radio → host frame payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, TransportError> {
        let Some(&code) = data.first() else {
            return Err(TransportError::malformed("frame", "empty payload"));
        };
        if code >= 0x80 {
            Push::from_bytes(data).map(Inbound::Push)
        } else {
            Response::from_bytes(data).map(Inbound::Response)
        }
    }
}

impl Push {
    fn from_bytes(data: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader::new("push", data);
        let code = r.u8()?;
        let push = match code {
            push_code::MSG_WAITING => Push::MsgWaiting,
            push_code::LOG_RX_DATA => {
                let snr = r.u8()? as i8 as f32 / 4.0;
                let rssi = r.u8()? as i8;
                Push::LogRxData(RawRxEvent {
                    snr,
                    rssi,
                    raw: r.rest().to_vec(),
                })
            }
            _ => Push::Other {
                code,
                data: r.rest().to_vec(),
            },
        };
        Ok(push)
    }
}

impl Response {
    fn from_bytes(data: &[u8]) -> Result<Self, TransportError> {
        let mut r = Reader::new("response", data);
        let code = r.u8()?;
        let response = match code {
            response_code::OK => Response::Ok,
            response_code::ERR => Response::Err {
                code: r.rest().first().copied(),
            },
            response_code::SELF_INFO => {
                // adv_type, tx_power, max_tx_power
                r.bytes(3)?;
                let public_key = r.array::<32>()?;
                // lat, lon, multi_acks, advert policy, telemetry, manual add,
                // frequency, bandwidth, spreading factor, coding rate
                let name = match r.bytes(4 + 4 + 4 + 4 + 4 + 2) {
                    Ok(_) => String::from_utf8_lossy(r.rest()).trim_end_matches('\0').to_string(),
                    Err(_) => String::new(),
                };
                Response::SelfInfo(SelfInfo { public_key, name })
            }
            response_code::SENT => Response::Sent,
            response_code::CONTACT_MSG_RECV | response_code::CONTACT_MSG_RECV_V3 => {
                if code == response_code::CONTACT_MSG_RECV_V3 {
                    // snr, reserved x2
                    r.bytes(3)?;
                }
                let pubkey_prefix = r.array::<6>()?;
                let path_len = r.u8()?;
                let txt_type = r.u8()?;
                let sender_timestamp = r.u32()?;
                if txt_type == TXT_TYPE_SIGNED_PLAIN {
                    r.bytes(4)?;
                }
                Response::Message(InboundMessage {
                    origin: MessageOrigin::Contact { pubkey_prefix },
                    path_len,
                    sender_timestamp,
                    text: String::from_utf8_lossy(r.rest()).into_owned(),
                })
            }
            response_code::CHANNEL_MSG_RECV | response_code::CHANNEL_MSG_RECV_V3 => {
                if code == response_code::CHANNEL_MSG_RECV_V3 {
                    r.bytes(3)?;
                }
                let index = r.u8()?;
                let path_len = r.u8()?;
                let _txt_type = r.u8()?;
                let sender_timestamp = r.u32()?;
                Response::Message(InboundMessage {
                    origin: MessageOrigin::Channel { index },
                    path_len,
                    sender_timestamp,
                    text: String::from_utf8_lossy(r.rest()).into_owned(),
                })
            }
            response_code::NO_MORE_MESSAGES => Response::NoMoreMessages,
            response_code::DEVICE_INFO => {
                let firmware_version = r.u8()?;
                let max_channels = if firmware_version >= 3 {
                    // max_contacts / 2, then channel slots
                    r.u8().ok().and_then(|_| r.u8().ok())
                } else {
                    None
                };
                Response::DeviceInfo(DeviceInfo {
                    firmware_version,
                    max_channels,
                })
            }
            response_code::CHANNEL_INFO => {
                let index = r.u8()?;
                let name = read_fixed_str(r.bytes(CHANNEL_NAME_LEN)?);
                let secret = r.array::<CHANNEL_SECRET_LEN>()?;
                Response::ChannelInfo(Channel {
                    name,
                    index,
                    secret,
                })
            }
            _ => Response::Unknown {
                code,
                data: r.rest().to_vec(),
            },
        };
        Ok(response)
    }

    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Response::Unknown { code, .. } => format!("unknown response code {code}"),
            other => format!("{other:?}"),
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

fn fixed_str(s: &str, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let bytes = s.as_bytes();
    // Leave room for the terminating NUL.
    let n = bytes.len().min(width - 1);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn read_fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Bounds-checked cursor over a payload.
struct Reader<'a> {
    what: &'static str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(what: &'static str, data: &'a [u8]) -> Self {
        Self { what, data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], TransportError> {
        let end = self.pos + n;
        if end > self.data.len() {
            return Err(TransportError::malformed(
                self.what,
                format!("need {end} bytes, have {}", self.data.len()),
            ));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], TransportError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, TransportError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, TransportError> {
        Ok(u32::from_le_bytes(self.array::<4>()?))
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }
}
