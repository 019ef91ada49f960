/// Channel identity.
///
/// A MeshCore group channel is a slot on the companion radio holding a name
/// and a 16-byte shared secret. Every group-text packet on air starts with a
/// one-byte fingerprint of that secret, which is how relayed traffic is
/// matched back to a channel.
use std::fmt;

use sha2::{Digest, Sha256};

/// Length of a channel secret as stored by the companion radio.
pub const CHANNEL_SECRET_LEN: usize = 16;

/// Length of the channel name field in channel commands.
pub const CHANNEL_NAME_LEN: usize = 32;

/// A configured channel slot on the radio.
#[derive(Clone, PartialEq, Eq)]
pub struct Channel {
    pub name: String,
    pub index: u8,
    pub secret: [u8; CHANNEL_SECRET_LEN],
}

impl Channel {
    /// Build a channel whose secret is derived from its name.
    pub fn from_name(index: u8, name: &str) -> Self {
        Self {
            name: name.to_string(),
            index,
            secret: derive_channel_secret(name),
        }
    }

    /// One-byte fingerprint carried by every group-text packet of this channel.
    pub fn hash(&self) -> u8 {
        channel_hash(&self.secret)
    }

    /// An unused slot: no name and an all-zero secret.
    pub fn is_empty_slot(&self) -> bool {
        self.name.is_empty() && self.secret.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("hash", &format_args!("0x{:02X}", self.hash()))
            .finish()
    }
}

/// First byte of SHA-256 over the channel secret.
pub fn channel_hash(secret: &[u8]) -> u8 {
    Sha256::digest(secret)[0]
}

/// Secret for a hashtag channel: first 16 bytes of SHA-256 over its name.
pub fn derive_channel_secret(name: &str) -> [u8; CHANNEL_SECRET_LEN] {
    let digest = Sha256::digest(name.as_bytes());
    let mut secret = [0u8; CHANNEL_SECRET_LEN];
    secret.copy_from_slice(&digest[..CHANNEL_SECRET_LEN]);
    secret
}
