/// Over-the-air MeshCore packet decoding.
///
/// Only the envelope is decoded: route, payload type, relay path and the
/// still-encrypted payload. That is enough to recognise a repeater relaying
/// group text for one of our channels.
use crate::error::AlertError;

/// Group text message.
pub const PAYLOAD_TYPE_GRP_TXT: u8 = 0x05;

const ROUTE_MASK: u8 = 0x03;
const PAYLOAD_TYPE_SHIFT: u8 = 2;
const PAYLOAD_TYPE_MASK: u8 = 0x0F;
const VERSION_SHIFT: u8 = 6;
const TRANSPORT_CODES_LEN: usize = 4;

/// Routing mode from the low two header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
    TransportFlood,
    Flood,
    Direct,
    TransportDirect,
}

impl RouteType {
    fn from_bits(bits: u8) -> Self {
        match bits & ROUTE_MASK {
            0 => RouteType::TransportFlood,
            1 => RouteType::Flood,
            2 => RouteType::Direct,
            _ => RouteType::TransportDirect,
        }
    }

    /// Transport-scoped routes carry four transport-code bytes.
    fn has_transport_codes(self) -> bool {
        matches!(self, RouteType::TransportFlood | RouteType::TransportDirect)
    }
}

/// A decoded packet envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshPacket {
    pub route_type: RouteType,
    pub payload_type: u8,
    pub version: u8,
    pub transport_codes: Option<[u8; TRANSPORT_CODES_LEN]>,
    /// One-byte hashes of the nodes that relayed the packet, oldest first.
    pub path: Vec<u8>,
    pub payload: Vec<u8>,
}

impl MeshPacket {
    /// Decode raw bytes as heard by the radio.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, AlertError> {
        let mut pos = 0usize;
        let header = take(raw, &mut pos, 1)?[0];
        let route_type = RouteType::from_bits(header);

        let transport_codes = if route_type.has_transport_codes() {
            let mut codes = [0u8; TRANSPORT_CODES_LEN];
            codes.copy_from_slice(take(raw, &mut pos, TRANSPORT_CODES_LEN)?);
            Some(codes)
        } else {
            None
        };

        let path_len = take(raw, &mut pos, 1)?[0] as usize;
        let path = take(raw, &mut pos, path_len)?.to_vec();

        Ok(Self {
            route_type,
            payload_type: (header >> PAYLOAD_TYPE_SHIFT) & PAYLOAD_TYPE_MASK,
            version: header >> VERSION_SHIFT,
            transport_codes,
            path,
            payload: raw[pos..].to_vec(),
        })
    }

    /// The node that most recently relayed this packet.
    pub fn last_hop(&self) -> Option<u8> {
        self.path.last().copied()
    }

    /// Whether this is group text on the channel with `channel_hash`,
    /// relayed by at least one repeater. Returns the last repeater.
    pub fn relayed_group_text(&self, channel_hash: u8) -> Option<u8> {
        if self.payload_type != PAYLOAD_TYPE_GRP_TXT {
            return None;
        }
        if self.payload.first() != Some(&channel_hash) {
            return None;
        }
        self.last_hop()
    }
}

fn take<'a>(raw: &'a [u8], pos: &mut usize, n: usize) -> Result<&'a [u8], AlertError> {
    let end = *pos + n;
    if end > raw.len() {
        return Err(AlertError::TruncatedPacket {
            needed: end,
            available: raw.len(),
        });
    }
    let slice = &raw[*pos..end];
    *pos = end;
    Ok(slice)
}

/// Build a header byte. Test and tooling helper.
pub fn header_byte(route_type: RouteType, payload_type: u8, version: u8) -> u8 {
    let route = match route_type {
        RouteType::TransportFlood => 0,
        RouteType::Flood => 1,
        RouteType::Direct => 2,
        RouteType::TransportDirect => 3,
    };
    route | ((payload_type & PAYLOAD_TYPE_MASK) << PAYLOAD_TYPE_SHIFT) | (version << VERSION_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flood_grp_txt(path: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut raw = vec![header_byte(RouteType::Flood, PAYLOAD_TYPE_GRP_TXT, 0)];
        raw.push(path.len() as u8);
        raw.extend_from_slice(path);
        raw.extend_from_slice(payload);
        raw
    }

    #[test]
    fn test_header_bits() {
        assert_eq!(header_byte(RouteType::Flood, PAYLOAD_TYPE_GRP_TXT, 0), 0x15);
        let packet = MeshPacket::from_bytes(&[0x15, 0x00, 0xAA]).unwrap();
        assert_eq!(packet.route_type, RouteType::Flood);
        assert_eq!(packet.payload_type, PAYLOAD_TYPE_GRP_TXT);
        assert_eq!(packet.version, 0);
        assert!(packet.path.is_empty());
        assert_eq!(packet.payload, vec![0xAA]);
    }

    #[test]
    fn test_path_and_payload() {
        let raw = flood_grp_txt(&[0x11, 0x22, 0x33], &[0x7E, 0x01, 0x02]);
        let packet = MeshPacket::from_bytes(&raw).unwrap();
        assert_eq!(packet.path, vec![0x11, 0x22, 0x33]);
        assert_eq!(packet.last_hop(), Some(0x33));
        assert_eq!(packet.payload, vec![0x7E, 0x01, 0x02]);
    }

    #[test]
    fn test_transport_codes_are_skipped() {
        let mut raw = vec![header_byte(RouteType::TransportFlood, PAYLOAD_TYPE_GRP_TXT, 1)];
        raw.extend([9, 9, 9, 9]);
        raw.extend([1, 0x44]);
        raw.push(0x7E);
        let packet = MeshPacket::from_bytes(&raw).unwrap();
        assert_eq!(packet.transport_codes, Some([9, 9, 9, 9]));
        assert_eq!(packet.version, 1);
        assert_eq!(packet.path, vec![0x44]);
        assert_eq!(packet.relayed_group_text(0x7E), Some(0x44));
    }

    #[test]
    fn test_truncated_path_is_error() {
        let raw = [0x15, 0x05, 0x01];
        assert!(matches!(
            MeshPacket::from_bytes(&raw),
            Err(AlertError::TruncatedPacket {
                needed: 7,
                available: 3
            })
        ));
        assert!(MeshPacket::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_relay_match_requires_path_type_and_hash() {
        let relayed = MeshPacket::from_bytes(&flood_grp_txt(&[0x42], &[0x7E, 0])).unwrap();
        assert_eq!(relayed.relayed_group_text(0x7E), Some(0x42));
        assert_eq!(relayed.relayed_group_text(0x7F), None);

        let direct = MeshPacket::from_bytes(&flood_grp_txt(&[], &[0x7E, 0])).unwrap();
        assert_eq!(direct.relayed_group_text(0x7E), None);

        let mut other_type = flood_grp_txt(&[0x42], &[0x7E, 0]);
        other_type[0] = header_byte(RouteType::Flood, 0x02, 0);
        let other = MeshPacket::from_bytes(&other_type).unwrap();
        assert_eq!(other.relayed_group_text(0x7E), None);

        let empty_payload = MeshPacket::from_bytes(&flood_grp_txt(&[0x42], &[])).unwrap();
        assert_eq!(empty_payload.relayed_group_text(0x7E), None);
    }
}
