use proptest::prelude::*;
use wxmesh_transport::{
    channel_hash, derive_channel_secret, encode_radio_frame, Channel, FrameDecoder,
    FRAME_FROM_RADIO,
};

const MAX_FRAME: usize = 512;

fn arb_payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 1..=MAX_FRAME), 1..6)
}

fn arb_garbage() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>().prop_filter("not a start byte", |b| *b != FRAME_FROM_RADIO), 0..16)
}

proptest! {
    /// Frames survive any read fragmentation and leading line noise.
    #[test]
    fn decode_any_fragmentation(
        payloads in arb_payloads(),
        garbage in arb_garbage(),
        read_size in 1..64usize,
    ) {
        let mut stream = garbage;
        for payload in &payloads {
            stream.extend(encode_radio_frame(payload).unwrap());
        }

        let mut decoder = FrameDecoder::from_radio(MAX_FRAME);
        let mut decoded = Vec::new();
        for piece in stream.chunks(read_size) {
            decoder.push(piece);
            while let Some(frame) = decoder.next_frame() {
                decoded.push(frame.unwrap());
            }
        }

        prop_assert_eq!(decoded, payloads);
    }

    /// Oversized frames are rejected without losing the next good frame.
    #[test]
    fn oversized_frame_resyncs(payload in prop::collection::vec(any::<u8>(), 1..64)) {
        let mut decoder = FrameDecoder::from_radio(MAX_FRAME);
        decoder.push(&[FRAME_FROM_RADIO, 0xFF, 0xFF]);
        decoder.push(&encode_radio_frame(&payload).unwrap());

        prop_assert!(decoder.next_frame().unwrap().is_err());
        prop_assert_eq!(decoder.next_frame().unwrap().unwrap(), payload);
    }

    /// A channel's hash depends only on its name.
    #[test]
    fn channel_hash_is_deterministic(name in "#[a-z0-9-]{1,20}", a in any::<u8>(), b in any::<u8>()) {
        let left = Channel::from_name(a, &name);
        let right = Channel::from_name(b, &name);
        prop_assert_eq!(left.secret, derive_channel_secret(&name));
        prop_assert_eq!(left.hash(), right.hash());
        prop_assert_eq!(left.hash(), channel_hash(&derive_channel_secret(&name)));
    }
}
