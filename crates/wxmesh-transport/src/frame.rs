/// Companion link framing.
///
/// Every frame is `start byte | u16 LE length | payload`. The start byte
/// tells the direction: `<` host → radio, `>` radio → host.
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Start byte of frames written by the host.
pub const FRAME_TO_RADIO: u8 = b'<';
/// Start byte of frames written by the radio.
pub const FRAME_FROM_RADIO: u8 = b'>';

const HEADER_LEN: usize = 3;

/// Encode a host → radio frame.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    encode_with_start(FRAME_TO_RADIO, payload)
}

/// Encode a radio → host frame (fake radios in tests).
pub fn encode_radio_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    encode_with_start(FRAME_FROM_RADIO, payload)
}

fn encode_with_start(start: u8, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = u16::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
        size: payload.len(),
        max: u16::MAX as usize,
    })?;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(start);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Write one framed command to the link.
pub(crate) async fn write_framed<W: AsyncWrite + Unpin + ?Sized>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), TransportError> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Incremental frame decoder.
///
/// Feed raw link bytes with [`push`](Self::push), then drain complete
/// payloads with [`next_frame`](Self::next_frame). Bytes that precede a
/// start byte are discarded.
#[derive(Debug)]
pub struct FrameDecoder {
    start: u8,
    max_size: usize,
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Decoder for frames sent by the radio.
    pub fn from_radio(max_size: usize) -> Self {
        Self {
            start: FRAME_FROM_RADIO,
            max_size,
            buf: Vec::new(),
        }
    }

    /// Decoder for frames sent by the host.
    pub fn to_radio(max_size: usize) -> Self {
        Self {
            start: FRAME_TO_RADIO,
            max_size,
            buf: Vec::new(),
        }
    }

    /// Append bytes read from the link.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Next complete frame payload, if one is buffered.
    ///
    /// An oversized length header yields an error once and the decoder
    /// resynchronises on the following start byte.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        loop {
            match self.buf.iter().position(|&b| b == self.start) {
                Some(0) => {}
                Some(skip) => {
                    self.buf.drain(..skip);
                }
                None => {
                    self.buf.clear();
                    return None;
                }
            }

            if self.buf.len() < HEADER_LEN {
                return None;
            }

            let len = u16::from_le_bytes([self.buf[1], self.buf[2]]) as usize;
            if len > self.max_size {
                self.buf.drain(..1);
                return Some(Err(TransportError::FrameTooLarge {
                    size: len,
                    max: self.max_size,
                }));
            }

            if self.buf.len() < HEADER_LEN + len {
                return None;
            }

            let frame: Vec<u8> = self.buf.drain(..HEADER_LEN + len).skip(HEADER_LEN).collect();
            if frame.is_empty() {
                // Zero-length frames carry nothing; keep scanning.
                continue;
            }
            return Some(Ok(frame));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(&[0x03, 0x00, 0x01]).unwrap();
        assert_eq!(frame, vec![b'<', 3, 0, 0x03, 0x00, 0x01]);
    }

    #[test]
    fn test_decode_split_across_reads() {
        let frame = encode_radio_frame(b"hello").unwrap();
        let mut decoder = FrameDecoder::from_radio(64);
        decoder.push(&frame[..2]);
        assert!(decoder.next_frame().is_none());
        decoder.push(&frame[2..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"hello".to_vec());
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_decode_skips_leading_garbage() {
        let mut bytes = vec![0x00, 0xFF, 0x12];
        bytes.extend(encode_radio_frame(&[0x88, 1, 2]).unwrap());
        let mut decoder = FrameDecoder::from_radio(64);
        decoder.push(&bytes);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x88, 1, 2]);
    }

    #[test]
    fn test_decode_two_frames_in_one_read() {
        let mut bytes = encode_radio_frame(&[0x00]).unwrap();
        bytes.extend(encode_radio_frame(&[0x83]).unwrap());
        let mut decoder = FrameDecoder::from_radio(64);
        decoder.push(&bytes);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x00]);
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x83]);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_decode_rejects_oversized_then_resyncs() {
        let mut bytes = vec![b'>', 0xFF, 0x00];
        bytes.extend(encode_radio_frame(&[0x0A]).unwrap());
        let mut decoder = FrameDecoder::from_radio(16);
        decoder.push(&bytes);
        assert!(matches!(
            decoder.next_frame(),
            Some(Err(TransportError::FrameTooLarge { size: 255, max: 16 }))
        ));
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x0A]);
    }

    #[test]
    fn test_direction_is_respected() {
        let mut decoder = FrameDecoder::to_radio(64);
        decoder.push(&encode_radio_frame(&[0x01]).unwrap());
        assert!(decoder.next_frame().is_none());
        decoder.push(&encode_frame(&[0x01]).unwrap());
        assert_eq!(decoder.next_frame().unwrap().unwrap(), vec![0x01]);
    }
}
