//! Frame encoding/decoding utilities.
//!
//! HCOM packets travel over a byte stream where `0x00` marks the end of every
//! frame. Packet bytes are COBS-stuffed before transmission so the delimiter
//! never appears inside a frame:
//!
//! ```text
//! +------+----------------+------+----------------+-----+------+
//! | code | code-1 bytes   | code | code-1 bytes   | ... | 0x00 |
//! +------+----------------+------+----------------+-----+------+
//! ```
//!
//! Each code byte gives the distance to the next code byte. A code below
//! `0xFF` stands for a zero in the original data; `0xFF` marks a full
//! 254-byte run with no zero after it. A frame made of the delimiter alone is
//! a keep-alive a blocked sender uses to check for a live reader.

use bytes::{Buf, Bytes, BytesMut};
use tracing::warn;

use crate::constants::*;
use crate::error::*;

/// Longest run of non-zero bytes a single COBS block can hold.
const MAX_BLOCK: u8 = 0xFF;

/// One unit pulled off the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A lone delimiter; carries no packet.
    KeepAlive,
    /// A decoded packet.
    Packet(Bytes),
    /// A frame that could not be decoded. It has already been discarded.
    Corrupt(ProtocolError),
}

/// COBS-encode `input`. The result never contains [`FRAME_DELIMITER`] and
/// does not include the trailing delimiter.
pub fn cobs_encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 254 + 2);
    let mut code_index = 0;
    let mut code: u8 = 1;
    out.push(0);

    for &byte in input {
        if byte == FRAME_DELIMITER {
            out[code_index] = code;
            code_index = out.len();
            out.push(0);
            code = 1;
            continue;
        }
        out.push(byte);
        code += 1;
        if code == MAX_BLOCK {
            out[code_index] = code;
            code_index = out.len();
            out.push(0);
            code = 1;
        }
    }
    out[code_index] = code;
    out
}

/// Reverse [`cobs_encode`]. `input` must not include the trailing delimiter.
pub fn cobs_decode(input: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let code = input[i];
        if code == FRAME_DELIMITER {
            return Err(ProtocolError::UnexpectedDelimiter(i));
        }
        let block = code as usize - 1;
        let start = i + 1;
        let end = start + block;
        if end > input.len() {
            return Err(ProtocolError::CorruptFrame {
                offset: i,
                block,
                len: input.len(),
            });
        }
        if let Some(pos) = input[start..end].iter().position(|&b| b == FRAME_DELIMITER) {
            return Err(ProtocolError::UnexpectedDelimiter(start + pos));
        }
        out.extend_from_slice(&input[start..end]);
        i = end;
        if code != MAX_BLOCK && i < input.len() {
            out.push(FRAME_DELIMITER);
        }
    }

    Ok(out)
}

/// Encode a packet for transmission: COBS bytes followed by the delimiter.
pub fn encode_frame(packet: &[u8]) -> Vec<u8> {
    let mut frame = cobs_encode(packet);
    frame.push(FRAME_DELIMITER);
    frame
}

/// Decode a single frame. A trailing delimiter, if present, is ignored; a
/// frame that is empty once the delimiter is removed is a keep-alive.
pub fn decode_frame(frame: &[u8]) -> ProtocolResult<FrameEvent> {
    let body = match frame.split_last() {
        Some((&FRAME_DELIMITER, rest)) => rest,
        _ => frame,
    };
    if body.is_empty() {
        return Ok(FrameEvent::KeepAlive);
    }
    let decoded = cobs_decode(body)?;
    if decoded.len() > MAX_PACKET_SIZE {
        return Err(ProtocolError::PacketTooLong {
            max: MAX_PACKET_SIZE,
            actual: decoded.len(),
        });
    }
    Ok(FrameEvent::Packet(Bytes::from(decoded)))
}

/// Accumulates bytes read off the transport and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_ENCODED_FRAME_SIZE),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pull the next frame out of the buffer.
    ///
    /// Returns `None` when no delimiter has arrived yet. If the buffer grows
    /// past the largest possible frame without a delimiter, its contents are
    /// dropped and reported as corrupt so the stream can resynchronise.
    pub fn next_frame(&mut self) -> Option<FrameEvent> {
        let Some(end) = self.buffer.iter().position(|&b| b == FRAME_DELIMITER) else {
            if self.buffer.len() > MAX_ENCODED_FRAME_SIZE {
                let actual = self.buffer.len();
                warn!(actual, "discarding undelimited bytes");
                self.buffer.clear();
                return Some(FrameEvent::Corrupt(ProtocolError::PacketTooLong {
                    max: MAX_ENCODED_FRAME_SIZE,
                    actual,
                }));
            }
            return None;
        };

        let frame = self.buffer.split_to(end);
        self.buffer.advance(1);

        Some(match decode_frame(&frame) {
            Ok(event) => event,
            Err(err) => FrameEvent::Corrupt(err),
        })
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8]) {
        let encoded = cobs_encode(data);
        assert!(!encoded.contains(&FRAME_DELIMITER), "encoded {:?}", data);
        assert_eq!(cobs_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_cobs_known_vectors() {
        assert_eq!(cobs_encode(&[]), vec![0x01]);
        assert_eq!(cobs_encode(&[0x00]), vec![0x01, 0x01]);
        assert_eq!(cobs_encode(&[0x00, 0x00]), vec![0x01, 0x01, 0x01]);
        assert_eq!(
            cobs_encode(&[0x11, 0x22, 0x00, 0x33]),
            vec![0x03, 0x11, 0x22, 0x02, 0x33]
        );
        assert_eq!(cobs_encode(&[0x11, 0x00]), vec![0x02, 0x11, 0x01]);
    }

    #[test]
    fn test_cobs_roundtrip_edge_lengths() {
        roundtrip(&[]);
        roundtrip(&[0x00]);
        roundtrip(&[0x00, 0x00, 0x00]);
        roundtrip(b"no zero bytes here");

        // Runs around the 254-byte block boundary, with and without zeros.
        for len in [253usize, 254, 255, 508, 509] {
            let run: Vec<u8> = (0..len).map(|i| (i % 255 + 1) as u8).collect();
            roundtrip(&run);
            let mut with_zero = run.clone();
            with_zero.push(0x00);
            roundtrip(&with_zero);
        }

        let packet: Vec<u8> = (0..MAX_PACKET_SIZE).map(|i| (i % 7) as u8).collect();
        roundtrip(&packet);
    }

    #[test]
    fn test_cobs_decode_rejects_overrun() {
        let err = cobs_decode(&[0x05, 0x11, 0x22]).unwrap_err();
        assert!(matches!(err, ProtocolError::CorruptFrame { offset: 0, block: 4, len: 3 }));
    }

    #[test]
    fn test_cobs_decode_rejects_embedded_delimiter() {
        let err = cobs_decode(&[0x03, 0x11, 0x00]).unwrap_err();
        assert_eq!(err, ProtocolError::UnexpectedDelimiter(2));
    }

    #[test]
    fn test_lone_delimiter_is_keep_alive() {
        assert_eq!(decode_frame(&[FRAME_DELIMITER]).unwrap(), FrameEvent::KeepAlive);
        assert_eq!(decode_frame(&[]).unwrap(), FrameEvent::KeepAlive);

        let mut codec = FrameCodec::new();
        codec.push(&[FRAME_DELIMITER]);
        assert_eq!(codec.next_frame(), Some(FrameEvent::KeepAlive));
        assert_eq!(codec.next_frame(), None);
    }

    #[test]
    fn test_frame_codec_partial() {
        let mut codec = FrameCodec::new();
        let frame = encode_frame(b"Test\x00data");

        codec.push(&frame[..4]);
        assert!(codec.next_frame().is_none());

        codec.push(&frame[4..]);
        assert_eq!(
            codec.next_frame(),
            Some(FrameEvent::Packet(Bytes::from_static(b"Test\x00data")))
        );
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_frame_codec_multiple() {
        let mut codec = FrameCodec::new();

        let mut stream = encode_frame(b"First");
        stream.push(FRAME_DELIMITER);
        stream.extend(encode_frame(b"Second"));
        codec.push(&stream);

        assert_eq!(codec.next_frame(), Some(FrameEvent::Packet(Bytes::from_static(b"First"))));
        assert_eq!(codec.next_frame(), Some(FrameEvent::KeepAlive));
        assert_eq!(codec.next_frame(), Some(FrameEvent::Packet(Bytes::from_static(b"Second"))));
        assert!(codec.next_frame().is_none());
    }

    #[test]
    fn test_frame_codec_reports_corrupt_and_continues() {
        let mut codec = FrameCodec::new();
        codec.push(&[0x09, 0x01, FRAME_DELIMITER]);
        codec.push(&encode_frame(b"ok"));

        assert!(matches!(codec.next_frame(), Some(FrameEvent::Corrupt(_))));
        assert_eq!(codec.next_frame(), Some(FrameEvent::Packet(Bytes::from_static(b"ok"))));
    }

    #[test]
    fn test_frame_codec_discards_runaway_buffer() {
        let mut codec = FrameCodec::new();
        codec.push(&vec![0x42; MAX_ENCODED_FRAME_SIZE + 1]);

        assert!(matches!(
            codec.next_frame(),
            Some(FrameEvent::Corrupt(ProtocolError::PacketTooLong { .. }))
        ));
        assert_eq!(codec.buffered_len(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn packet_strategy() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(any::<u8>(), 0..=MAX_PACKET_SIZE)
        }

        // Zero-heavy payloads hit the short-block paths far more often.
        fn sparse_packet_strategy() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(prop_oneof![Just(0u8), any::<u8>()], 0..=1024)
        }

        proptest! {
            /// Property: COBS never emits the delimiter and always decodes back
            #[test]
            fn prop_cobs_roundtrip(data in packet_strategy()) {
                let encoded = cobs_encode(&data);
                prop_assert!(!encoded.contains(&FRAME_DELIMITER));
                prop_assert_eq!(cobs_decode(&encoded).unwrap(), data);
            }

            #[test]
            fn prop_cobs_roundtrip_sparse(data in sparse_packet_strategy()) {
                prop_assert_eq!(cobs_decode(&cobs_encode(&data)).unwrap(), data);
            }

            /// Property: a framed packet split anywhere comes out of the codec whole
            #[test]
            fn prop_codec_reassembles_split_frame(
                data in packet_strategy(),
                split_ratio in 0.0f64..1.0,
            ) {
                let frame = encode_frame(&data);
                let split = ((frame.len() as f64) * split_ratio) as usize;

                let mut codec = FrameCodec::new();
                codec.push(&frame[..split]);
                if split < frame.len() {
                    prop_assert!(codec.next_frame().is_none());
                }
                codec.push(&frame[split..]);

                prop_assert_eq!(codec.next_frame(), Some(FrameEvent::Packet(Bytes::from(data))));
                prop_assert!(codec.next_frame().is_none());
                prop_assert_eq!(codec.buffered_len(), 0);
            }
        }
    }
}
