use crate::core::checksum::crc8;
use crate::core::constants::{CRC32_LEN, HEADER_LEN, MIN_FRAME_LENGTH, SOF};
use crate::core::packet::Packet;
use crate::error::ProtocolError;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Splits a concatenated byte stream into packets.
///
/// BLE notifications arrive one frame at a time and go straight to [`Packet::decode`].
/// This codec is for streams where frames sit back to back, such as the historical
/// dump file. Garbage before a start-of-frame byte or a header with a bad CRC8 is skipped
/// one byte at a time; frames whose body CRC32 fails are dropped whole and counted.
#[derive(Debug, Default)]
pub struct FrameCodec {
    resync_bytes: u64,
    corrupt_frames: u64,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes discarded while searching for a valid header.
    pub fn resync_bytes(&self) -> u64 {
        self.resync_bytes
    }

    /// Frames with a valid header that failed to decode.
    pub fn corrupt_frames(&self) -> u64 {
        self.corrupt_frames
    }

    fn skip(&mut self, src: &mut BytesMut, count: usize) {
        src.advance(count);
        self.resync_bytes += count as u64;
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match src.iter().position(|&b| b == SOF) {
                Some(start) => self.skip(src, start),
                None => {
                    let len = src.len();
                    self.skip(src, len);
                    return Ok(None);
                }
            }

            if src.len() < HEADER_LEN {
                return Ok(None);
            }

            if crc8(&src[1..3]) != src[3] {
                self.skip(src, 1);
                continue;
            }

            let length = u16::from_le_bytes([src[1], src[2]]) as usize;
            if length < MIN_FRAME_LENGTH {
                self.skip(src, 1);
                continue;
            }

            let total = length + CRC32_LEN;
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            let frame = src.split_to(total);
            match Packet::decode(&frame) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => {
                    self.corrupt_frames += 1;
                    warn!(error = %e, length, "Dropping corrupt frame");
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A header still waiting for bytes at end of stream is a false or truncated frame.
        // Step past its SOF and rescan so frames behind it are not lost.
        while !src.is_empty() {
            if let Some(packet) = self.decode(src)? {
                return Ok(Some(packet));
            }
            if !src.is_empty() {
                debug!(bytes = src.len(), "Skipping unterminated header at end of stream");
                self.skip(src, 1);
            }
        }
        Ok(None)
    }
}

impl Encoder<Packet> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        packet.encode_into(dst)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn frame(cmd: u8, payload: &[u8]) -> Vec<u8> {
        Packet::new(0x2F, 0, cmd, payload.to_vec()).encode().unwrap()
    }

    #[test]
    fn splits_back_to_back_frames() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame(1, &[1, 2, 3]));
        buf.extend_from_slice(&frame(2, &[4, 5]));

        let mut codec = FrameCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().cmd, 1);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().cmd, 2);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_partial_frame() {
        let bytes = frame(7, &[9; 20]);
        let mut buf = BytesMut::from(&bytes[..10]);
        let mut codec = FrameCodec::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 10);

        buf.extend_from_slice(&bytes[10..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().payload, vec![9; 20]);
    }

    #[test]
    fn resyncs_after_garbage() {
        let mut buf = BytesMut::from(&[0x00, 0xAA, 0x13, 0x37][..]);
        buf.extend_from_slice(&frame(3, &[1]));

        let mut codec = FrameCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().cmd, 3);
        assert_eq!(codec.resync_bytes(), 4);
    }

    #[test]
    fn drops_frame_with_bad_body_crc() {
        let mut bad = frame(4, &[1, 2, 3]);
        bad[6] ^= 0x01;
        let mut buf = BytesMut::from(&bad[..]);
        buf.extend_from_slice(&frame(5, &[1]));

        let mut codec = FrameCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().cmd, 5);
        assert_eq!(codec.corrupt_frames(), 1);
    }

    #[test]
    fn eof_discards_truncated_tail() {
        let bytes = frame(6, &[1, 2, 3]);
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 2]);
        let mut codec = FrameCodec::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}
