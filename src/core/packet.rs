use crate::core::checksum::{crc32, crc8};
use crate::core::constants::{
    CommandNumber, PacketType, CRC32_LEN, DEFAULT_SEQ, HEADER_LEN, MIN_FRAME_BYTES,
    MIN_FRAME_LENGTH, SOF,
};
use crate::error::FrameError;
use bytes::{BufMut, BytesMut};
use std::fmt;

/// Largest payload whose length field still fits in a `u16`.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - CRC32_LEN - 3;

/// A decoded strap packet.
///
/// `seq` is carried through unchanged; nothing in the crate checks it for monotonicity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: u8,
    pub seq: u8,
    pub cmd: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: u8, seq: u8, cmd: u8, payload: Vec<u8>) -> Self {
        Self {
            packet_type,
            seq,
            cmd,
            payload,
        }
    }

    /// Host-to-strap COMMAND packet with the default sequence number.
    pub fn command(cmd: CommandNumber, payload: Vec<u8>) -> Self {
        Self::new(PacketType::Command.code(), DEFAULT_SEQ, cmd.code(), payload)
    }

    /// Classified packet type, or the raw byte if it is not in the table.
    pub fn kind(&self) -> Result<PacketType, u8> {
        PacketType::try_from(self.packet_type)
    }

    /// Unframed `type | seq | cmd | payload` bytes: the CRC32 domain.
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(3 + self.payload.len());
        body.extend_from_slice(&[self.packet_type, self.seq, self.cmd]);
        body.extend_from_slice(&self.payload);
        body
    }

    /// Frame the packet for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = BytesMut::with_capacity(self.frame_len());
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Append the framed packet to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), FrameError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge(self.payload.len()));
        }

        let body = self.body();
        let length = (body.len() + CRC32_LEN) as u16;
        let length_bytes = length.to_le_bytes();

        dst.reserve(self.frame_len());
        dst.put_u8(SOF);
        dst.put_slice(&length_bytes);
        dst.put_u8(crc8(&length_bytes));
        dst.put_slice(&body);
        dst.put_u32_le(crc32(&body));
        Ok(())
    }

    /// Number of bytes [`encode`](Self::encode) produces.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + 3 + self.payload.len() + CRC32_LEN
    }

    /// Decode a single framed packet. Bytes past the trailing CRC32 are ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_FRAME_BYTES {
            return Err(FrameError::ShortFrame(bytes.len()));
        }

        if bytes[0] != SOF {
            return Err(FrameError::BadSof(bytes[0]));
        }

        let calculated = crc8(&bytes[1..3]);
        if calculated != bytes[3] {
            return Err(FrameError::HeaderCrcMismatch {
                expected: bytes[3],
                calculated,
            });
        }

        let length = u16::from_le_bytes([bytes[1], bytes[2]]) as usize;
        // The trailing CRC32 sits at [length, length + 4), so it must be present too.
        if length < MIN_FRAME_LENGTH || length + CRC32_LEN > bytes.len() {
            return Err(FrameError::LengthOutOfRange {
                length,
                available: bytes.len(),
            });
        }

        let body = &bytes[HEADER_LEN..length];
        let expected = u32::from_le_bytes([
            bytes[length],
            bytes[length + 1],
            bytes[length + 2],
            bytes[length + 3],
        ]);
        let calculated = crc32(body);
        if calculated != expected {
            return Err(FrameError::BodyCrcMismatch {
                expected,
                calculated,
            });
        }

        Ok(Self {
            packet_type: body[0],
            seq: body[1],
            cmd: body[2],
            payload: body[3..].to_vec(),
        })
    }

    /// Payload byte at `offset`, if present.
    #[inline]
    pub fn payload_u8(&self, offset: usize) -> Option<u8> {
        self.payload.get(offset).copied()
    }

    /// Little-endian `u16` at `offset` of the payload, if present.
    pub fn payload_u16_le(&self, offset: usize) -> Option<u16> {
        read_u16_le(&self.payload, offset)
    }

    /// Little-endian `u32` at `offset` of the payload, if present.
    pub fn payload_u32_le(&self, offset: usize) -> Option<u32> {
        read_u32_le(&self.payload, offset)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet {{ type: 0x{:02X}, seq: {}, cmd: 0x{:02X}, payload: {} }}",
            self.packet_type,
            self.seq,
            self.cmd,
            packet_to_hex_string(&self.payload)
        )
    }
}

pub(crate) fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Upper-case, space separated hex dump used in logs.
pub fn packet_to_hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
