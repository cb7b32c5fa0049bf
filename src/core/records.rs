//! Decoders for the record layouts seen in metadata and heart-rate packets.
//!
//! These layouts come from capture analysis, not firmware documentation.

use crate::core::packet::{read_u16_le, read_u32_le};

/// Size of a metadata record at the start of a METADATA payload.
pub const METADATA_RECORD_LEN: usize = 14;

/// Offset of the trim value inside a METADATA payload.
pub const TRIM_OFFSET: usize = 10;

/// `unix u32 | subsec u16 | unknown u32 | trim u32`, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataRecord {
    pub unix: u32,
    pub subsecond: u16,
    pub unknown: u32,
    pub trim: u32,
}

impl MetadataRecord {
    /// Parse from a METADATA packet payload. Returns `None` if shorter than 14 bytes.
    pub fn parse(payload: &[u8]) -> Option<Self> {
        Some(Self {
            unix: read_u32_le(payload, 0)?,
            subsecond: read_u16_le(payload, 4)?,
            unknown: read_u32_le(payload, 6)?,
            trim: read_u32_le(payload, TRIM_OFFSET)?,
        })
    }
}

/// Heart-rate sample carried in realtime and historical packets.
///
/// Parsed from the packet *body* (`type | seq | cmd | payload`): bytes `[4, 15)` hold
/// `unix u32 | subsec u16 | unknown u32 | heart_rate u8`, byte 15 the RR-interval count
/// and the RR intervals follow as little-endian `u16` milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartRateRecord {
    pub unix: u32,
    pub subsecond: u16,
    pub heart_rate: u8,
    pub rr_intervals: Vec<u16>,
}

impl HeartRateRecord {
    pub fn parse(body: &[u8]) -> Option<Self> {
        let unix = read_u32_le(body, 4)?;
        let subsecond = read_u16_le(body, 8)?;
        let heart_rate = *body.get(14)?;

        let mut rr_intervals = Vec::new();
        if let Some(&count) = body.get(15) {
            let count = count as usize;
            if count > 0 && body.len() >= 16 + count * 2 {
                rr_intervals = (0..count)
                    .filter_map(|i| read_u16_le(body, 16 + i * 2))
                    .collect();
            }
        }

        Some(Self {
            unix,
            subsecond,
            heart_rate,
            rr_intervals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_trim_is_at_offset_ten() {
        let mut payload = vec![0u8; 14];
        payload[0..4].copy_from_slice(&1_700_000_000u32.to_le_bytes());
        payload[4..6].copy_from_slice(&512u16.to_le_bytes());
        payload[10..14].copy_from_slice(&1000u32.to_le_bytes());

        let record = MetadataRecord::parse(&payload).expect("14 bytes");
        assert_eq!(record.unix, 1_700_000_000);
        assert_eq!(record.subsecond, 512);
        assert_eq!(record.trim, 1000);
    }

    #[test]
    fn metadata_requires_fourteen_bytes() {
        assert_eq!(MetadataRecord::parse(&[0u8; 13]), None);
    }

    #[test]
    fn heart_rate_with_rr_intervals() {
        let mut body = vec![0x2F, 0, 0];
        body.push(0); // leading payload byte
        body.extend_from_slice(&1_700_000_123u32.to_le_bytes());
        body.extend_from_slice(&7u16.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(64);
        body.push(2);
        body.extend_from_slice(&812u16.to_le_bytes());
        body.extend_from_slice(&790u16.to_le_bytes());

        let record = HeartRateRecord::parse(&body).expect("long enough");
        assert_eq!(record.unix, 1_700_000_123);
        assert_eq!(record.subsecond, 7);
        assert_eq!(record.heart_rate, 64);
        assert_eq!(record.rr_intervals, vec![812, 790]);
    }

    #[test]
    fn heart_rate_ignores_truncated_rr_block() {
        let mut body = vec![0u8; 16];
        body[14] = 70;
        body[15] = 3;
        body.extend_from_slice(&800u16.to_le_bytes());

        let record = HeartRateRecord::parse(&body).expect("long enough");
        assert_eq!(record.heart_rate, 70);
        assert!(record.rr_intervals.is_empty());
    }
}
