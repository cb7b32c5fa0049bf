//! # Core Protocol Components
//!
//! Low-level packet handling: framing, checksums, code tables and record layouts.
//!
//! ## Components
//! - **Packet**: framed packet with header CRC8 and body CRC32
//! - **Codec**: tokio-util codec for back-to-back frames in a byte stream
//! - **Constants**: packet, command, metadata and event code tables
//! - **Records**: metadata and heart-rate record decoders
//!
//! ## Wire Format
//! ```text
//! offset 0:      SOF 0xAA
//! offset 1..3:   length (u16 LE) = body length + 4
//! offset 3:      CRC8 over bytes[1..3)
//! offset 4..L:   body = type | seq | cmd | payload
//! offset L..L+4: CRC32 over body (u32 LE)
//! ```
//!
//! ## Validation
//! - Frames shorter than 8 bytes are rejected before any field is read
//! - Header CRC is checked before the length field is trusted
//! - Both CRCs validate before a packet is materialized

pub mod checksum;
pub mod codec;
pub mod constants;
pub mod packet;
pub mod records;
