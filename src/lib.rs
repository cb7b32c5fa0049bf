//! # whoop-protocol
//!
//! Wire protocol core for WHOOP straps.
//!
//! The crate covers everything between raw notification bytes and the values a client
//! cares about:
//!
//! - **core**: the framed, CRC-protected packet format and its code tables
//! - **protocol**: response correlation, the CMAC session handshake, inbound
//!   notification routing and the historical-data paging loop
//! - **transport**: the seams to the radio link, device-info service, CMAC primitive,
//!   byte sink and presentation layer
//! - **service**: the per-connection [`Session`](service::session::Session) that ties
//!   the pieces together
//!
//! ## Wire Format
//! ```text
//! [SOF 0xAA] [Length u16 LE] [CRC8(length)] [Type] [Seq] [Cmd] [Payload ...] [CRC32(body) LE]
//! ```
//!
//! ## Example
//! ```rust
//! use whoop_protocol::core::constants::{CommandNumber, PacketType};
//! use whoop_protocol::core::packet::Packet;
//!
//! let packet = Packet::command(CommandNumber::GetBatteryLevel, vec![0x00]);
//! let frame = packet.encode().expect("small payload");
//! let decoded = Packet::decode(&frame).expect("valid frame");
//! assert_eq!(decoded.packet_type, PacketType::Command as u8);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::packet::Packet;
pub use crate::error::{DownloadError, FrameError, HandshakeError, ProtocolError, Result};
pub use crate::service::session::Session;
