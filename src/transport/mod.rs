//! # Transport Layer
//!
//! Seams to everything outside the protocol core.
//!
//! The radio link itself (scanning, GATT connection, service discovery) lives outside
//! this crate. A link implementation provides:
//! - a [`Transport`] that writes framed commands to the strap
//! - a [`DeviceInfo`] that reads the serial number from the device-information service
//! - an inbound channel of [`Notification`]s, one per characteristic value change
//!
//! ## Components
//! - **crypto**: the CMAC primitive used by the session handshake
//! - **sink**: byte sinks for the historical data stream
//! - **presentation**: fire-and-forget device events for a UI or logger
//! - **memory**: in-process transport and simulated strap for tests

pub mod crypto;
pub mod memory;
pub mod presentation;
pub mod sink;

use crate::error::Result;
use std::future::Future;

/// Primary service advertised by the strap.
pub const WHOOP_SERVICE: &str = "61080001-8d6d-82b8-614a-1c8cb0f8dcc6";
/// Write characteristic for host commands.
pub const WHOOP_CHAR_CMD_TO_STRAP: &str = "61080002-8d6d-82b8-614a-1c8cb0f8dcc6";
/// Notify characteristic for command responses.
pub const WHOOP_CHAR_CMD_FROM_STRAP: &str = "61080003-8d6d-82b8-614a-1c8cb0f8dcc6";
/// Notify characteristic for strap events.
pub const WHOOP_CHAR_EVENTS_FROM_STRAP: &str = "61080004-8d6d-82b8-614a-1c8cb0f8dcc6";
/// Notify characteristic for realtime, historical, metadata and console data.
pub const WHOOP_CHAR_DATA_FROM_STRAP: &str = "61080005-8d6d-82b8-614a-1c8cb0f8dcc6";

/// Inbound characteristic a notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Command,
    Event,
    Data,
}

impl Channel {
    /// UUID of the notify characteristic backing this channel.
    pub const fn uuid(self) -> &'static str {
        match self {
            Channel::Command => WHOOP_CHAR_CMD_FROM_STRAP,
            Channel::Event => WHOOP_CHAR_EVENTS_FROM_STRAP,
            Channel::Data => WHOOP_CHAR_DATA_FROM_STRAP,
        }
    }

    /// Map a characteristic UUID back to its channel.
    pub fn from_uuid(uuid: &str) -> Option<Self> {
        [Channel::Command, Channel::Event, Channel::Data]
            .into_iter()
            .find(|channel| channel.uuid().eq_ignore_ascii_case(uuid))
    }
}

/// One raw characteristic value delivered by the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: Channel,
    pub bytes: Vec<u8>,
}

impl Notification {
    pub fn new(channel: Channel, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            bytes: bytes.into(),
        }
    }
}

/// Outbound half of the link.
pub trait Transport: Send + Sync {
    /// Write one framed packet to the command characteristic, resolving once the link
    /// has accepted it.
    fn write(&self, frame: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// Device-information service.
pub trait DeviceInfo: Send + Sync {
    /// Serial number string, or `None` if the device does not expose one.
    fn read_serial(&self) -> impl Future<Output = Result<Option<String>>> + Send;
}
