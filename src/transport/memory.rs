//! In-process link for tests and demos.
//!
//! [`MemoryTransport`] hands every written frame to an unbounded channel so a test can
//! act as the strap. [`SimulatedStrap`] is a scripted strap that answers the commands
//! this crate sends, including the session challenge and the history paging exchange.

use crate::core::checksum::{crc32, crc8};
use crate::core::constants::{
    CommandNumber, MetadataType, PacketType, CRC32_LEN, HEADER_LEN, SOF,
};
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{HELLO_CHARGING_OFFSET, HELLO_WRIST_OFFSET};
use crate::protocol::handshake::{challenge_response, derive_session_secret, KeyDerivation};
use crate::transport::crypto::AesCmac;
use crate::transport::{Channel, DeviceInfo, Notification, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Transport that records written frames on a channel.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    outbound: UnboundedSender<Vec<u8>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// New transport and the receiving end of everything written to it.
    pub fn new() -> (Self, UnboundedReceiver<Vec<u8>>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound,
                fail_writes: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Make subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Transport for MemoryTransport {
    async fn write(&self, frame: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProtocolError::TransportError(
                "simulated write failure".to_string(),
            ));
        }
        self.outbound
            .send(frame.to_vec())
            .map_err(|_| ProtocolError::TransportError(constants::ERR_TRANSPORT_CLOSED.into()))
    }
}

/// Device-info provider with a fixed serial.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceInfo {
    serial: Option<String>,
}

impl StaticDeviceInfo {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: Some(serial.into()),
        }
    }

    /// Provider for a device without a serial characteristic.
    pub fn missing() -> Self {
        Self { serial: None }
    }
}

impl DeviceInfo for StaticDeviceInfo {
    async fn read_serial(&self) -> Result<Option<String>> {
        Ok(self.serial.clone())
    }
}

/// One page of history: the frames streamed before its HISTORY_END boundary.
#[derive(Debug, Clone)]
pub struct HistorySegment {
    pub frames: Vec<Packet>,
    pub trim: u32,
}

impl HistorySegment {
    /// Segment of `count` heart-rate frames starting at `unix`.
    pub fn heart_rate(unix: u32, count: usize, trim: u32) -> Self {
        let frames = (0..count)
            .map(|i| {
                let mut payload = vec![0u8; 16];
                payload[1..5].copy_from_slice(&(unix + i as u32).to_le_bytes());
                payload[5] = 60 + (i % 40) as u8;
                Packet::new(PacketType::HistoricalData.code(), 0, 0, payload)
            })
            .collect();
        Self { frames, trim }
    }
}

/// What the simulated strap observed.
#[derive(Debug, Clone, Default)]
pub struct StrapLog {
    /// Command codes in arrival order.
    pub commands: Vec<u8>,
    /// Whether the last SESSION_RESPONSE carried the expected tag.
    pub authenticated: Option<bool>,
    /// Payloads of every HISTORICAL_DATA_RESULT.
    pub acks: Vec<Vec<u8>>,
    /// Frames that could not be parsed.
    pub rejected: usize,
}

/// Shared view of a [`StrapLog`].
#[derive(Debug, Clone, Default)]
pub struct StrapLogHandle(Arc<Mutex<StrapLog>>);

impl StrapLogHandle {
    fn lock(&self) -> MutexGuard<'_, StrapLog> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StrapLog {
        self.lock().clone()
    }
}

/// Scripted strap that answers host commands over a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct SimulatedStrap {
    serial: String,
    derivation: KeyDerivation,
    battery_tenths: u16,
    clock: u32,
    harvard: [u32; 4],
    boylston: [u32; 4],
    charging: bool,
    on_wrist: bool,
    segments: Vec<HistorySegment>,
    silent_on: Vec<CommandNumber>,
    hang_up_on: Option<CommandNumber>,
    log: StrapLogHandle,
}

impl SimulatedStrap {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            derivation: KeyDerivation::default(),
            battery_tenths: 875,
            clock: 1_700_000_000,
            harvard: [41, 16, 6, 0],
            boylston: [17, 2, 2, 0],
            charging: false,
            on_wrist: true,
            segments: Vec::new(),
            silent_on: Vec::new(),
            hang_up_on: None,
            log: StrapLogHandle::default(),
        }
    }

    pub fn with_derivation(mut self, derivation: KeyDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    /// Battery level in tenths of a percent.
    pub fn with_battery(mut self, tenths: u16) -> Self {
        self.battery_tenths = tenths;
        self
    }

    pub fn with_clock(mut self, unix: u32) -> Self {
        self.clock = unix;
        self
    }

    pub fn with_status(mut self, charging: bool, on_wrist: bool) -> Self {
        self.charging = charging;
        self.on_wrist = on_wrist;
        self
    }

    pub fn with_segments(mut self, segments: Vec<HistorySegment>) -> Self {
        self.segments = segments;
        self
    }

    /// Never answer `cmd`.
    pub fn silent_on(mut self, cmd: CommandNumber) -> Self {
        self.silent_on.push(cmd);
        self
    }

    /// Drop the link when `cmd` arrives.
    pub fn hang_up_on(mut self, cmd: CommandNumber) -> Self {
        self.hang_up_on = Some(cmd);
        self
    }

    pub fn log(&self) -> StrapLogHandle {
        self.log.clone()
    }

    /// Serve `outbound` frames until the host side closes or the strap hangs up.
    pub fn spawn(
        self,
        outbound: UnboundedReceiver<Vec<u8>>,
        inbound: UnboundedSender<Notification>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(outbound, inbound))
    }

    async fn run(
        self,
        mut outbound: UnboundedReceiver<Vec<u8>>,
        inbound: UnboundedSender<Notification>,
    ) {
        let mut expected_tag: Option<[u8; 16]> = None;
        let mut next_segment = 0usize;

        while let Some(frame) = outbound.recv().await {
            let Some((code, payload)) = parse_host_frame(&frame) else {
                warn!(len = frame.len(), "Simulated strap rejected frame");
                self.log.lock().rejected += 1;
                continue;
            };
            self.log.lock().commands.push(code);

            let Ok(cmd) = CommandNumber::try_from(code) else {
                continue;
            };
            trace!(%cmd, "Simulated strap received command");

            if self.hang_up_on == Some(cmd) {
                debug!(%cmd, "Simulated strap hanging up");
                return;
            }
            if self.silent_on.contains(&cmd) {
                continue;
            }

            let delivered = match cmd {
                CommandNumber::StartSession => {
                    let challenge: [u8; 16] = rand::random();
                    expected_tag = derive_session_secret(&self.serial, self.derivation)
                        .and_then(|secret| challenge_response(&AesCmac, &secret, &challenge))
                        .ok();
                    self.respond(&inbound, cmd, challenge.to_vec())
                }
                CommandNumber::SessionResponse => {
                    let ok = expected_tag.is_some_and(|tag| payload == tag);
                    self.log.lock().authenticated = Some(ok);
                    true
                }
                CommandNumber::GetBatteryLevel => {
                    let mut body = vec![0, 0];
                    body.extend_from_slice(&self.battery_tenths.to_le_bytes());
                    self.respond(&inbound, cmd, body)
                }
                CommandNumber::ReportVersionInfo => {
                    let mut body = vec![0, 0, 0];
                    for v in self.harvard.iter().chain(&self.boylston) {
                        body.extend_from_slice(&v.to_le_bytes());
                    }
                    body.resize(3 + 16 * 4, 0);
                    self.respond(&inbound, cmd, body)
                }
                CommandNumber::GetHelloHarvard => {
                    let mut body = vec![0u8; HELLO_WRIST_OFFSET + 1];
                    body[HELLO_CHARGING_OFFSET] = u8::from(self.charging);
                    body[HELLO_WRIST_OFFSET] = u8::from(self.on_wrist);
                    self.respond(&inbound, cmd, body)
                }
                CommandNumber::GetClock => {
                    let mut body = vec![0, 0];
                    body.extend_from_slice(&self.clock.to_le_bytes());
                    self.respond(&inbound, cmd, body)
                }
                CommandNumber::ToggleRealtimeHr => {
                    if payload.first() == Some(&1) {
                        let mut body = vec![0u8; 13];
                        body[5] = 64;
                        send(&inbound, Channel::Data, PacketType::RealtimeData, 0, body)
                    } else {
                        true
                    }
                }
                CommandNumber::SendHistoricalData => {
                    next_segment = 0;
                    self.stream_segment(&inbound, next_segment)
                }
                CommandNumber::HistoricalDataResult => {
                    self.log.lock().acks.push(payload);
                    next_segment += 1;
                    self.stream_segment(&inbound, next_segment)
                }
                _ => true,
            };

            if !delivered {
                debug!("Host stopped listening; simulated strap exiting");
                return;
            }
        }
    }

    fn respond(
        &self,
        inbound: &UnboundedSender<Notification>,
        cmd: CommandNumber,
        body: Vec<u8>,
    ) -> bool {
        send(
            inbound,
            Channel::Command,
            PacketType::CommandResponse,
            cmd.code(),
            body,
        )
    }

    fn stream_segment(&self, inbound: &UnboundedSender<Notification>, index: usize) -> bool {
        let Some(segment) = self.segments.get(index) else {
            return send_metadata(inbound, MetadataType::HistoryComplete, 0);
        };

        if !send_metadata(inbound, MetadataType::HistoryStart, 0) {
            return false;
        }
        for frame in &segment.frames {
            let Ok(bytes) = frame.encode() else {
                continue;
            };
            if inbound.send(Notification::new(Channel::Data, bytes)).is_err() {
                return false;
            }
        }
        send_metadata(inbound, MetadataType::HistoryEnd, segment.trim)
    }
}

fn send(
    inbound: &UnboundedSender<Notification>,
    channel: Channel,
    packet_type: PacketType,
    cmd: u8,
    payload: Vec<u8>,
) -> bool {
    match Packet::new(packet_type.code(), 0, cmd, payload).encode() {
        Ok(bytes) => inbound.send(Notification::new(channel, bytes)).is_ok(),
        Err(_) => true,
    }
}

fn send_metadata(inbound: &UnboundedSender<Notification>, kind: MetadataType, trim: u32) -> bool {
    let mut payload = vec![0u8; 14];
    payload[0..4].copy_from_slice(&1_700_000_000u32.to_le_bytes());
    payload[10..14].copy_from_slice(&trim.to_le_bytes());
    send(inbound, Channel::Data, PacketType::Metadata, kind.code(), payload)
}

/// Parse a host frame into `(cmd, payload)`.
///
/// Unlike [`Packet::decode`] this accepts an empty payload, which START_SESSION uses.
fn parse_host_frame(frame: &[u8]) -> Option<(u8, Vec<u8>)> {
    if frame.len() < HEADER_LEN + 3 + CRC32_LEN || frame[0] != SOF {
        return None;
    }
    if crc8(&frame[1..3]) != frame[3] {
        return None;
    }

    let length = u16::from_le_bytes([frame[1], frame[2]]) as usize;
    if length < HEADER_LEN + 3 || length + CRC32_LEN > frame.len() {
        return None;
    }

    let body = &frame[HEADER_LEN..length];
    let expected = u32::from_le_bytes(frame[length..length + CRC32_LEN].try_into().ok()?);
    if crc32(body) != expected {
        return None;
    }

    Some((body[2], body[3..].to_vec()))
}
