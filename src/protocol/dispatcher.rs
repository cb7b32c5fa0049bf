use crate::core::constants::{CommandNumber, EventNumber, MetadataType, PacketType};
use crate::core::packet::{packet_to_hex_string, read_u32_le, Packet};
use crate::error::FrameError;
use crate::protocol::correlator::ResponseCorrelator;
use crate::transport::presentation::{DeviceEvent, Presentation};
use crate::transport::sink::{self, SharedSink};
use crate::transport::{Channel, Notification};
use crate::utils::metrics::Metrics;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};

/// Marker the strap firmware splices into console output.
pub const CONSOLE_NOISE: [u8; 3] = [0x34, 0x00, 0x01];

/// Bytes before the text in a CONSOLE_LOGS payload.
pub const CONSOLE_PREFIX_LEN: usize = 7;

/// Minimum REPORT_VERSION_INFO payload: 3 leading bytes and sixteen `u32` fields.
pub const VERSION_PAYLOAD_LEN: usize = 3 + 16 * 4;

/// Offset of the charging flag in a GET_HELLO_HARVARD payload.
pub const HELLO_CHARGING_OFFSET: usize = 7;

/// Offset of the on-wrist flag in a GET_HELLO_HARVARD payload.
pub const HELLO_WRIST_OFFSET: usize = 116;

/// Routes inbound notifications.
///
/// Holds no protocol state of its own: command responses go to the command correlator,
/// metadata to the metadata correlator, historical frames to the byte sink and
/// everything else to the presenter.
pub struct NotificationDispatcher {
    commands: Arc<ResponseCorrelator>,
    metadata: Arc<ResponseCorrelator>,
    sink: SharedSink,
    presenter: Arc<dyn Presentation>,
    metrics: Arc<Metrics>,
}

impl NotificationDispatcher {
    pub fn new(
        commands: Arc<ResponseCorrelator>,
        metadata: Arc<ResponseCorrelator>,
        sink: SharedSink,
        presenter: Arc<dyn Presentation>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            commands,
            metadata,
            sink,
            presenter,
            metrics,
        }
    }

    /// Consume the inbound stream until the link goes away.
    ///
    /// On exit both correlators are closed so suspended waiters return, and the byte
    /// sink is closed if a download left it open.
    #[instrument(skip_all, name = "dispatcher")]
    pub async fn run<S>(self, inbound: S)
    where
        S: Stream<Item = Notification> + Send,
    {
        futures::pin_mut!(inbound);
        while let Some(notification) = inbound.next().await {
            // Errors are logged inside; a bad delivery never stops the loop.
            let _ = self.dispatch(&notification);
        }

        info!("Inbound stream ended");
        self.commands.close();
        self.metadata.close();

        let mut sink = sink::lock(&self.sink);
        if sink.is_open() {
            if let Err(e) = sink.close() {
                warn!(error = %e, "Failed to close history sink after link loss");
            }
        }
    }

    /// Decode and route one delivery.
    ///
    /// A delivery that fails to decode is logged, counted and dropped.
    pub fn dispatch(&self, notification: &Notification) -> Result<(), FrameError> {
        let bytes = notification.bytes.as_slice();
        self.metrics.frame_received(bytes.len() as u64);

        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                self.metrics.decode_error();
                warn!(
                    channel = ?notification.channel,
                    error = %e,
                    frame = %packet_to_hex_string(bytes),
                    "Dropping undecodable notification"
                );
                return Err(e);
            }
        };

        trace!(channel = ?notification.channel, %packet, "Notification decoded");
        self.route(notification.channel, &packet, bytes);
        Ok(())
    }

    fn route(&self, channel: Channel, packet: &Packet, raw: &[u8]) {
        match packet.kind() {
            Ok(PacketType::Command | PacketType::CommandResponse) => {
                self.on_command(packet.clone())
            }
            Ok(PacketType::Event) => self.on_event(packet),
            Ok(PacketType::RealtimeData) => self.on_realtime(packet),
            Ok(PacketType::Metadata) => self.on_metadata(packet.clone()),
            Ok(PacketType::HistoricalData) => self.on_historical(packet, raw),
            Ok(PacketType::ConsoleLogs) => self.on_console(packet),
            Ok(other) => trace!(?channel, packet_type = %other, "Ignoring packet type"),
            Err(code) => debug!(?channel, packet_type = code, "Unknown packet type"),
        }
    }

    fn on_command(&self, packet: Packet) {
        match CommandNumber::try_from(packet.cmd) {
            Ok(CommandNumber::GetBatteryLevel) => match packet.payload_u16_le(2) {
                Some(raw) => {
                    let percent = f32::from(raw) / 10.0;
                    debug!(percent, "GET_BATTERY_LEVEL");
                    self.presenter.present(DeviceEvent::Battery { percent });
                }
                None => debug!(len = packet.payload.len(), "Short battery response"),
            },
            Ok(CommandNumber::ReportVersionInfo) => match parse_version(&packet.payload) {
                Some((harvard, boylston)) => {
                    debug!(%harvard, %boylston, "REPORT_VERSION_INFO");
                    self.presenter
                        .present(DeviceEvent::Version { harvard, boylston });
                }
                None => debug!(len = packet.payload.len(), "Short version response"),
            },
            Ok(CommandNumber::GetHelloHarvard) => {
                if let Some(charging) = packet.payload_u8(HELLO_CHARGING_OFFSET) {
                    self.presenter.present(DeviceEvent::Charging(charging != 0));
                }
                if let Some(worn) = packet.payload_u8(HELLO_WRIST_OFFSET) {
                    debug!(worn = worn != 0, "GET_HELLO_HARVARD");
                    self.presenter.present(DeviceEvent::Wrist(worn != 0));
                }
            }
            Ok(CommandNumber::GetClock) => {
                if let Some(unix) = packet.payload_u32_le(2) {
                    debug!(unix, "GET_CLOCK");
                    self.presenter.present(DeviceEvent::Clock { unix });
                }
            }
            _ => {}
        }

        self.commands.enqueue(packet);
    }

    fn on_event(&self, packet: &Packet) {
        let event = match EventNumber::try_from(packet.cmd) {
            Ok(EventNumber::WristOn) => DeviceEvent::Wrist(true),
            Ok(EventNumber::WristOff) => DeviceEvent::Wrist(false),
            Ok(EventNumber::ChargingOn) => DeviceEvent::Charging(true),
            Ok(EventNumber::ChargingOff) => DeviceEvent::Charging(false),
            Ok(EventNumber::DoubleTap) => DeviceEvent::Notice("Double Tap Detected!".into()),
            _ => return,
        };
        debug!(event = packet.cmd, "Strap event");
        self.presenter.present(event);
    }

    fn on_realtime(&self, packet: &Packet) {
        let payload = &packet.payload;
        if let Some(&bpm) = payload.get(5) {
            self.presenter.present(DeviceEvent::HeartRate(bpm));
        }

        // Temperature and SpO2 offsets are guesses from captures, not confirmed fields.
        if payload.len() > 10 {
            if let Some(&temp) = payload.get(11) {
                if temp > 0 && temp < 50 {
                    self.presenter.present(DeviceEvent::Temperature(temp));
                }
            }
            if let Some(&spo2) = payload.get(12) {
                if spo2 > 50 && spo2 <= 100 {
                    self.presenter.present(DeviceEvent::SpO2(spo2));
                }
            }
        }
    }

    fn on_metadata(&self, packet: Packet) {
        match MetadataType::try_from(packet.cmd) {
            Ok(MetadataType::HistoryStart) => {
                info!("Historical data download started");
                self.presenter.present(DeviceEvent::HistoryStarted);
            }
            Ok(MetadataType::HistoryEnd) => {
                debug!(trim = ?read_u32_le(&packet.payload, 10), "History segment boundary");
            }
            Ok(MetadataType::HistoryComplete) => {
                info!("Historical data download complete");
                self.presenter.present(DeviceEvent::HistoryComplete);
            }
            Err(code) => debug!(cmd = code, "Unknown metadata type"),
        }

        self.metadata.enqueue(packet);
    }

    fn on_historical(&self, packet: &Packet, raw: &[u8]) {
        debug!(heart_rate = ?packet.payload_u8(5), "Historical data frame");

        let mut sink = sink::lock(&self.sink);
        if !sink.is_open() {
            self.metrics.history_dropped();
            debug!(len = raw.len(), "History sink closed; frame dropped");
            return;
        }

        match sink.write(raw) {
            Ok(()) => self.metrics.history_streamed(raw.len() as u64),
            Err(e) => {
                self.metrics.history_dropped();
                warn!(error = %e, "Failed to write historical frame");
            }
        }
    }

    fn on_console(&self, packet: &Packet) {
        let line = clean_console_log(&packet.payload);
        self.metrics.console_line();
        self.presenter.present(DeviceEvent::LogLine(line));
    }
}

/// Extract console text from a CONSOLE_LOGS payload.
///
/// Drops the 7-byte prefix and the trailing byte, then removes every non-overlapping
/// [`CONSOLE_NOISE`] triple that fits entirely inside the remaining bytes.
pub fn clean_console_log(payload: &[u8]) -> String {
    let text = payload
        .get(CONSOLE_PREFIX_LEN..payload.len().saturating_sub(1))
        .unwrap_or_default();

    let mut cleaned = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if text[i..].starts_with(&CONSOLE_NOISE) {
            i += CONSOLE_NOISE.len();
        } else {
            cleaned.push(text[i]);
            i += 1;
        }
    }

    String::from_utf8_lossy(&cleaned).into_owned()
}

/// Parse `(harvard, boylston)` dotted version strings from REPORT_VERSION_INFO.
pub fn parse_version(payload: &[u8]) -> Option<(String, String)> {
    if payload.len() < VERSION_PAYLOAD_LEN {
        return None;
    }

    let fields: Vec<u32> = (0..8)
        .map(|i| read_u32_le(payload, 3 + i * 4))
        .collect::<Option<_>>()?;
    let dotted = |part: &[u32]| {
        part.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".")
    };

    Some((dotted(&fields[..4]), dotted(&fields[4..])))
}
