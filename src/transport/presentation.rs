//! Fire-and-forget device events for whatever displays them.
//!
//! The protocol core never waits on a presenter. Implementations must return promptly.

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

/// Something the strap told us that a user might want to see.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Battery charge in percent.
    Battery { percent: f32 },
    /// Firmware versions of the two processors.
    Version { harvard: String, boylston: String },
    Charging(bool),
    Wrist(bool),
    /// Strap clock as a unix timestamp.
    Clock { unix: u32 },
    HeartRate(u8),
    /// Unverified field; see [`DeviceEvent::is_best_effort`].
    Temperature(u8),
    /// Unverified field; see [`DeviceEvent::is_best_effort`].
    SpO2(u8),
    RealtimeHr(bool),
    HistoryStarted,
    HistoryComplete,
    /// Short user-facing notice.
    Notice(String),
    /// One cleaned console log line from the strap.
    LogLine(String),
}

impl DeviceEvent {
    /// True for readings taken from guessed payload offsets.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, DeviceEvent::Temperature(_) | DeviceEvent::SpO2(_))
    }
}

/// Receiver of device events.
pub trait Presentation: Send + Sync {
    fn present(&self, event: DeviceEvent);
}

impl Presentation for UnboundedSender<DeviceEvent> {
    fn present(&self, event: DeviceEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.send(event);
    }
}

/// Presenter that writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingPresentation;

impl Presentation for TracingPresentation {
    fn present(&self, event: DeviceEvent) {
        match event {
            DeviceEvent::Battery { percent } => info!(percent, "Battery level"),
            DeviceEvent::Version { harvard, boylston } => {
                info!(%harvard, %boylston, "Firmware version")
            }
            DeviceEvent::Charging(on) => info!(charging = on, "Charging status"),
            DeviceEvent::Wrist(on) => info!(on_wrist = on, "Wrist status"),
            DeviceEvent::Clock { unix } => info!(unix, "Strap clock"),
            DeviceEvent::HeartRate(bpm) => debug!(bpm, "Heart rate"),
            DeviceEvent::Temperature(value) => debug!(value, best_effort = true, "Temperature"),
            DeviceEvent::SpO2(value) => debug!(value, best_effort = true, "SpO2"),
            DeviceEvent::RealtimeHr(on) => info!(enabled = on, "Realtime heart rate"),
            DeviceEvent::HistoryStarted => info!("History download started"),
            DeviceEvent::HistoryComplete => info!("History download complete"),
            DeviceEvent::Notice(text) => info!(%text, "Notice"),
            DeviceEvent::LogLine(line) => debug!(target: "whoop_protocol::strap_console", "{line}"),
        }
    }
}
