//! Per-connection session object.
//!
//! A [`Session`] owns everything one strap connection needs: the link collaborators,
//! both correlators, the history sink, the presenter, metrics and configuration. Nothing
//! about the connection lives in globals.
//!
//! ```no_run
//! use whoop_protocol::config::ProtocolConfig;
//! use whoop_protocol::transport::memory::{MemoryTransport, SimulatedStrap, StaticDeviceInfo};
//! use whoop_protocol::Session;
//!
//! # async fn demo() -> whoop_protocol::Result<()> {
//! let (transport, wire) = MemoryTransport::new();
//! let session = Session::new(transport, StaticDeviceInfo::new("4A1234567"), &ProtocolConfig::default());
//!
//! let (inbound, _dispatcher) = session.attach_channel();
//! SimulatedStrap::new("4A1234567").spawn(wire, inbound);
//!
//! session.connect().await?;
//! let report = session.download_history().await?;
//! println!("{} segments", report.segments);
//! # Ok(())
//! # }
//! ```

use crate::config::{ProtocolConfig, SessionConfig};
use crate::core::constants::CommandNumber;
use crate::core::packet::Packet;
use crate::error::{DownloadError, ProtocolError, Result};
use crate::protocol::correlator::ResponseCorrelator;
use crate::protocol::dispatcher::NotificationDispatcher;
use crate::protocol::handshake::AuthHandshake;
use crate::protocol::history::{DownloadLock, DownloadReport, HistoricalDownload};
use crate::protocol::{send_packet, write_frame};
use crate::transport::crypto::{AesCmac, CmacPrimitive};
use crate::transport::presentation::{DeviceEvent, Presentation, TracingPresentation};
use crate::transport::sink::{self, FileSink, SharedSink};
use crate::transport::{DeviceInfo, Notification, Transport};
use crate::utils::metrics::Metrics;
use futures::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, instrument, warn};

/// Pre-framed historical data request that reliably returns the last few minutes of
/// history.
pub const RAW_HISTORY_REQUEST: [u8; 12] = [
    0xAA, 0x08, 0x00, 0xA8, 0x23, 0x0E, 0x16, 0x00, 0x11, 0x47, 0xC5, 0x85,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Authenticating,
    Ready,
    Failed,
}

type SharedState = Arc<Mutex<SessionState>>;

fn read_state(state: &SharedState) -> SessionState {
    *state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn set_state(state: &SharedState, next: SessionState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

/// One strap connection.
pub struct Session<T, D, C = AesCmac> {
    transport: T,
    device_info: D,
    cmac: C,
    commands: Arc<ResponseCorrelator>,
    metadata: Arc<ResponseCorrelator>,
    sink: SharedSink,
    presenter: Arc<dyn Presentation>,
    metrics: Arc<Metrics>,
    config: SessionConfig,
    state: SharedState,
    realtime_hr: AtomicBool,
    download_lock: DownloadLock,
}

impl<T: Transport, D: DeviceInfo> Session<T, D, AesCmac> {
    /// Session writing history to the configured file and logging device events.
    pub fn new(transport: T, device_info: D, config: &ProtocolConfig) -> Self {
        Self::with_parts(
            transport,
            device_info,
            AesCmac,
            sink::shared(FileSink::new(&config.history.output_path)),
            Arc::new(TracingPresentation),
            config.session.clone(),
        )
    }
}

impl<T, D, C> Session<T, D, C>
where
    T: Transport,
    D: DeviceInfo,
    C: CmacPrimitive,
{
    pub fn with_parts(
        transport: T,
        device_info: D,
        cmac: C,
        sink: SharedSink,
        presenter: Arc<dyn Presentation>,
        config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            device_info,
            cmac,
            commands: Arc::new(ResponseCorrelator::new("command")),
            metadata: Arc::new(ResponseCorrelator::new("metadata")),
            sink,
            presenter,
            metrics: Arc::new(Metrics::new()),
            config,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            realtime_hr: AtomicBool::new(false),
            download_lock: DownloadLock::new(),
        }
    }

    /// Replace the history sink.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the presenter.
    pub fn with_presenter(mut self, presenter: Arc<dyn Presentation>) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn state(&self) -> SessionState {
        read_state(&self.state)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_realtime_active(&self) -> bool {
        self.realtime_hr.load(Ordering::Acquire)
    }

    pub fn is_downloading(&self) -> bool {
        self.download_lock.is_held()
    }

    /// Dispatcher wired to this session's correlators, sink and presenter.
    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::clone(&self.commands),
            Arc::clone(&self.metadata),
            Arc::clone(&self.sink),
            Arc::clone(&self.presenter),
            Arc::clone(&self.metrics),
        )
    }

    /// Start dispatching an inbound notification stream.
    ///
    /// When the stream ends the correlators are closed, which releases any suspended
    /// handshake or download, and the session returns to `Idle`.
    pub fn attach<S>(&self, inbound: S) -> JoinHandle<()>
    where
        S: Stream<Item = Notification> + Send + 'static,
    {
        self.commands.reopen();
        self.metadata.reopen();

        let dispatcher = self.dispatcher();
        let state = Arc::clone(&self.state);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            dispatcher.run(inbound).await;
            warn!("Strap link lost");
            set_state(&state, SessionState::Idle);
            metrics.log_metrics();
        })
    }

    /// [`attach`](Self::attach) to a fresh channel, returning its sending half.
    pub fn attach_channel(&self) -> (UnboundedSender<Notification>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.attach(UnboundedReceiverStream::new(rx));
        (tx, handle)
    }

    /// Authenticate and query the strap's basic status.
    #[instrument(skip_all, name = "session_connect")]
    pub async fn connect(&self) -> Result<()> {
        set_state(&self.state, SessionState::Authenticating);

        let mut handshake = AuthHandshake::new(
            &self.transport,
            &self.device_info,
            &self.cmac,
            &self.commands,
            &self.metrics,
        )
        .with_derivation(self.config.key_derivation)
        .with_timeouts(self.config.handshake_timeout, self.config.write_timeout);

        if let Err(e) = handshake.perform().await {
            set_state(&self.state, SessionState::Failed);
            return Err(e.into());
        }
        set_state(&self.state, SessionState::Ready);
        info!("Strap connected");

        self.request_battery_level().await?;
        self.report_version().await?;
        self.hello_harvard().await?;
        Ok(())
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            _ => Err(ProtocolError::NotConnected),
        }
    }

    async fn send_command(&self, cmd: CommandNumber, payload: Vec<u8>) -> Result<()> {
        self.ensure_ready()?;
        debug!(%cmd, "Sending command");
        send_packet(
            &self.transport,
            &Packet::command(cmd, payload),
            self.config.write_timeout,
            &self.metrics,
        )
        .await
    }

    pub async fn request_battery_level(&self) -> Result<()> {
        self.send_command(CommandNumber::GetBatteryLevel, vec![0x00])
            .await
    }

    pub async fn report_version(&self) -> Result<()> {
        self.send_command(CommandNumber::ReportVersionInfo, vec![0x00])
            .await
    }

    pub async fn hello_harvard(&self) -> Result<()> {
        self.send_command(CommandNumber::GetHelloHarvard, vec![0x00])
            .await
    }

    pub async fn get_clock(&self) -> Result<()> {
        self.send_command(CommandNumber::GetClock, vec![0x00]).await
    }

    pub async fn run_alarm(&self) -> Result<()> {
        self.send_command(CommandNumber::RunAlarm, vec![0x00]).await
    }

    pub async fn run_haptics(&self) -> Result<()> {
        self.send_command(CommandNumber::RunHapticsPattern, vec![0x00])
            .await
    }

    pub async fn reboot(&self) -> Result<()> {
        self.send_command(CommandNumber::RebootStrap, vec![0x00])
            .await
    }

    /// Flip realtime heart-rate streaming, returning the new setting.
    pub async fn toggle_realtime_hr(&self) -> Result<bool> {
        let enable = !self.is_realtime_active();
        self.send_command(CommandNumber::ToggleRealtimeHr, vec![u8::from(enable)])
            .await?;

        self.realtime_hr.store(enable, Ordering::Release);
        self.presenter.present(DeviceEvent::RealtimeHr(enable));
        Ok(enable)
    }

    /// Write [`RAW_HISTORY_REQUEST`] as-is.
    pub async fn send_raw_historical_request(&self) -> Result<()> {
        self.ensure_ready()?;
        write_frame(&self.transport, &RAW_HISTORY_REQUEST, self.config.write_timeout).await?;
        self.metrics.frame_sent(RAW_HISTORY_REQUEST.len() as u64);
        self.presenter
            .present(DeviceEvent::Notice("Raw historical data request sent!".into()));
        Ok(())
    }

    /// Request the battery level every configured interval until the session leaves
    /// `Ready`.
    pub async fn poll_battery(&self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.battery_poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.state() != SessionState::Ready {
                debug!("Battery polling stopped");
                return Ok(());
            }
            self.request_battery_level().await?;
        }
    }

    /// Page the strap's stored history into the sink.
    #[instrument(skip_all, name = "session_download")]
    pub async fn download_history(&self) -> Result<DownloadReport> {
        self.ensure_ready()?;

        let mut download = HistoricalDownload::new(
            &self.transport,
            &self.metadata,
            &self.sink,
            &self.download_lock,
            &self.metrics,
        )
        .with_timeouts(self.config.boundary_timeout, self.config.write_timeout);

        match download.run().await {
            Ok(report) => {
                self.presenter
                    .present(DeviceEvent::Notice("History Download Success!".into()));
                Ok(report)
            }
            Err(DownloadError::AlreadyActive) => Err(DownloadError::AlreadyActive.into()),
            Err(e) => {
                self.presenter
                    .present(DeviceEvent::Notice("History Download Error!".into()));
                Err(e.into())
            }
        }
    }

    /// Drop queued responses and realtime state without touching the link.
    pub fn reset(&self) {
        let commands = self.commands.drain();
        let metadata = self.metadata.drain();
        if commands + metadata > 0 {
            debug!(commands, metadata, "Discarded queued packets");
        }

        self.realtime_hr.store(false, Ordering::Release);
        set_state(&self.state, SessionState::Idle);

        let mut sink = sink::lock(&self.sink);
        if sink.is_open() {
            if let Err(e) = sink.close() {
                warn!(error = %e, "Failed to close history sink");
            }
        }
    }

    /// Abandon in-flight work after the link went away.
    ///
    /// A handshake or download waiting on a response fails with `LinkLost`.
    pub fn disconnect(&self) {
        self.commands.close();
        self.metadata.close();
        self.reset();
        self.metrics.log_metrics();
        info!("Session disconnected");
    }
}
