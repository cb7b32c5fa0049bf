//! Historical download: the metadata-acknowledged paging loop.
//!
//! ```text
//! host                                       strap
//!  | -- SEND_HISTORICAL_DATA ---------------> |
//!  | <- METADATA HISTORY_START -------------- |
//!  | <- HISTORICAL_DATA ... (to byte sink) -- |
//!  | <- METADATA HISTORY_END (trim) --------- |
//!  | -- HISTORICAL_DATA_RESULT [1,trim,0] --> |
//!  |              ... repeat ...              |
//!  | <- METADATA HISTORY_COMPLETE ----------- |
//! ```
//!
//! The loop only negotiates page boundaries. Historical frames themselves are written to
//! the byte sink by the dispatcher as they arrive; this module owns the sink's open/close
//! scope.

use crate::core::constants::{CommandNumber, MetadataType};
use crate::core::packet::{read_u32_le, Packet};
use crate::core::records::TRIM_OFFSET;
use crate::error::DownloadError;
use crate::protocol::correlator::ResponseCorrelator;
use crate::protocol::send_packet;
use crate::transport::sink::{SharedSink, SinkGuard};
use crate::transport::Transport;
use crate::utils::metrics::{Metrics, Timer};
use crate::utils::timeout::{with_timeout, DEFAULT_BOUNDARY_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

/// Length of a HISTORICAL_DATA_RESULT payload.
pub const ACK_LEN: usize = 9;

/// Acknowledgement for a HISTORY_END boundary: `[1, trim u32 LE, 0 u32]`.
pub fn build_ack(trim: u32) -> [u8; ACK_LEN] {
    let mut ack = [0u8; ACK_LEN];
    ack[0] = 1;
    ack[1..5].copy_from_slice(&trim.to_le_bytes());
    ack
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Requested,
    AwaitingBoundary,
    Paging,
    Complete,
    Failed,
}

/// State of one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSession {
    pub state: DownloadState,
    pub last_trim: u32,
}

impl Default for DownloadSession {
    fn default() -> Self {
        Self {
            state: DownloadState::Idle,
            last_trim: 0,
        }
    }
}

/// Outcome of a completed download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// HISTORY_END boundaries acknowledged.
    pub segments: u32,
    /// Trim echoed in the last acknowledgement.
    pub last_trim: u32,
}

/// Allows at most one download per connection.
#[derive(Debug, Default)]
pub struct DownloadLock(AtomicBool);

impl DownloadLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Result<DownloadLockGuard<'_>, DownloadError> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| DownloadLockGuard(&self.0))
            .map_err(|_| DownloadError::AlreadyActive)
    }

    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Releases the [`DownloadLock`] on drop.
pub struct DownloadLockGuard<'a>(&'a AtomicBool);

impl Drop for DownloadLockGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One historical download over borrowed connection resources.
pub struct HistoricalDownload<'a, T> {
    transport: &'a T,
    metadata: &'a ResponseCorrelator,
    sink: &'a SharedSink,
    lock: &'a DownloadLock,
    metrics: &'a Metrics,
    boundary_timeout: Duration,
    write_timeout: Duration,
    session: DownloadSession,
}

impl<'a, T: Transport> HistoricalDownload<'a, T> {
    pub fn new(
        transport: &'a T,
        metadata: &'a ResponseCorrelator,
        sink: &'a SharedSink,
        lock: &'a DownloadLock,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            transport,
            metadata,
            sink,
            lock,
            metrics,
            boundary_timeout: DEFAULT_BOUNDARY_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            session: DownloadSession::default(),
        }
    }

    pub fn with_timeouts(mut self, boundary: Duration, write: Duration) -> Self {
        self.boundary_timeout = boundary;
        self.write_timeout = write;
        self
    }

    pub fn session(&self) -> DownloadSession {
        self.session
    }

    /// Page through the strap's history until HISTORY_COMPLETE.
    ///
    /// The byte sink is open for exactly the duration of this call.
    #[instrument(skip_all, name = "history_download")]
    pub async fn run(&mut self) -> Result<DownloadReport, DownloadError> {
        let lock = self.lock;
        let _held = lock.try_acquire()?;
        let _timer = Timer::start("history_download");
        self.metrics.download_attempt();

        let result = self.run_with_sink().await;
        match &result {
            Ok(report) => {
                self.session.state = DownloadState::Complete;
                self.metrics.download_success();
                info!(
                    segments = report.segments,
                    last_trim = report.last_trim,
                    "History download complete"
                );
            }
            Err(e) => {
                warn!(error = %e, state = ?self.session.state, "History download failed");
                self.session.state = DownloadState::Failed;
                self.metrics.download_failed();
            }
        }
        result
    }

    async fn run_with_sink(&mut self) -> Result<DownloadReport, DownloadError> {
        let guard = SinkGuard::open(Arc::clone(self.sink))
            .map_err(|e| DownloadError::SinkUnavailable(e.to_string()))?;

        // Early returns drop the guard, which closes the sink.
        let report = self.page().await?;

        guard
            .finish()
            .map_err(|e| DownloadError::SinkUnavailable(e.to_string()))?;
        Ok(report)
    }

    async fn page(&mut self) -> Result<DownloadReport, DownloadError> {
        let stale = self.metadata.drain();
        if stale > 0 {
            debug!(stale, "Discarded stale metadata packets");
        }

        self.send(CommandNumber::SendHistoricalData, vec![0x00])
            .await?;
        self.session.state = DownloadState::Requested;

        let mut report = DownloadReport::default();
        loop {
            if self.session.state == DownloadState::Requested {
                self.session.state = DownloadState::AwaitingBoundary;
            }

            let boundary = self.next_boundary().await?;
            if boundary.cmd == MetadataType::HistoryComplete.code() {
                return Ok(report);
            }

            let trim = read_u32_le(&boundary.payload, TRIM_OFFSET)
                .ok_or(DownloadError::MalformedBoundary(boundary.payload.len()))?;

            self.send(CommandNumber::HistoricalDataResult, build_ack(trim).to_vec())
                .await?;
            self.session.state = DownloadState::Paging;
            self.session.last_trim = trim;
            self.metrics.segment_acknowledged();

            report.segments += 1;
            report.last_trim = trim;
            debug!(trim, segment = report.segments, "Segment acknowledged");
        }
    }

    /// Next HISTORY_END or HISTORY_COMPLETE, skipping anything else.
    async fn next_boundary(&self) -> Result<Packet, DownloadError> {
        loop {
            let packet = match with_timeout(self.metadata.dequeue(), self.boundary_timeout).await {
                Some(Some(packet)) => packet,
                Some(None) => return Err(DownloadError::LinkLost),
                None => return Err(DownloadError::BoundaryTimeout),
            };

            match MetadataType::try_from(packet.cmd) {
                Ok(MetadataType::HistoryEnd | MetadataType::HistoryComplete) => return Ok(packet),
                Ok(MetadataType::HistoryStart) => trace!("Segment started"),
                Err(code) => trace!(cmd = code, "Skipping unknown metadata"),
            }
        }
    }

    async fn send(&self, cmd: CommandNumber, payload: Vec<u8>) -> Result<(), DownloadError> {
        send_packet(
            self.transport,
            &Packet::command(cmd, payload),
            self.write_timeout,
            self.metrics,
        )
        .await
        .map_err(|e| DownloadError::Transport(e.to_string()))
    }
}
