//! Observability and Metrics
//!
//! Counters for link traffic, handshakes and historical downloads.
//!
//! Uses atomic counters so the dispatcher task and the session can share one instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Metrics collector for one strap connection
#[derive(Debug)]
pub struct Metrics {
    /// Notifications delivered by the transport
    pub frames_received: AtomicU64,
    /// Frames written to the strap
    pub frames_sent: AtomicU64,
    /// Total bytes received
    pub bytes_received: AtomicU64,
    /// Total bytes sent
    pub bytes_sent: AtomicU64,
    /// Inbound deliveries dropped because they failed to decode
    pub decode_errors: AtomicU64,
    /// Total handshake attempts
    pub handshakes_total: AtomicU64,
    /// Successful handshakes
    pub handshakes_success: AtomicU64,
    /// Failed handshakes
    pub handshakes_failed: AtomicU64,
    /// Historical downloads started
    pub downloads_total: AtomicU64,
    /// Historical downloads that reached HISTORY_COMPLETE
    pub downloads_success: AtomicU64,
    /// Historical downloads aborted
    pub downloads_failed: AtomicU64,
    /// HISTORY_END boundaries acknowledged
    pub segments_acknowledged: AtomicU64,
    /// Historical frame bytes handed to the byte sink
    pub history_bytes_streamed: AtomicU64,
    /// Historical frames dropped because the sink was closed
    pub history_frames_dropped: AtomicU64,
    /// Console log lines forwarded
    pub console_lines: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            handshakes_total: AtomicU64::new(0),
            handshakes_success: AtomicU64::new(0),
            handshakes_failed: AtomicU64::new(0),
            downloads_total: AtomicU64::new(0),
            downloads_success: AtomicU64::new(0),
            downloads_failed: AtomicU64::new(0),
            segments_acknowledged: AtomicU64::new(0),
            history_bytes_streamed: AtomicU64::new(0),
            history_frames_dropped: AtomicU64::new(0),
            console_lines: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record an inbound notification
    pub fn frame_received(&self, byte_count: u64) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record an outbound frame
    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a dropped, undecodable delivery
    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handshake attempt
    pub fn handshake_attempt(&self) {
        self.handshakes_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful handshake
    pub fn handshake_success(&self) {
        self.handshakes_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed handshake
    pub fn handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a download start
    pub fn download_attempt(&self) {
        self.downloads_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed download
    pub fn download_success(&self) {
        self.downloads_success.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an aborted download
    pub fn download_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an acknowledged history segment
    pub fn segment_acknowledged(&self) {
        self.segments_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    /// Record historical bytes written to the sink
    pub fn history_streamed(&self, byte_count: u64) {
        self.history_bytes_streamed
            .fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a historical frame that arrived with no open sink
    pub fn history_dropped(&self) {
        self.history_frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a forwarded console line
    pub fn console_line(&self) {
        self.console_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            handshakes_total: self.handshakes_total.load(Ordering::Relaxed),
            handshakes_success: self.handshakes_success.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            downloads_total: self.downloads_total.load(Ordering::Relaxed),
            downloads_success: self.downloads_success.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            segments_acknowledged: self.segments_acknowledged.load(Ordering::Relaxed),
            history_bytes_streamed: self.history_bytes_streamed.load(Ordering::Relaxed),
            history_frames_dropped: self.history_frames_dropped.load(Ordering::Relaxed),
            console_lines: self.console_lines.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            frames_received = snapshot.frames_received,
            frames_sent = snapshot.frames_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            decode_errors = snapshot.decode_errors,
            handshakes_total = snapshot.handshakes_total,
            handshakes_success = snapshot.handshakes_success,
            handshakes_failed = snapshot.handshakes_failed,
            downloads_total = snapshot.downloads_total,
            downloads_success = snapshot.downloads_success,
            downloads_failed = snapshot.downloads_failed,
            segments_acknowledged = snapshot.segments_acknowledged,
            history_bytes_streamed = snapshot.history_bytes_streamed,
            history_frames_dropped = snapshot.history_frames_dropped,
            console_lines = snapshot.console_lines,
            uptime_seconds = snapshot.uptime_seconds,
            "Strap link metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub decode_errors: u64,
    pub handshakes_total: u64,
    pub handshakes_success: u64,
    pub handshakes_failed: u64,
    pub downloads_total: u64,
    pub downloads_success: u64,
    pub downloads_failed: u64,
    pub segments_acknowledged: u64,
    pub history_bytes_streamed: u64,
    pub history_frames_dropped: u64,
    pub console_lines: u64,
    pub uptime_seconds: u64,
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
