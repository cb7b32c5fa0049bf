//! Byte sinks for the historical data stream.
//!
//! The dispatcher writes every raw HISTORICAL_DATA frame into the shared sink while a
//! download is active. The download owns the open/close lifecycle through a
//! [`SinkGuard`], so the sink is released on every exit path.

use crate::error::constants;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Destination for raw historical frames.
pub trait ByteSink: Send {
    fn open(&mut self) -> io::Result<()>;
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()>;
    fn is_open(&self) -> bool;
}

/// Sink shared between the dispatcher task and the download loop.
pub type SharedSink = Arc<Mutex<dyn ByteSink>>;

/// Wrap a sink for sharing.
pub fn shared<S: ByteSink + 'static>(sink: S) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Lock a shared sink, recovering from poisoning.
pub fn lock(sink: &SharedSink) -> MutexGuard<'_, dyn ByteSink + 'static> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, constants::ERR_SINK_NOT_OPEN)
}

/// Buffered file sink. Each `open` truncates the file.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSink for FileSink {
    fn open(&mut self) -> io::Result<()> {
        let file = File::create(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        debug!(path = %self.path.display(), "History file opened");
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.as_mut().ok_or_else(not_open)?.write_all(bytes)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(path = %self.path.display(), "History file closed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

/// In-memory sink. Clones share the same buffer, so a test can keep one clone and hand
/// the other to a session.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    inner: Arc<Mutex<MemorySinkState>>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    data: Vec<u8>,
    open: bool,
    opens: usize,
    closes: usize,
    fail_open: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose `open` always fails.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.state().fail_open = true;
        sink
    }

    fn state(&self) -> MutexGuard<'_, MemorySinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contents(&self) -> Vec<u8> {
        self.state().data.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    pub fn close_count(&self) -> usize {
        self.state().closes
    }
}

impl ByteSink for MemorySink {
    fn open(&mut self) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_open {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                constants::ERR_SINK_OPEN_FAILED,
            ));
        }
        state.data.clear();
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        if !state.open {
            return Err(not_open());
        }
        state.data.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = self.state();
        if state.open {
            state.open = false;
            state.closes += 1;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }
}

/// Keeps a shared sink open for its lifetime and closes it on drop.
#[must_use = "the sink is closed as soon as the guard is dropped"]
pub struct SinkGuard {
    sink: Option<SharedSink>,
}

impl SinkGuard {
    /// Open `sink` and guard it.
    pub fn open(sink: SharedSink) -> io::Result<Self> {
        lock(&sink).open()?;
        Ok(Self { sink: Some(sink) })
    }

    /// Close now and report any flush error.
    pub fn finish(mut self) -> io::Result<()> {
        match self.sink.take() {
            Some(sink) => lock(&sink).close(),
            None => Ok(()),
        }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = lock(&sink).close() {
                warn!(error = %e, "Failed to close history sink");
            }
        }
    }
}
