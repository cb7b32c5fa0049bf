//! # Protocol Layer
//!
//! Stateful strap protocol logic on top of the [`core`](crate::core) wire format.
//!
//! - [`correlator`]: suspend-until-available queues pairing requests with responses
//! - [`handshake`]: serial-keyed CMAC challenge/response run once per connection
//! - [`dispatcher`]: routes every inbound notification to a correlator, the history
//!   sink or the presentation layer
//! - [`history`]: the metadata-acknowledged paging loop for historical downloads
//!
//! The handshake and the download loop are the only consumers of the correlators, and
//! each monopolizes its correlator while running.

pub mod correlator;
pub mod dispatcher;
pub mod handshake;
pub mod history;


use crate::core::packet::{packet_to_hex_string, Packet};
use crate::error::{constants, ProtocolError, Result};
use crate::transport::Transport;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout_error;
use std::time::Duration;
use tracing::trace;

/// Frame `packet` and write it with a deadline.
pub(crate) async fn send_packet<T: Transport>(
    transport: &T,
    packet: &Packet,
    write_timeout: Duration,
    metrics: &Metrics,
) -> Result<()> {
    let frame = packet.encode()?;
    trace!(%packet, frame = %packet_to_hex_string(&frame), "Sending frame");

    write_frame(transport, &frame, write_timeout).await?;
    metrics.frame_sent(frame.len() as u64);
    Ok(())
}

/// Write an already framed packet with a deadline.
pub(crate) async fn write_frame<T: Transport>(
    transport: &T,
    frame: &[u8],
    write_timeout: Duration,
) -> Result<()> {
    with_timeout_error(transport.write(frame), write_timeout)
        .await
        .map_err(|e| match e {
            ProtocolError::Timeout => {
                ProtocolError::TransportError(constants::ERR_WRITE_TIMEOUT.to_string())
            }
            other => other,
        })
}
