//! Session handshake: a CMAC-AES challenge/response keyed by the device serial.
//!
//! ```text
//! host                                   strap
//!  | -- COMMAND START_SESSION ----------> |
//!  | <- response, payload[0..16] = rand - |
//!  |    key = derive(serial)              |
//!  | -- COMMAND SESSION_RESPONSE -------> |
//!  |    payload = CMAC(key, rand)         |
//! ```
//!
//! The strap sends no explicit acceptance. Success is inferred when later commands go
//! through without the link being dropped.
//!
//! **Per-connection state**: the derived secret lives only for the duration of one
//! [`AuthHandshake::perform`] call and is zeroized when dropped.

use crate::core::constants::CommandNumber;
use crate::core::packet::Packet;
use crate::error::{constants, HandshakeError, ProtocolError};
use crate::protocol::correlator::ResponseCorrelator;
use crate::protocol::send_packet;
use crate::transport::crypto::CmacPrimitive;
use crate::transport::{DeviceInfo, Transport};
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Session key length in bytes.
pub const SESSION_KEY_LEN: usize = 16;

/// Challenge length in bytes.
pub const CHALLENGE_LEN: usize = 16;

/// How the 16-byte session key is built from the serial string.
///
/// Two variants are seen in the field and neither is confirmed against firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDerivation {
    /// Null-pad to 16 bytes, truncate to 16, reverse.
    #[default]
    PadTruncateReverse,
    /// Reverse the first 16 bytes. Serials shorter than 16 bytes are rejected.
    ReverseTruncated,
}

/// 16-byte symmetric key for one connection.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; SESSION_KEY_LEN]);

impl SessionSecret {
    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret([REDACTED])")
    }
}

/// Derive the session key from a serial number string.
pub fn derive_session_secret(
    serial: &str,
    derivation: KeyDerivation,
) -> Result<SessionSecret, HandshakeError> {
    let bytes = serial.as_bytes();
    if bytes.is_empty() {
        return Err(HandshakeError::MissingSerial);
    }

    let mut key = [0u8; SESSION_KEY_LEN];
    match derivation {
        KeyDerivation::PadTruncateReverse => {
            let n = bytes.len().min(SESSION_KEY_LEN);
            key[..n].copy_from_slice(&bytes[..n]);
        }
        KeyDerivation::ReverseTruncated => {
            if bytes.len() < SESSION_KEY_LEN {
                return Err(HandshakeError::UnsupportedSerial(
                    constants::ERR_SHORT_SERIAL,
                ));
            }
            key.copy_from_slice(&bytes[..SESSION_KEY_LEN]);
        }
    }
    key.reverse();

    let secret = SessionSecret(key);
    key.zeroize();
    Ok(secret)
}

/// Tag the strap expects in SESSION_RESPONSE for `challenge`.
pub fn challenge_response<C: CmacPrimitive + ?Sized>(
    cmac: &C,
    secret: &SessionSecret,
    challenge: &[u8; CHALLENGE_LEN],
) -> Result<[u8; 16], HandshakeError> {
    cmac.cmac(secret.as_bytes(), challenge).map_err(|e| match e {
        ProtocolError::Handshake(inner) => inner,
        other => HandshakeError::Crypto(other.to_string()),
    })
}

/// Progress of one handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    SessionStarted,
    ChallengeReceived,
    ResponseSent,
    Authenticated,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Authenticated | HandshakeState::Failed)
    }
}

/// One run of the challenge/response exchange over borrowed connection resources.
pub struct AuthHandshake<'a, T, D, C: ?Sized> {
    transport: &'a T,
    device_info: &'a D,
    cmac: &'a C,
    commands: &'a ResponseCorrelator,
    metrics: &'a Metrics,
    derivation: KeyDerivation,
    challenge_timeout: Duration,
    write_timeout: Duration,
    state: HandshakeState,
}

impl<'a, T, D, C> AuthHandshake<'a, T, D, C>
where
    T: Transport,
    D: DeviceInfo,
    C: CmacPrimitive + ?Sized,
{
    pub fn new(
        transport: &'a T,
        device_info: &'a D,
        cmac: &'a C,
        commands: &'a ResponseCorrelator,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            transport,
            device_info,
            cmac,
            commands,
            metrics,
            derivation: KeyDerivation::default(),
            challenge_timeout: crate::utils::timeout::DEFAULT_HANDSHAKE_TIMEOUT,
            write_timeout: crate::utils::timeout::DEFAULT_WRITE_TIMEOUT,
            state: HandshakeState::Idle,
        }
    }

    pub fn with_derivation(mut self, derivation: KeyDerivation) -> Self {
        self.derivation = derivation;
        self
    }

    pub fn with_timeouts(mut self, challenge: Duration, write: Duration) -> Self {
        self.challenge_timeout = challenge;
        self.write_timeout = write;
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Run the exchange to a terminal state.
    #[instrument(skip_all, name = "auth_handshake", fields(derivation = ?self.derivation))]
    pub async fn perform(&mut self) -> Result<(), HandshakeError> {
        self.metrics.handshake_attempt();

        match self.exchange().await {
            Ok(()) => {
                self.state = HandshakeState::Authenticated;
                self.metrics.handshake_success();
                info!("Session authenticated");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, state = ?self.state, "Handshake failed");
                self.state = HandshakeState::Failed;
                self.metrics.handshake_failed();
                Err(e)
            }
        }
    }

    async fn exchange(&mut self) -> Result<(), HandshakeError> {
        let stale = self.commands.drain();
        if stale > 0 {
            debug!(stale, "Discarded stale command responses");
        }

        self.send(Packet::command(CommandNumber::StartSession, Vec::new()))
            .await?;
        self.state = HandshakeState::SessionStarted;

        let response = match with_timeout(self.commands.dequeue(), self.challenge_timeout).await {
            Some(Some(packet)) => packet,
            Some(None) => return Err(HandshakeError::LinkLost),
            None => return Err(HandshakeError::ChallengeTimeout),
        };

        let challenge: [u8; CHALLENGE_LEN] = response
            .payload
            .get(..CHALLENGE_LEN)
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(HandshakeError::ShortChallenge(response.payload.len()))?;
        self.state = HandshakeState::ChallengeReceived;
        debug!(cmd = response.cmd, "Challenge received");

        let serial = self
            .device_info
            .read_serial()
            .await
            .map_err(|e| HandshakeError::Transport(e.to_string()))?
            .ok_or(HandshakeError::MissingSerial)?;

        let secret = derive_session_secret(&serial, self.derivation)?;
        let tag = challenge_response(self.cmac, &secret, &challenge)?;
        drop(secret);

        self.send(Packet::command(CommandNumber::SessionResponse, tag.to_vec()))
            .await?;
        self.state = HandshakeState::ResponseSent;
        Ok(())
    }

    async fn send(&self, packet: Packet) -> Result<(), HandshakeError> {
        send_packet(self.transport, &packet, self.write_timeout, self.metrics)
            .await
            .map_err(|e| HandshakeError::Transport(e.to_string()))
    }
}
