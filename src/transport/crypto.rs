//! CMAC primitive used to answer the session challenge.

use crate::error::{HandshakeError, Result};
use aes::Aes128;
use cmac::{Cmac, Mac};

/// Message authentication with a 16-byte key and 16-byte tag.
pub trait CmacPrimitive: Send + Sync {
    fn cmac(&self, key: &[u8; 16], message: &[u8]) -> Result<[u8; 16]>;
}

/// AES-128 CMAC (RFC 4493).
#[derive(Debug, Default, Clone, Copy)]
pub struct AesCmac;

impl CmacPrimitive for AesCmac {
    fn cmac(&self, key: &[u8; 16], message: &[u8]) -> Result<[u8; 16]> {
        let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
            .map_err(|e| HandshakeError::Crypto(e.to_string()))?;
        mac.update(message);

        let tag = mac.finalize().into_bytes();
        let mut out = [0u8; 16];
        out.copy_from_slice(&tag);
        Ok(out)
    }
}
