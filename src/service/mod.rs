//! # Service Layer
//!
//! Connection-level orchestration.
//!
//! - [`session`]: the per-connection [`Session`](session::Session) that runs the
//!   handshake, issues commands and drives historical downloads

pub mod session;
