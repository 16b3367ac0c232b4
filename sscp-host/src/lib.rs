//! Host-side client library for SSCPv2 — a framed, encrypted, mutually
//! authenticated serial protocol between a host and an NFC reader/coupler.
//!
//! A caller opens a [`SessionContext`] against a real port (or runs
//! entirely in self-test [`Mode`], with no port at all), authenticates it
//! via [`auth::authenticate`], and then drives command wrappers in
//! [`commands`] — each one a thin marshaller over the secure exchange
//! pipeline in [`exchange`].
//!
//! Single-threaded, synchronous, blocking: one context owns one port for
//! its entire lifetime, and is not safe to share across threads without
//! external synchronization (see [`session::SessionContext`]'s `!Sync`
//! note). No async I/O, no multiplexed sessions, no TCP/USB transports —
//! those are explicit non-goals.

pub mod auth;
pub mod commands;
pub mod crc;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod frame;
pub mod guard_time;
pub mod mode;
pub mod session;
pub mod transport;

pub use crypto::DEFAULT_TRANSPORT_KEY;
pub use error::{SscpError, SscpResult};
pub use exchange::CommandHeader;
pub use mode::Mode;
pub use session::{DebugConfig, SessionConfig, SessionContext, SessionStats};
pub use transport::{BaudRate, RealSerialPort, SerialPort};
