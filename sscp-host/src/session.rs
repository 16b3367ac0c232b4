//! Session context: the one piece of mutable state a caller owns across the
//! lifetime of an open port — address, counter, session keys, guard-time
//! state, and stats.
//!
//! Lifecycle: allocated (all zero, invalid handle) → opened (serial
//! configured, `when_open` stamped) → authenticated (keys populated,
//! counter = 1) → may perform secure exchanges → closed (serial released,
//! keys zeroized) → freed.

use std::time::{Duration, SystemTime};

use tracing::info;
use zeroize::Zeroize;

use crate::error::{SscpError, SscpResult};
use crate::frame;
use crate::guard_time::GuardTime;
use crate::transport::{BaudRate, SerialPort};

/// Per-context debug flags. The original source exposed these as
/// process-wide mutable globals (`SELFTEST`, `DEBUG_EXCHANGE`,
/// `DEBUG_AUTHENTICATE`); here they are plain construction-time fields,
/// eliminating the global mutable state.
#[derive(Clone, Copy, Debug, Default)]
pub struct DebugConfig {
    /// Substitutes deterministic vectors for the RNG and reader responses;
    /// does not open the serial port.
    pub self_test: bool,
    pub debug_exchange: bool,
    pub debug_authenticate: bool,
}

/// Construction-time configuration for a session.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    /// RS-485 target address (0-127), or 0 for RS-232.
    pub address: u8,
    pub baud: BaudRate,
    pub first_timeout: Duration,
    pub next_timeout: Duration,
    pub max_timeout_retry: u8,
    pub debug: DebugConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: 0,
            baud: BaudRate::B115200,
            first_timeout: frame::FIRST_TIMEOUT,
            next_timeout: frame::NEXT_TIMEOUT,
            max_timeout_retry: 3,
            debug: DebugConfig::default(),
        }
    }
}

/// Wall-clock and counter statistics, per spec.md §3.
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionStats {
    pub when_open: Option<SystemTime>,
    pub when_session: Option<SystemTime>,
    pub session_count: u32,
    /// Recovered timeouts only — see the exchanger's retry policy.
    pub error_count: u32,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// The four session keys, held together so they can be zeroized as a unit.
#[derive(Clone, Copy, Default, Zeroize)]
pub struct SessionKeyMaterial {
    pub k_cipher_ab: [u8; 16],
    pub k_cipher_ba: [u8; 16],
    pub k_sign_ab: [u8; 16],
    pub k_sign_ba: [u8; 16],
}

impl From<crate::crypto::SessionKeys> for SessionKeyMaterial {
    fn from(k: crate::crypto::SessionKeys) -> Self {
        Self {
            k_cipher_ab: k.k_cipher_ab,
            k_cipher_ba: k.k_cipher_ba,
            k_sign_ab: k.k_sign_ab,
            k_sign_ba: k.k_sign_ba,
        }
    }
}

/// Owns one serial port for its entire lifetime. Not `Sync`: the trait
/// object inside it carries no such bound, so the type system itself rules
/// out sharing a context across threads without external synchronization.
pub struct SessionContext {
    transport: Option<Box<dyn SerialPort>>,
    pub address: u8,
    pub counter: u32,
    keys: Option<SessionKeyMaterial>,
    pub guard_time: GuardTime,
    pub stats: SessionStats,
    pub config: SessionConfig,
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.keys.zeroize();
    }
}

impl SessionContext {
    /// Allocates a context in its initial, unopened state.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            transport: None,
            address: config.address,
            counter: 0,
            keys: None,
            guard_time: GuardTime::new(),
            stats: SessionStats::default(),
            config,
        }
    }

    /// Installs an already-opened transport and stamps `when_open`.
    /// Self-test sessions never call this.
    pub fn open(&mut self, transport: Box<dyn SerialPort>) {
        self.transport = Some(transport);
        self.stats.when_open = Some(SystemTime::now());
        info!(address = self.address, "port opened");
    }

    /// Releases the transport and zeroizes any session keys. The context
    /// may be reopened and re-authenticated afterward.
    pub fn close(&mut self) {
        self.keys.zeroize();
        self.keys = None;
        self.transport = None;
        self.counter = 0;
        info!(address = self.address, "session closed");
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.keys.is_some()
    }

    pub(crate) fn transport_mut(&mut self) -> SscpResult<&mut dyn SerialPort> {
        self.transport.as_deref_mut().ok_or(SscpError::PortNotOpen)
    }

    pub(crate) fn keys(&self) -> SscpResult<&SessionKeyMaterial> {
        self.keys.as_ref().ok_or(SscpError::InvalidContext)
    }

    /// Installs session keys from a successful handshake: resets `counter`
    /// to 1 and stamps session stats, per spec.md §4.3 post-conditions.
    pub(crate) fn install_keys(&mut self, keys: SessionKeyMaterial) {
        self.keys = Some(keys);
        self.counter = 1;
        self.stats.session_count += 1;
        self.stats.when_session = Some(SystemTime::now());
    }

    /// Validates a response counter against the session's monotonic
    /// counter and advances it. `0xFFFF_FFFF` is treated as session
    /// exhaustion rather than allowed to wrap, per spec.md §9.
    pub(crate) fn validate_and_advance_counter(&mut self, decoded: u32) -> SscpResult<()> {
        if decoded <= self.counter {
            return Err(SscpError::WrongResponseCounter);
        }
        if decoded == u32::MAX {
            return Err(SscpError::SessionExhausted);
        }
        self.counter = decoded + 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakePort;

    #[test]
    fn fresh_context_is_unopened_and_unauthenticated() {
        let ctx = SessionContext::new(SessionConfig::default());
        assert!(!ctx.is_open());
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.counter, 0);
    }

    #[test]
    fn open_stamps_when_open() {
        let mut ctx = SessionContext::new(SessionConfig::default());
        ctx.open(Box::new(FakePort::empty()));
        assert!(ctx.is_open());
        assert!(ctx.stats.when_open.is_some());
    }

    #[test]
    fn install_keys_resets_counter_to_one() {
        let mut ctx = SessionContext::new(SessionConfig::default());
        ctx.counter = 999;
        ctx.install_keys(SessionKeyMaterial::default());
        assert_eq!(ctx.counter, 1);
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.stats.session_count, 1);
    }

    #[test]
    fn close_clears_keys_and_transport() {
        let mut ctx = SessionContext::new(SessionConfig::default());
        ctx.open(Box::new(FakePort::empty()));
        ctx.install_keys(SessionKeyMaterial::default());
        ctx.close();
        assert!(!ctx.is_open());
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.counter, 0);
    }

    #[test]
    fn counter_must_strictly_increase() {
        let mut ctx = SessionContext::new(SessionConfig::default());
        ctx.install_keys(SessionKeyMaterial::default());
        assert_eq!(ctx.counter, 1);
        assert!(matches!(
            ctx.validate_and_advance_counter(1),
            Err(SscpError::WrongResponseCounter)
        ));
        assert!(ctx.validate_and_advance_counter(5).is_ok());
        assert_eq!(ctx.counter, 6);
    }

    #[test]
    fn max_counter_is_session_exhaustion() {
        let mut ctx = SessionContext::new(SessionConfig::default());
        ctx.install_keys(SessionKeyMaterial::default());
        assert!(matches!(
            ctx.validate_and_advance_counter(u32::MAX),
            Err(SscpError::SessionExhausted)
        ));
    }
}
