//! Flat error taxonomy shared by every public entry point.
//!
//! Device-reported status bytes (the final status byte of a decrypted
//! secure response, when nonzero) are propagated as [`SscpError::DeviceStatus`]
//! through the same channel as local validation errors, per the protocol's
//! own error-handling design: callers distinguish the two by matching on
//! the variant, not by sign or range as the original C ABI required.

use thiserror::Error;

/// Every fallible operation in this crate returns this.
#[derive(Debug, Error)]
pub enum SscpError {
    // -- invalid use --
    #[error("invalid context")]
    InvalidContext,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("not yet implemented")]
    NotImplemented,
    #[error("output buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    // -- size --
    #[error("command too long: {0} bytes")]
    CommandTooLong(usize),
    #[error("response too long: {0} bytes")]
    ResponseTooLong(usize),

    // -- internal --
    #[error("internal failure: {0}")]
    Internal(&'static str),

    // -- transport --
    #[error("port not available")]
    PortNotAvailable,
    #[error("port not open")]
    PortNotOpen,
    #[error("port configure failed")]
    PortConfigureFailed,
    #[error("send failed")]
    SendFailed,
    #[error("recv failed")]
    RecvFailed,
    #[error("recv stopped mid-frame")]
    RecvStopped,
    #[error("recv mute (no bytes received)")]
    RecvMute,

    // -- frame / secure-exchange validation --
    #[error("wrong response length")]
    WrongResponseLength,
    #[error("wrong response CRC")]
    WrongResponseCrc,
    #[error("wrong response signature")]
    WrongResponseSignature,
    #[error("wrong response counter")]
    WrongResponseCounter,
    #[error("wrong response type")]
    WrongResponseType,
    #[error("wrong response command")]
    WrongResponseCommand,
    #[error("wrong response format")]
    WrongResponseFormat,

    // -- application --
    #[error("unsupported response status, value, or length")]
    UnsupportedResponse,

    // -- card (TransceiveAPDU) --
    #[error("NFC card absent")]
    CardAbsent,
    #[error("NFC card mute or removed")]
    CardMuteOrRemoved,
    #[error("NFC card communication error")]
    CardCommError,

    /// Nonzero status byte returned by the reader in a validated secure
    /// response. A small positive device status, not a library error.
    #[error("device reported status 0x{0:02X}")]
    DeviceStatus(u8),

    /// `counter` reached `0xFFFF_FFFF`; re-authenticate rather than wrap.
    #[error("session exhausted, re-authenticate")]
    SessionExhausted,
}

pub type SscpResult<T> = Result<T, SscpError>;
