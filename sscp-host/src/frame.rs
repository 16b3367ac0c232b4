//! The framed transport codec (`ExchangeRaw`): SOF/length/address/protocol
//! framing with CRC-16/CCITT-FALSE, two-phase receive with distinct
//! first-byte/inter-byte timeouts.
//!
//! ```text
//! +------+------+------+------+------+-- payload --+------+------+
//! | 0x02 |  LEN (2 bytes)     | ADDR | PROTO| ...  | CRC (2 bytes)|
//! +------+--------------------+------+------+------+--------------+
//! ```

use std::time::Duration;

use crate::crc;
use crate::error::{SscpError, SscpResult};
use crate::transport::SerialPort;

/// Start-of-frame sentinel.
pub const SOF: u8 = 0x02;
/// Mutual-authentication protocol byte.
pub const PROTO_AUTHENTICATE: u8 = 0x20;
/// Secure-exchange protocol byte.
pub const PROTO_SECURE: u8 = 0x21;

/// Bytes preceding the payload: SOF, 2 LEN bytes, ADDR, PROTO.
const HEADER_LEN: usize = 5;
const CRC_LEN: usize = 2;
/// Largest payload the codec will encode or accept on decode.
pub const MAX_PAYLOAD: usize = 4096;

/// Default duration to wait for the reader to start responding at all.
/// [`crate::session::SessionConfig::first_timeout`] defaults to this but can
/// be overridden per session.
pub const FIRST_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default duration any single subsequent read within a frame may take.
/// [`crate::session::SessionConfig::next_timeout`] defaults to this but can
/// be overridden per session.
pub const NEXT_TIMEOUT: Duration = Duration::from_millis(300);

/// Encodes one request frame: `addr`, `proto`, and `command_bytes` (the
/// unencrypted authenticate payload, or the encrypted secure-exchange
/// payload — the codec itself never interprets the payload).
pub fn encode_frame(addr: u8, proto: u8, command_bytes: &[u8]) -> SscpResult<Vec<u8>> {
    if command_bytes.len() > MAX_PAYLOAD {
        return Err(SscpError::CommandTooLong(command_bytes.len()));
    }
    let len = command_bytes.len() as u16;

    let mut signed_region = Vec::with_capacity(4 + command_bytes.len());
    signed_region.extend_from_slice(&len.to_be_bytes());
    signed_region.push(addr);
    signed_region.push(proto);
    signed_region.extend_from_slice(command_bytes);

    let crc = crc::checksum(&signed_region);

    let mut frame = Vec::with_capacity(1 + signed_region.len() + CRC_LEN);
    frame.push(SOF);
    frame.extend_from_slice(&signed_region);
    frame.extend_from_slice(&crc.to_be_bytes());
    Ok(frame)
}

/// Reads one response frame from `port` and returns its payload.
///
/// `max_response_sz` bounds the payload the caller is willing to accept;
/// a header declaring more fails with [`SscpError::ResponseTooLong`] before
/// any payload bytes are read. `first_timeout`/`next_timeout` are the
/// session's configured first-byte/inter-byte timeouts (see
/// [`crate::session::SessionConfig`]) — callers with a slower reader or a
/// tighter link budget can override the [`FIRST_TIMEOUT`]/[`NEXT_TIMEOUT`]
/// defaults by configuring them there rather than patching this module.
///
/// ADDR and PROTO are not validated against the request that solicited this
/// response — firmware that reuses the request's ADDR/PROTO verbatim is
/// accommodated as-is, per the protocol's own design notes.
pub fn decode_frame(
    port: &mut dyn SerialPort,
    max_response_sz: usize,
    first_timeout: Duration,
    next_timeout: Duration,
) -> SscpResult<Vec<u8>> {
    port.set_first_byte_timeout(first_timeout)
        .map_err(|_| SscpError::PortConfigureFailed)?;

    let mut header = [0u8; HEADER_LEN];
    recv_exact(port, &mut header, false)?;

    if header[0] != SOF {
        return Err(SscpError::WrongResponseCommand);
    }
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;
    let addr = header[3];
    let proto = header[4];
    if len > max_response_sz {
        return Err(SscpError::ResponseTooLong(len));
    }
    if len > MAX_PAYLOAD {
        return Err(SscpError::ResponseTooLong(len));
    }

    port.set_inter_byte_timeout(next_timeout)
        .map_err(|_| SscpError::PortConfigureFailed)?;

    let mut rest = vec![0u8; len + CRC_LEN];
    // The header was already fully received, so any stall from here on is
    // an upgrade from MUTE to STOPPED: partial data is already in hand.
    recv_exact(port, &mut rest, true)?;

    let payload = rest[..len].to_vec();
    let crc_bytes = [rest[len], rest[len + 1]];
    let received_crc = u16::from_be_bytes(crc_bytes);

    let mut signed_region = Vec::with_capacity(4 + len);
    signed_region.extend_from_slice(&header[1..5]);
    signed_region.extend_from_slice(&payload);
    let expected_crc = crc::checksum(&signed_region);

    if received_crc != expected_crc {
        return Err(SscpError::WrongResponseCrc);
    }

    let _ = (addr, proto);
    Ok(payload)
}

/// Fills `buf` completely or fails with a timeout-shaped error.
///
/// `prior_bytes_received` is true once some earlier phase of this frame
/// (e.g. the header) has already landed bytes — per spec, any stall after
/// that point is `RecvStopped`, never `RecvMute`.
fn recv_exact(port: &mut dyn SerialPort, buf: &mut [u8], prior_bytes_received: bool) -> SscpResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = port
            .read(&mut buf[filled..])
            .map_err(|_| SscpError::RecvFailed)?;
        if n == 0 {
            return if filled == 0 && !prior_bytes_received {
                Err(SscpError::RecvMute)
            } else {
                Err(SscpError::RecvStopped)
            };
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakePort;

    #[test]
    fn encode_known_frame() {
        let mut payload = vec![0x00, 0x00];
        payload.extend_from_slice(&[
            0x75, 0xCC, 0xF7, 0xB1, 0xF7, 0xFE, 0xA6, 0xF7, 0x58, 0x71, 0xFC, 0xF6, 0xDC, 0x75,
            0x59, 0x23,
        ]);
        let frame = encode_frame(0x00, PROTO_AUTHENTICATE, &payload).unwrap();
        assert_eq!(frame[0], SOF);
        assert_eq!(u16::from_be_bytes([frame[1], frame[2]]), 0x0012);
        assert_eq!(frame[3], 0x00);
        assert_eq!(frame[4], PROTO_AUTHENTICATE);

        let signed_region = &frame[1..frame.len() - 2];
        let crc = crc::checksum(signed_region);
        let crc_bytes = &frame[frame.len() - 2..];
        assert_eq!(crc.to_be_bytes(), crc_bytes);
    }

    #[test]
    fn command_too_long_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            encode_frame(0, PROTO_SECURE, &payload),
            Err(SscpError::CommandTooLong(_))
        ));
    }

    #[test]
    fn round_trip_through_fake_port() {
        let payload = vec![1, 2, 3, 4, 5];
        let frame = encode_frame(0x07, PROTO_SECURE, &payload).unwrap();
        let mut port = FakePort::new(frame);
        let decoded = decode_frame(&mut port, 4096, FIRST_TIMEOUT, NEXT_TIMEOUT).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn custom_timeouts_are_forwarded_to_the_port() {
        let payload = vec![1, 2, 3];
        let frame = encode_frame(0x00, PROTO_SECURE, &payload).unwrap();
        let mut port = FakePort::new(frame);
        let custom_first = Duration::from_millis(9000);
        let custom_next = Duration::from_millis(750);
        decode_frame(&mut port, 4096, custom_first, custom_next).unwrap();
        assert_eq!(port.last_first_byte_timeout, Some(custom_first));
        assert_eq!(port.last_inter_byte_timeout, Some(custom_next));
    }

    #[test]
    fn bad_crc_rejected() {
        let payload = vec![9, 9, 9];
        let mut frame = encode_frame(0, PROTO_SECURE, &payload).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        let mut port = FakePort::new(frame);
        assert!(matches!(
            decode_frame(&mut port, 4096, FIRST_TIMEOUT, NEXT_TIMEOUT),
            Err(SscpError::WrongResponseCrc)
        ));
    }

    #[test]
    fn wrong_sof_rejected() {
        let payload = vec![1];
        let mut frame = encode_frame(0, PROTO_SECURE, &payload).unwrap();
        frame[0] = 0x03;
        let mut port = FakePort::new(frame);
        assert!(matches!(
            decode_frame(&mut port, 4096, FIRST_TIMEOUT, NEXT_TIMEOUT),
            Err(SscpError::WrongResponseCommand)
        ));
    }

    #[test]
    fn no_bytes_at_all_is_mute() {
        let mut port = FakePort::empty();
        assert!(matches!(
            decode_frame(&mut port, 4096, FIRST_TIMEOUT, NEXT_TIMEOUT),
            Err(SscpError::RecvMute)
        ));
    }

    #[test]
    fn header_received_then_stall_is_stopped() {
        // Full 5-byte header declaring a payload that never arrives.
        let mut port = FakePort::new(vec![SOF, 0x00, 0x03, 0x00, PROTO_SECURE]);
        assert!(matches!(
            decode_frame(&mut port, 4096, FIRST_TIMEOUT, NEXT_TIMEOUT),
            Err(SscpError::RecvStopped)
        ));
    }

    #[test]
    fn response_too_long_rejected_before_payload_read() {
        let mut port = FakePort::new(vec![SOF, 0x10, 0x00, 0x00, PROTO_SECURE]);
        assert!(matches!(
            decode_frame(&mut port, 16, FIRST_TIMEOUT, NEXT_TIMEOUT),
            Err(SscpError::ResponseTooLong(_))
        ));
    }
}
