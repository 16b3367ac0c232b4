//! CRC-16/CCITT-FALSE over `LEN‖ADDR‖PROTO‖payload`.
//!
//! poly = 0x1021, init = 0xFFFF, no input/output reflection, no final xor.

use crc::{Algorithm, Crc};

const CCITT_FALSE: Algorithm<u16> = Algorithm {
    width: 16,
    poly: 0x1021,
    init: 0xFFFF,
    refin: false,
    refout: false,
    xorout: 0x0000,
    check: 0x29B1,
    residue: 0x0000,
};

/// Computes the CRC-16/CCITT-FALSE checksum of `data`.
pub fn checksum(data: &[u8]) -> u16 {
    let crc = Crc::<u16>::new(&CCITT_FALSE);
    crc.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // "123456789" is the standard CRC check string; CCITT-FALSE's
        // defined check value is 0x29B1.
        assert_eq!(checksum(b"123456789"), 0x29B1);
    }

    #[test]
    fn empty_input() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }
}
