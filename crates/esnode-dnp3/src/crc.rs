//! DNP3 CRC-16 engine.
//!
//! Table-driven CRC-16 with reflected polynomial 0xA6BC, initial value
//! 0x0000, and final XOR 0xFFFF. Matches the `crc` crate's `CRC_16_DNP`
//! parameter set.

use crc::Crc;

static DNP3_CRC: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_DNP);

/// Compute the DNP3 CRC-16 over `data`.
pub fn calculate(data: &[u8]) -> u16 {
    DNP3_CRC.checksum(data)
}

/// Verify that `data`'s CRC equals `expected`.
pub fn verify(data: &[u8], expected: u16) -> bool {
    calculate(data) == expected
}

/// Append the little-endian CRC of `data` to a copy of `data`.
pub fn append(data: &[u8]) -> Vec<u8> {
    let crc = calculate(data);
    let mut out = Vec::with_capacity(data.len() + 2);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}
