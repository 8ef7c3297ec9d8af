//! CRC-64 used by the snapshot trailer.
//!
//! Reflected ECMA-182 polynomial with all-ones initial value and final complement, i.e. the
//! CRC-64/XZ profile the snapshot format stipulates.

const REFLECTED_POLY: u64 = 0xC96C_5795_D787_0F42;

const TABLE: [u64; 256] = build_table();

const fn build_table() -> [u64; 256] {
    let mut table = [0_u64; 256];
    let mut index = 0_usize;
    while index < 256 {
        let mut crc = index as u64;
        let mut bit = 0_u8;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ REFLECTED_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

/// Computes the checksum of one full payload.
#[must_use]
pub fn checksum(payload: &[u8]) -> u64 {
    let mut crc = u64::MAX;
    for &byte in payload {
        let index = usize::from((crc as u8) ^ byte);
        crc = TABLE[index] ^ (crc >> 8);
    }
    !crc
}
