//! Extended binary Golay(24,12,8) codec.
//!
//! Built from the (23,12,7) perfect cyclic Golay code with generator
//! polynomial `g(x) = x^11 + x^9 + x^7 + x^6 + x^5 + x + 1` (one of the two
//! standard reciprocal generators for the binary Golay code), extended with
//! an overall even-parity bit to reach distance 8. Because the base (23,12,7)
//! code is a perfect code (every word is within Hamming distance 3 of exactly
//! one codeword), the 11-bit cyclic remainder combined with the 1-bit parity
//! check injectively covers every weight-<=3 error pattern over the full 24
//! bits — the syndrome table built below is a correctness property of the
//! construction, not a lookup that can silently collide.

use std::sync::OnceLock;

/// `g(x)` including the implicit leading `x^11` term, for documentation;
/// only the low 11 bits (the LFSR taps) are used at runtime.
const GENERATOR_POLY: u16 = 0b1010_1110_0011; // 0xAE3
const TAPS: u16 = GENERATOR_POLY & 0x7FF;

/// CRC-style bit-serial division: feeds `bits` (MSB-first, values 0/1) through
/// an 11-bit LFSR and returns the final register contents (`bits(x) mod g(x)`).
fn crc_remainder(bits: impl Iterator<Item = u8>) -> u16 {
    let mut reg: u16 = 0;
    for b in bits {
        let feedback = b ^ ((reg >> 10) & 1) as u8;
        reg = (reg << 1) & 0x7FF;
        if feedback == 1 {
            reg ^= TAPS;
        }
    }
    reg
}

fn bits_msb_first(value: u32, width: u32) -> impl Iterator<Item = u8> {
    (0..width).rev().map(move |i| ((value >> i) & 1) as u8)
}

/// Encodes 12 data bits into a 24-bit extended Golay codeword:
/// `[12 data bits][11 cyclic parity bits][1 overall-parity bit]`.
pub fn encode(data12: u16) -> u32 {
    let data12 = (data12 & 0xFFF) as u32;
    let parity11 = crc_remainder(bits_msb_first(data12, 12).chain(std::iter::repeat(0).take(11)));
    let codeword23 = (data12 << 11) | parity11 as u32;
    let overall_parity = (codeword23.count_ones() & 1) as u32;
    (codeword23 << 1) | overall_parity
}

/// Combined 12-bit syndrome: 11-bit cyclic remainder of the 23-bit body, plus
/// 1 bit for overall-parity consistency. Zero iff `codeword24` is a valid
/// codeword.
fn syndrome(codeword24: u32) -> u16 {
    let codeword23 = codeword24 >> 1;
    let overall_bit = (codeword24 & 1) as u32;
    let remainder = crc_remainder(bits_msb_first(codeword23, 23));
    let parity_syndrome = ((codeword23.count_ones() & 1) ^ overall_bit) as u16;
    (remainder << 1) | parity_syndrome
}

struct SyndromeTable {
    map: std::collections::HashMap<u16, u32>,
}

fn table() -> &'static SyndromeTable {
    static TABLE: OnceLock<SyndromeTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut map = std::collections::HashMap::new();
        map.insert(0u16, 0u32);
        for weight in 1..=3usize {
            for pattern in combinations_24(weight) {
                map.entry(syndrome(pattern)).or_insert(pattern);
            }
        }
        SyndromeTable { map }
    })
}

fn combinations_24(weight: usize) -> Vec<u32> {
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..weight).collect();
    loop {
        let mut bits = 0u32;
        for &i in &idx {
            bits |= 1 << i;
        }
        out.push(bits);

        let mut i = weight;
        loop {
            if i == 0 {
                return out;
            }
            i -= 1;
            if idx[i] != i + 24 - weight {
                idx[i] += 1;
                for j in (i + 1)..weight {
                    idx[j] = idx[j - 1] + 1;
                }
                break;
            }
        }
    }
}

/// Outcome of a Golay(24,12) decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GolayOutcome {
    Clean,
    Corrected { bit_errors: u32 },
    Uncorrectable,
}

/// Decodes a 24-bit Golay codeword, returning the corrected 12 data bits and
/// the outcome. Corrects up to 3 bit errors anywhere in the 24-bit word.
pub fn decode(codeword24: u32) -> (u16, GolayOutcome) {
    let s = syndrome(codeword24);
    if s == 0 {
        return (((codeword24 >> 12) & 0xFFF) as u16, GolayOutcome::Clean);
    }
    match table().map.get(&s) {
        Some(&err) => {
            let corrected = codeword24 ^ err;
            let data = ((corrected >> 12) & 0xFFF) as u16;
            (data, GolayOutcome::Corrected { bit_errors: err.count_ones() })
        }
        None => (((codeword24 >> 12) & 0xFFF) as u16, GolayOutcome::Uncorrectable),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips_with_no_errors() {
        for data in [0u16, 1, 0xFFF, 0xA5A, 0x123] {
            let cw = encode(data);
            let (decoded, outcome) = decode(cw);
            assert_eq!(decoded, data);
            assert_eq!(outcome, GolayOutcome::Clean);
        }
    }

    #[test]
    fn corrects_up_to_three_bit_errors() {
        let data = 0b1010_1100_1101;
        let cw = encode(data);
        for &err in &[0b1u32, 0b11, 0b111, 1 << 23, (1 << 23) | (1 << 10) | 1] {
            let corrupted = cw ^ err;
            let (decoded, outcome) = decode(corrupted);
            assert_eq!(decoded, data, "failed for error pattern {err:#x}");
            assert!(matches!(outcome, GolayOutcome::Corrected { .. }));
        }
    }

    #[test]
    fn syndrome_table_covers_every_weight_le_3_pattern_without_collision() {
        // The (23,12,7) base code is perfect, so every weight-<=3 pattern
        // over the extended 24-bit word must recover exactly to itself
        // when decoding the all-zero codeword plus that pattern.
        let t = table();
        assert_eq!(t.map.len(), 1 + 24 + 276 + 2024);
        for weight in 1..=3usize {
            for pattern in combinations_24(weight) {
                let (data, outcome) = decode(pattern);
                assert_eq!(data, 0, "pattern {pattern:#x} did not decode to zero data");
                assert!(matches!(outcome, GolayOutcome::Corrected { .. }));
            }
        }
    }
}
