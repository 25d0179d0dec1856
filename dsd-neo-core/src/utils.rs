//! Bit-level and dibit-level helpers shared across the frame pipeline and DSP feeder.

use num_complex::Complex64;

/// Packs a big-endian bitstream (one bit per byte, MSB-first within each group of 8)
/// into bytes, left-padding the final partial byte with zeros.
pub fn pack_bits(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u8, |acc, &b| (acc << 1) | (b & 1))
                << (8 - chunk.len())
        })
        .collect()
}

/// Unpacks bytes into a big-endian bitstream, MSB-first.
pub fn unpack_bits(bytes: &[u8]) -> Vec<u8> {
    bytes
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |bit| (byte >> bit) & 1))
        .collect()
}

/// Reads `width` bits starting at `start` from a bitstream as a big-endian integer.
pub fn bits_to_u64(bits: &[u8], start: usize, width: usize) -> u64 {
    debug_assert!(start + width <= bits.len());
    bits[start..start + width]
        .iter()
        .fold(0u64, |acc, &b| (acc << 1) | (b & 1) as u64)
}

/// Splits a 16-bit-wide dibit-pair stream (values 0..3) into raw bits, two bits per dibit.
pub fn dibits_to_bits(dibits: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(dibits.len() * 2);
    for &d in dibits {
        out.push((d >> 1) & 1);
        out.push(d & 1);
    }
    out
}

/// Packs a bitstream of even length into dibits (two bits per dibit, MSB-first).
pub fn bits_to_dibits(bits: &[u8]) -> Vec<u8> {
    bits.chunks(2)
        .map(|pair| (pair[0] << 1) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Converts interleaved I/Q float pairs into complex samples.
pub fn complex_from_interleaved(data: &[f64]) -> Vec<Complex64> {
    data.chunks(2).map(|c| Complex64::new(c[0], c[1])).collect()
}

/// Converts complex samples back into interleaved I/Q float pairs.
pub fn interleaved_from_complex(data: &[Complex64]) -> Vec<f64> {
    data.iter().flat_map(|c| [c.re, c.im]).collect()
}

/// Fixed-capacity moving average over `u32` samples, used for IMBE/voice error rates
/// and similar bounded-window quality metrics.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: Vec<f64>,
    capacity: usize,
    pos: usize,
    filled: usize,
}

impl MovingAverage {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            window: vec![0.0; capacity],
            capacity,
            pos: 0,
            filled: 0,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.window[self.pos] = value;
        self.pos = (self.pos + 1) % self.capacity;
        if self.filled < self.capacity {
            self.filled += 1;
        }
    }

    pub fn mean(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        self.window[..self.filled].iter().sum::<f64>() / self.filled as f64
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}

/// Majority-vote a set of equal-length bitstreams, bit by bit. Ties resolve to 1,
/// matching the "majority vote across available repetitions" rule in the TSBK path.
pub fn majority_vote_bits(reps: &[&[u8]]) -> Vec<u8> {
    assert!(!reps.is_empty());
    let len = reps[0].len();
    (0..len)
        .map(|i| {
            let ones: usize = reps.iter().map(|r| r[i] as usize).sum();
            if ones * 2 >= reps.len() {
                1
            } else {
                0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        let bits = unpack_bits(&[0xA5, 0x3C]);
        let packed = pack_bits(&bits);
        assert_eq!(packed, vec![0xA5, 0x3C]);
    }

    #[test]
    fn partial_byte_left_pads_zero() {
        let bits = vec![1, 0, 1];
        assert_eq!(pack_bits(&bits), vec![0b1010_0000]);
    }

    #[test]
    fn bits_to_u64_reads_be() {
        let bits = unpack_bits(&[0b1011_0010]);
        assert_eq!(bits_to_u64(&bits, 0, 8), 0xB2);
        assert_eq!(bits_to_u64(&bits, 4, 4), 0x2);
    }

    #[test]
    fn dibit_roundtrip() {
        let dibits = vec![0u8, 1, 2, 3];
        let bits = dibits_to_bits(&dibits);
        assert_eq!(bits_to_dibits(&bits), dibits);
    }

    #[test]
    fn complex_conversion_roundtrip() {
        let samples = [Complex64::new(0.5, -0.25), Complex64::new(-1.0, 2.0)];
        let interleaved = interleaved_from_complex(&samples);
        assert_eq!(interleaved, vec![0.5, -0.25, -1.0, 2.0]);
        assert_eq!(complex_from_interleaved(&interleaved), samples);
    }

    #[test]
    fn moving_average_window_caps() {
        let mut avg = MovingAverage::new(3);
        avg.push(1.0);
        avg.push(2.0);
        avg.push(3.0);
        assert_eq!(avg.mean(), 2.0);
        avg.push(9.0); // evicts the 1.0
        assert_eq!(avg.mean(), (2.0 + 3.0 + 9.0) / 3.0);
    }

    #[test]
    fn majority_vote_picks_majority() {
        let a = [1u8, 0, 1, 1];
        let b = [1u8, 1, 0, 1];
        let c = [0u8, 0, 1, 1];
        let result = majority_vote_bits(&[&a, &b, &c]);
        assert_eq!(result, vec![1, 0, 1, 1]);
    }
}
