//! Forward error correction primitives shared across the P25 Phase 1/2 frame
//! pipelines: GF(2^6) arithmetic, Reed-Solomon, extended Golay, Hamming,
//! CRC-16, and the TSBK trellis.

pub mod crc;
pub mod gf64;
pub mod golay;
pub mod hamming;
pub mod rs;
pub mod viterbi;

pub use golay::GolayOutcome;
pub use hamming::HammingOutcome;
pub use rs::{ReedSolomon, RsOutcome};
