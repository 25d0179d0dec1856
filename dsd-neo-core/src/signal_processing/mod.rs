//! Capture & DSP front end: byte/IQ capture to baseband dibits.
//!
//! Stage order: byte→complex widening (with an fs/4 digital shift for
//! RTL-SDR-style unsigned 8-bit IQ, applied in [`crate::io::RtlSdrIqSource`]
//! before samples ever reach [`front_end::FrontEnd`]), a DC blocker, an FM
//! AGC/envelope limiter, a half-band decimator cascade, a rational L/M
//! resampler down to the DSP rate, then per-sample carrier correction — an
//! FLL for FM/C4FM, a decision-directed Costas loop for coherent CQPSK — a
//! discriminator/slicer, a Gardner timing-error detector, and an optional
//! C4FM clock-assist stage. [`front_end::FrontEnd`] is the public contract
//! the capture thread drives.

pub mod filters;
pub mod front_end;
pub mod spectrum;

pub use filters::{apply_rrc_filter, dc_blocker, half_band_decimate, fs4_shift, rational_factors, resample_rational};
pub use front_end::{ClockAssist, Discriminator, FrontEnd, FrontEndMetrics};
pub use spectrum::compute_baseband_spectrum;
