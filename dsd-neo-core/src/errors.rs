//! Layered error taxonomy for the decoder core.
//!
//! Only source failures, config errors, and invariant violations travel through
//! `Result`/`?` — a failed CRC on one frame is expected, counted data, not a
//! crate-level error (see `protocol::common::FrameOutcome`).

use thiserror::Error;

/// Top-level error type for all dsd-neo-core operations.
#[derive(Debug, Error)]
pub enum DsdError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("DSP error: {0}")]
    Dsp(#[from] DspError),

    #[error("frame pipeline error: {0}")]
    Frame(#[from] FrameError),

    #[error("trunking state machine error: {0}")]
    Tsm(#[from] TsmError),

    #[error("channel-plan resolver error: {0}")]
    Resolver(#[from] ResolverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration load/precedence errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("conflicting values for {key}: cli={cli:?} env={env:?} file={file:?}")]
    PrecedenceConflict {
        key: String,
        cli: Option<String>,
        env: Option<String>,
        file: Option<String>,
    },

    #[error("unknown input source variant: {variant}")]
    UnknownInputSource { variant: String },

    #[error("profile '{profile}' not found in config file")]
    UnknownProfile { profile: String },
}

/// Capture/DSP front-end errors (source failure, not per-sample issues).
#[derive(Debug, Error)]
pub enum DspError {
    #[error("input source failed to open: {reason}")]
    SourceFailed { reason: String },

    #[error("resampler misconfigured: L/M = {l}/{m}")]
    ResamplerMisconfigured { l: u32, m: u32 },

    #[error("unsupported sample rate: {rate_hz} Hz")]
    UnsupportedSampleRate { rate_hz: u32 },

    #[error("samples-per-symbol {sps} outside supported range [2, 64]")]
    InvalidSamplesPerSymbol { sps: i64 },
}

/// Frame/FEC pipeline errors that represent a programming invariant violation
/// (never a routine decode failure — those are `FrameOutcome` values).
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame buffer length {actual} does not match expected {expected}")]
    UnexpectedLength { expected: usize, actual: usize },

    #[error("reliability buffer length {actual} does not match dibit count {expected}")]
    ReliabilityLengthMismatch { expected: usize, actual: usize },

    #[error("erasure list exceeds channel cap: {count} > {cap}")]
    ErasureCapExceeded { count: usize, cap: usize },
}

/// Trunking state machine errors.
#[derive(Debug, Error)]
pub enum TsmError {
    #[error("invalid transition: event {event} not valid in state {state}")]
    InvalidTransition { state: String, event: String },

    #[error("grant could not resolve a channel: lpcn={lpcn:?} freq_hz={freq_hz}")]
    UnresolvedChannel { lpcn: Option<u16>, freq_hz: u64 },
}

/// Channel-plan / IDEN resolver errors.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("IDEN index {iden} out of range 0..15")]
    InvalidIdenIndex { iden: u8 },

    #[error("no IDEN plan entry learned for index {iden}")]
    UnknownIden { iden: u8 },

    #[error("CC-candidate cache I/O failed at {path}: {source}")]
    CacheIoFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for dsd-neo-core operations.
pub type Result<T> = std::result::Result<T, DsdError>;
