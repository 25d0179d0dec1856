//! Shared PDU records and frame-level outcome types for the P25/DMR frame
//! pipelines.

/// Outcome of a single frame/FEC decode attempt. This is counted data, not a
/// crate-level error — a failed CRC on one frame is routine and expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Decoded cleanly, no corrections needed.
    Clean,
    /// Decoded after correcting `corrected` symbols/bits.
    Corrected { corrected: u32 },
    /// Could not be decoded; counted as a transient failure.
    Failed,
}

impl FrameOutcome {
    pub fn is_ok(self) -> bool {
        !matches!(self, FrameOutcome::Failed)
    }

    pub fn corrected_count(self) -> u32 {
        match self {
            FrameOutcome::Corrected { corrected } => corrected,
            _ => 0,
        }
    }
}

/// P25 Phase 1 Data Unit IDs, carried alongside the decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duid {
    Hdu,
    Ldu1,
    Ldu2,
    Tdu,
    Tdulc,
    Tsbk,
    Mpdu,
}

/// A fully processed P25 Phase 1 frame handed from the frame pipeline to the
/// decoder state / TSM layer.
#[derive(Debug, Clone)]
pub struct P1FrameDecision {
    pub duid: Duid,
    /// The selected best repetition's raw bits, if the DUID collects several
    /// (TSBK does; most others carry exactly one).
    pub bits: Vec<u8>,
    pub outcome: FrameOutcome,
}

/// DMR Control Signaling Block result.
#[derive(Debug, Clone)]
pub struct CsbkResult {
    pub lb: bool,
    pub pf: bool,
    pub opcode: u8,
    pub fid: u8,
    pub lpcn: Option<u16>,
    pub physical_channel_number: Option<u16>,
    pub lcn: Option<u16>,
    pub status_bits: u8,
    pub source: u32,
    pub target: u32,
    /// Always 0 out of [`crate::protocol::dmr::decode_csbk`] itself: this
    /// decoder only splits the CSBK payload fields, it has no channel plan to
    /// consult. Set to the real resolved frequency, or left at 0 if the LCN
    /// isn't in the plan, when [`crate::protocol::dmr::dmr_voice_grant`] runs
    /// one layer up.
    pub resolved_freq_hz: u64,
    pub bits: Vec<u8>,
    pub bytes: Vec<u8>,
    pub outcome: FrameOutcome,
}

/// P25 Phase 2 logical channel class a MAC-VPDU arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelClass {
    Facch,
    Sacch,
    Lcch,
}

impl ChannelClass {
    /// Label used by the channel-suffix/VPDU formatter.
    pub fn label(self) -> &'static str {
        match self {
            ChannelClass::Facch => "FACCH",
            ChannelClass::Sacch => "SACCH",
            ChannelClass::Lcch => "LCCH",
        }
    }
}

/// A parsed P25 Phase 2 MAC Voice/data Protocol Data Unit.
#[derive(Debug, Clone)]
pub struct MacVpdu {
    pub channel_class: ChannelClass,
    pub mfid: u8,
    pub opcode: u8,
    pub length: usize,
    pub payload: [u8; 24],
}

/// Trunking state machine input events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmEvent {
    Grant {
        freq_hz: u64,
        lpcn: Option<u16>,
        tg_or_dst: u32,
        src: u32,
        is_group: bool,
        svc_bits: u8,
    },
    VoiceSync {
        slot: i8,
    },
    DataSync {
        slot: i8,
    },
    /// `slot == -1` means "any/unspecified slot".
    Release {
        slot: i8,
    },
    CcSync,
    SyncLost,
    Tick,
}
