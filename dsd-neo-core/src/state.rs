//! Decoder state: the mutable, single-writer
//! structure owned by the decoder thread. A read-only snapshot is published
//! to the UI before each paint; UI-originated mutations arrive as
//! commands drained at safe points, never as direct writes here.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

use crate::events::EventHistory;
use crate::resolver::{ChannelPlan, SiteContext};
use crate::tsm::Tsm;
use crate::utils::MovingAverage;

/// Ordered dibit decisions with a parallel per-dibit reliability value.
#[derive(Debug, Default)]
pub struct SymbolBuffer {
    pub dibits: VecDeque<u8>,
    pub reliabilities: VecDeque<u8>,
    capacity: usize,
}

impl SymbolBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { dibits: VecDeque::with_capacity(capacity), reliabilities: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, dibit: u8, reliability: u8) {
        if self.dibits.len() >= self.capacity {
            self.dibits.pop_front();
            self.reliabilities.pop_front();
        }
        self.dibits.push_back(dibit);
        self.reliabilities.push_back(reliability);
    }

    pub fn len(&self) -> usize {
        self.dibits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dibits.is_empty()
    }
}

/// A 144-dibit TDMA frame buffer, one per slot.
#[derive(Debug, Clone, Copy)]
pub struct TdmaFrameBuffer {
    pub dibits: [u8; 144],
    pub reliabilities: [u8; 144],
    pub filled: usize,
}

impl Default for TdmaFrameBuffer {
    fn default() -> Self {
        Self { dibits: [0; 144], reliabilities: [0; 144], filled: 0 }
    }
}

impl TdmaFrameBuffer {
    pub fn push(&mut self, dibit: u8, reliability: u8) -> bool {
        if self.filled >= self.dibits.len() {
            return true;
        }
        self.dibits[self.filled] = dibit;
        self.reliabilities[self.filled] = reliability;
        self.filled += 1;
        self.filled == self.dibits.len()
    }

    pub fn reset(&mut self) {
        self.filled = 0;
    }
}

/// Per-system identity: WACN/SYSID/NAC/CC/RFSS/SITE plus the
/// IDEN_UP table, here delegated entirely to [`ChannelPlan`].
#[derive(Debug, Default)]
pub struct SystemIdentity {
    pub wacn: u32,
    pub sysid: u16,
    pub nac_or_cc: u16,
    pub rfss: u8,
    pub site: u8,

    /// Last-seen voice/data source ID, carried forward so a TDULC grant
    /// (which does not itself repeat the source) can still populate
    /// [`crate::protocol::common::SmEvent::Grant::src`].
    pub lastsrc: u32,

    /// Wall-clock and monotonic timestamps of the last successfully
    /// decoded control-channel frame (TSBK or TDULC with a passing outcome).
    pub last_cc_sync_wall: Option<SystemTime>,
    pub last_cc_sync_mono: Option<Duration>,
}

impl SystemIdentity {
    /// Stamps both clocks for a successful control-channel decode.
    pub fn note_cc_sync(&mut self, wall: SystemTime, mono: Duration) {
        self.last_cc_sync_wall = Some(wall);
        self.last_cc_sync_mono = Some(mono);
    }
}

impl SystemIdentity {
    pub fn as_context(&self) -> SiteContext {
        SiteContext { wacn: self.wacn, sysid: self.sysid, rfss: self.rfss, site: self.site }
    }
}

/// Encryption parameters tracked per voice slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptionParams {
    pub alg: u8,
    pub key_id: u16,
    pub mi: u64,
    pub current_iv: u64,
    pub next_iv: u64,
}

/// Per-slot voice context.
#[derive(Debug, Default)]
pub struct VoiceSlotContext {
    pub audio_allowed: bool,
    pub last_mac_active_wall: Option<SystemTime>,
    pub last_mac_active_mono: Option<Duration>,
    pub last_mac_end_wall: Option<SystemTime>,
    pub last_mac_end_mono: Option<Duration>,
    pub jitter: crate::protocol::p25p2::JitterRing,
    pub imbe_error_avg: MovingAverage,
    pub enc_pending: crate::protocol::p25p2::EncPending,
    pub encryption: EncryptionParams,
}

impl VoiceSlotContext {
    pub fn new() -> Self {
        Self { imbe_error_avg: MovingAverage::new(64), ..Default::default() }
    }
}

/// FEC counters per layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct FecCounters {
    pub successes: u64,
    pub failures: u64,
    pub corrected_symbols: u64,
}

impl FecCounters {
    pub fn record(&mut self, outcome: crate::protocol::common::FrameOutcome) {
        use crate::protocol::common::FrameOutcome;
        match outcome {
            FrameOutcome::Clean => self.successes += 1,
            FrameOutcome::Corrected { corrected } => {
                self.successes += 1;
                self.corrected_symbols += corrected as u64;
            }
            FrameOutcome::Failed => self.failures += 1,
        }
    }
}

/// Per-layer FEC success/failure counters: P1 TSBK header, P1 voice RS,
/// P2 FACCH/SACCH/ESS RS with totals and corrected-symbol sums, plus the
/// DUID histogram and soft-decision success count.
#[derive(Debug, Default)]
pub struct DecoderCounters {
    pub p1_tsbk_header: FecCounters,
    pub p1_voice_rs: FecCounters,
    pub p2_facch_rs: FecCounters,
    pub p2_sacch_rs: FecCounters,
    pub p2_ess_rs: FecCounters,
    pub soft_rs_ok: u64,
}

/// The mutable decoder state, owned by the decoder thread.
pub struct DecoderState {
    pub symbols: SymbolBuffer,
    pub tdma_frames: [TdmaFrameBuffer; 2],

    pub identity: SystemIdentity,
    pub channel_plan: ChannelPlan,

    pub tsm: Tsm,

    pub voice_slots: [VoiceSlotContext; 2],
    pub counters: DecoderCounters,
    pub events: EventHistory,
    pub patch_table: crate::protocol::p25p1::PatchTable,
}

impl DecoderState {
    pub fn new(timing: crate::tsm::TimingParams) -> Self {
        Self {
            symbols: SymbolBuffer::new(4800),
            tdma_frames: [TdmaFrameBuffer::default(), TdmaFrameBuffer::default()],
            identity: SystemIdentity::default(),
            channel_plan: ChannelPlan::new(),
            tsm: Tsm::new(timing),
            voice_slots: [VoiceSlotContext::new(), VoiceSlotContext::new()],
            counters: DecoderCounters::default(),
            events: EventHistory::new(),
            patch_table: crate::protocol::p25p1::PatchTable::new(),
        }
    }

    /// Builds the initial state from a resolved [`crate::config::DecoderOptions`],
    /// translating `follower` into the TSM's [`crate::tsm::TimingParams`].
    pub fn from_options(options: &crate::config::DecoderOptions) -> Self {
        let f = &options.follower;
        let timing = crate::tsm::TimingParams {
            grant_voice_to_s: f.grant_voice_to_s,
            hangtime_s: options.trunking.hangtime_s,
            min_follow_dwell_s: f.min_follow_dwell_s,
            ring_hold_s: f.ring_hold_s,
            p25p1_err_hold_s: f.p25p1_err_hold_s,
            force_release_extra_s: f.force_release_extra_s,
            force_release_margin_s: f.force_release_margin_s,
            retune_backoff_s: f.retune_backoff_s,
            cc_grace_s: f.cc_grace_s,
            mac_hold_s: f.mac_hold_s,
        };
        let mut state = Self::new(timing);
        state.tsm.set_tg_hold(options.trunking.tg_hold);
        state
    }

    /// Policy gates derived from the resolved options, passed to
    /// [`Tsm::handle_event`] on every `GRANT`.
    pub fn policy_gates(options: &crate::config::DecoderOptions) -> crate::tsm::PolicyGates {
        crate::tsm::PolicyGates {
            tune_group: options.trunking.tune_group_calls,
            tune_private: options.trunking.tune_private_calls,
            tune_data: options.trunking.tune_data_calls,
            tune_encrypted: options.trunking.tune_encrypted_calls,
            tg_hold: options.trunking.tg_hold,
            allow_list_mode: options.trunking.allow_list_mode,
            allow_list_permits: true,
        }
    }

    /// Single cleanup routine run at shutdown: flushes
    /// the CC-candidate cache and returns the frequencies to persist.
    pub fn cc_cache_snapshot(&self) -> Vec<u64> {
        self.channel_plan.candidates.entries().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tdma_frame_buffer_signals_full_at_144() {
        let mut buf = TdmaFrameBuffer::default();
        for _ in 0..143 {
            assert!(!buf.push(0, 255));
        }
        assert!(buf.push(0, 255));
        assert_eq!(buf.filled, 144);
    }

    #[test]
    fn symbol_buffer_is_bounded() {
        let mut buf = SymbolBuffer::new(4);
        for i in 0..10u8 {
            buf.push(i % 4, 255);
        }
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn fec_counters_record_outcomes() {
        use crate::protocol::common::FrameOutcome;
        let mut counters = FecCounters::default();
        counters.record(FrameOutcome::Clean);
        counters.record(FrameOutcome::Corrected { corrected: 3 });
        counters.record(FrameOutcome::Failed);
        assert_eq!(counters.successes, 2);
        assert_eq!(counters.failures, 1);
        assert_eq!(counters.corrected_symbols, 3);
    }
}
