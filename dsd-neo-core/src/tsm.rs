//! Trunking state machine: one explicit FSM per protocol family
//! (P25 and DMR share this shape), following control-channel
//! grants to voice channels, honoring hangtime, and hunting alternate
//! control channels on loss.
//!
//! Time is monotonic-only for every control decision: callers pass `Duration`s measured from an arbitrary process
//! epoch, never wall-clock time.

use std::time::Duration;

use crate::protocol::common::SmEvent;

/// High-level TSM state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    OnCc,
    Tuned,
    Hunting,
}

/// UI-facing mode, a finer-grained label than [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    OnCc,
    OnVc,
    Hang,
    Hunting,
    Armed,
    Follow,
    Returning,
}

/// Policy gates evaluated on a `GRANT` event.
#[derive(Debug, Clone, Copy)]
pub struct PolicyGates {
    pub tune_group: bool,
    pub tune_private: bool,
    pub tune_data: bool,
    pub tune_encrypted: bool,
    /// `0` = no hold in effect.
    pub tg_hold: u32,
    pub allow_list_mode: bool,
    /// Closure-free allow-list check stands in for the full allow/deny list
    /// subsystem; pass `true` unconditionally if disabled.
    pub allow_list_permits: bool,
}

/// Timing knobs that drive TICK-based transitions.
#[derive(Debug, Clone, Copy)]
pub struct TimingParams {
    pub grant_voice_to_s: f64,
    pub hangtime_s: f64,
    pub min_follow_dwell_s: f64,
    pub ring_hold_s: f64,
    pub p25p1_err_hold_s: f64,
    pub force_release_extra_s: f64,
    pub force_release_margin_s: f64,
    pub retune_backoff_s: f64,
    pub cc_grace_s: f64,
    /// P25p2 per-slot extension: both slots must be idle this long before
    /// release.
    pub mac_hold_s: f64,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            grant_voice_to_s: 1.0,
            hangtime_s: 1.0,
            min_follow_dwell_s: 0.0,
            ring_hold_s: 0.75,
            p25p1_err_hold_s: 0.0,
            force_release_extra_s: 1.0,
            force_release_margin_s: 0.5,
            retune_backoff_s: 1.0,
            cc_grace_s: 2.0,
            mac_hold_s: 3.0,
        }
    }
}

/// One entry in the bounded ring of recent reason tags.
#[derive(Debug, Clone)]
pub struct ReasonTagEntry {
    pub tag: String,
    pub at: Duration,
}

/// Per-slot follower state feeding the P25p2 release-deferral logic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotActivity {
    pub audio_allowed: bool,
    pub ring_has_data: bool,
    pub last_mac_active: Option<Duration>,
}

/// A request to retune the capture front-end, issued to the non-blocking
/// command channel back to (A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetuneCommand {
    ToVoice { freq_hz: u64, slot: i8 },
    ToControl { freq_hz: u64 },
}

const REASON_RING_CAP: usize = 8;
const MAX_SLOTS: usize = 2;

/// The trunking state machine. Carries no protocol-specific
/// parsing; callers feed it the already-decoded [`SmEvent`]s produced by the
/// P25/DMR frame pipelines.
pub struct Tsm {
    state: State,
    mode: Mode,

    cc_freq_hz: u64,
    vc_freq_hz: [u64; MAX_SLOTS],
    active_slot: i8,
    tuned: bool,
    tg_hold_current: u32,

    t_tune: Duration,
    t_voice: Duration,
    t_cc_sync: Duration,
    grant_timeout_cleared: bool,

    slots: [SlotActivity; MAX_SLOTS],

    last_return: Option<(u64, i8, Duration)>,

    pub tune_count: u64,
    pub release_count: u64,
    pub cc_return_count: u64,
    reason_ring: Vec<ReasonTagEntry>,

    pub timing: TimingParams,
}

impl Tsm {
    pub fn new(timing: TimingParams) -> Self {
        Self {
            state: State::Idle,
            mode: Mode::Hunting,
            cc_freq_hz: 0,
            vc_freq_hz: [0; MAX_SLOTS],
            active_slot: -1,
            tuned: false,
            tg_hold_current: 0,
            t_tune: Duration::ZERO,
            t_voice: Duration::ZERO,
            t_cc_sync: Duration::ZERO,
            grant_timeout_cleared: false,
            slots: [SlotActivity::default(); MAX_SLOTS],
            last_return: None,
            tune_count: 0,
            release_count: 0,
            cc_return_count: 0,
            reason_ring: Vec::with_capacity(REASON_RING_CAP),
            timing,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_tuned(&self) -> bool {
        self.tuned
    }

    pub fn active_slot(&self) -> i8 {
        self.active_slot
    }

    pub fn set_tg_hold(&mut self, tg_hold: u32) {
        self.tg_hold_current = tg_hold;
    }

    pub fn reason_history(&self) -> &[ReasonTagEntry] {
        &self.reason_ring
    }

    pub fn enter_on_cc(&mut self, freq_hz: u64) {
        self.cc_freq_hz = freq_hz;
        if self.state == State::Idle || self.state == State::Hunting {
            self.state = State::OnCc;
            self.mode = Mode::OnCc;
        }
    }

    fn log_reason(&mut self, tag: &str, now: Duration) {
        if self.reason_ring.len() >= REASON_RING_CAP {
            self.reason_ring.remove(0);
        }
        self.reason_ring.push(ReasonTagEntry { tag: tag.to_string(), at: now });
    }

    fn gates_pass(&self, is_group: bool, is_data: bool, encrypted: bool, tg_or_dst: u32, gates: &PolicyGates) -> bool {
        if gates.tg_hold != 0 && tg_or_dst != gates.tg_hold {
            return false;
        }
        if is_data && !gates.tune_data {
            return false;
        }
        if encrypted && !gates.tune_encrypted {
            return false;
        }
        if is_group && !gates.tune_group {
            return false;
        }
        if !is_group && !is_data && !gates.tune_private {
            return false;
        }
        if gates.allow_list_mode && !gates.allow_list_permits {
            return false;
        }
        true
    }

    /// Feeds one [`SmEvent`] into the TSM, returning a retune command if the
    /// event causes one.
    pub fn handle_event(
        &mut self,
        event: SmEvent,
        now: Duration,
        gates: &PolicyGates,
    ) -> Option<RetuneCommand> {
        match event {
            SmEvent::Grant { freq_hz, lpcn: _, tg_or_dst, src: _, is_group, svc_bits } => {
                self.on_grant(freq_hz, tg_or_dst, is_group, svc_bits, now, gates)
            }
            SmEvent::VoiceSync { slot } => {
                self.on_voice_sync(slot, now);
                None
            }
            SmEvent::DataSync { slot } => {
                self.on_voice_sync(slot, now);
                None
            }
            SmEvent::Release { slot } => self.on_release(slot, now),
            SmEvent::CcSync => {
                self.t_cc_sync = now;
                if self.state == State::Hunting {
                    self.state = State::OnCc;
                    self.mode = Mode::OnCc;
                }
                None
            }
            SmEvent::SyncLost => {
                self.enter_hunting();
                None
            }
            SmEvent::Tick => self.on_tick(now),
        }
    }

    fn on_grant(
        &mut self,
        freq_hz: u64,
        tg_or_dst: u32,
        is_group: bool,
        svc_bits: u8,
        now: Duration,
        gates: &PolicyGates,
    ) -> Option<RetuneCommand> {
        if self.state != State::OnCc {
            return None;
        }
        const SVC_DATA: u8 = 0x01;
        const SVC_ENCRYPTED: u8 = 0x40;
        let is_data = svc_bits & SVC_DATA != 0;
        let encrypted = svc_bits & SVC_ENCRYPTED != 0;

        if !self.gates_pass(is_group, is_data, encrypted, tg_or_dst, gates) {
            self.log_reason("release-blocked", now);
            return None;
        }
        if freq_hz == 0 {
            self.log_reason("release-deferred-gated", now);
            return None;
        }

        self.t_tune = now;
        self.t_voice = now;
        self.grant_timeout_cleared = false;
        self.tuned = true;
        self.vc_freq_hz[0] = freq_hz;
        self.active_slot = -1;
        self.state = State::Tuned;
        self.mode = Mode::Armed;
        self.tune_count += 1;
        self.log_reason("grant", now);
        Some(RetuneCommand::ToVoice { freq_hz, slot: -1 })
    }

    /// P25p2 extension: grants that map to a TDMA channel additionally set
    /// the active slot and prime `audio_allowed`.
    pub fn on_p25p2_grant_slot(&mut self, slot: i8) {
        self.active_slot = slot;
        if let Some(idx) = usize::try_from(slot).ok().filter(|&i| i < MAX_SLOTS) {
            self.slots[idx].audio_allowed = true;
        }
    }

    fn on_voice_sync(&mut self, _slot: i8, now: Duration) {
        if self.state == State::Tuned {
            self.t_voice = now;
            self.grant_timeout_cleared = true;
            self.mode = Mode::OnVc;
        }
    }

    pub fn note_mac_active(&mut self, slot: i8, now: Duration) {
        if let Some(idx) = usize::try_from(slot).ok().filter(|&i| i < MAX_SLOTS) {
            self.slots[idx].last_mac_active = Some(now);
        }
    }

    pub fn set_ring_has_data(&mut self, slot: i8, has_data: bool) {
        if let Some(idx) = usize::try_from(slot).ok().filter(|&i| i < MAX_SLOTS) {
            self.slots[idx].ring_has_data = has_data;
        }
    }

    fn on_release(&mut self, slot: i8, now: Duration) -> Option<RetuneCommand> {
        if self.state != State::Tuned {
            return None;
        }
        let matches_active = slot == -1 || slot == self.active_slot;
        if !matches_active {
            return None;
        }
        if let Some(idx) = usize::try_from(slot).ok().filter(|&i| i < MAX_SLOTS) {
            self.slots[idx].audio_allowed = false;
        }
        if self.any_other_slot_active(slot, now) {
            return None;
        }
        self.return_to_cc("release", now)
    }

    /// A slot other than `excluding` still blocks release if it's holding
    /// audio, has fresh ring data, or had MAC activity within `mac_hold_s`.
    fn any_other_slot_active(&self, excluding: i8, now: Duration) -> bool {
        self.slots.iter().enumerate().any(|(i, s)| {
            i as i8 != excluding
                && (s.audio_allowed
                    || s.ring_has_data
                    || s.last_mac_active
                        .map(|t| now.saturating_sub(t).as_secs_f64() <= self.timing.mac_hold_s)
                        .unwrap_or(false))
        })
    }

    fn all_slots_idle(&self, now: Duration) -> bool {
        self.slots.iter().all(|s| {
            !s.audio_allowed
                && !s.ring_has_data
                && s.last_mac_active
                    .map(|t| now.saturating_sub(t).as_secs_f64() > self.timing.mac_hold_s)
                    .unwrap_or(true)
        })
    }

    fn on_tick(&mut self, now: Duration) -> Option<RetuneCommand> {
        match self.state {
            State::Tuned => self.tick_tuned(now),
            State::OnCc => {
                if self.t_cc_sync != Duration::ZERO
                    && now.saturating_sub(self.t_cc_sync).as_secs_f64() > self.timing.cc_grace_s
                {
                    self.enter_hunting();
                }
                None
            }
            State::Hunting => {
                if let Some(freq) = self.candidate_next() {
                    return Some(RetuneCommand::ToControl { freq_hz: freq });
                }
                None
            }
            State::Idle => None,
        }
    }

    /// HUNTING needs an external candidate source (the [`crate::resolver::CcCandidateRing`]);
    /// the TSM stores nothing about candidates itself, so this always
    /// returns `None` here. The real candidate-popping loop lives outside
    /// the TSM, in `runtime::run_watchdog_thread`, which holds the
    /// `ChannelPlan` the TSM doesn't have access to: each tick it calls
    /// `channel_plan.candidates.pop_next()` directly and, on a hit, drives
    /// the TSM back to `ON_CC` via `Tsm::enter_on_cc` and issues the retune
    /// itself. This hook stays so `tick`'s HUNTING arm has a place to plug
    /// in a candidate source if the TSM is ever driven without that
    /// watchdog loop; until then it keeps the TSM protocol/resolver-agnostic.
    fn candidate_next(&mut self) -> Option<u64> {
        None
    }

    fn tick_tuned(&mut self, now: Duration) -> Option<RetuneCommand> {
        let since_tune = now.saturating_sub(self.t_tune).as_secs_f64();
        let since_voice = now.saturating_sub(self.t_voice).as_secs_f64();

        let force_release_at = self.timing.hangtime_s
            + self.timing.force_release_extra_s
            + self.timing.force_release_margin_s;
        if since_voice >= force_release_at {
            return self.return_to_cc("force-release", now);
        }

        if !self.grant_timeout_cleared && since_tune > self.timing.grant_voice_to_s {
            return self.return_to_cc("grant-timeout", now);
        }

        if since_voice >= self.timing.hangtime_s && since_tune >= self.timing.min_follow_dwell_s {
            let ring_recent = self
                .slots
                .iter()
                .any(|s| s.ring_has_data && s.last_mac_active.map(|t| now.saturating_sub(t).as_secs_f64() < self.timing.ring_hold_s).unwrap_or(false));
            let err_hold_active = self.timing.p25p1_err_hold_s > 0.0 && since_voice < self.timing.hangtime_s + self.timing.p25p1_err_hold_s;
            if !ring_recent && !err_hold_active && self.all_slots_idle(now) {
                return self.return_to_cc("hangtime-expired", now);
            }
        }

        None
    }

    fn return_to_cc(&mut self, reason: &str, now: Duration) -> Option<RetuneCommand> {
        let slot = self.active_slot;
        let freq = self.vc_freq_hz[0];
        if let Some((last_freq, last_slot, last_at)) = self.last_return {
            if last_freq == freq
                && last_slot == slot
                && now.saturating_sub(last_at).as_secs_f64() < self.timing.retune_backoff_s
            {
                return None;
            }
        }
        self.last_return = Some((freq, slot, now));
        self.tuned = false;
        self.active_slot = -1;
        for s in &mut self.slots {
            *s = SlotActivity::default();
        }
        self.state = State::OnCc;
        self.mode = Mode::Returning;
        self.release_count += 1;
        self.cc_return_count += 1;
        self.log_reason(reason, now);
        Some(RetuneCommand::ToControl { freq_hz: self.cc_freq_hz })
    }

    fn enter_hunting(&mut self) {
        self.state = State::Hunting;
        self.mode = Mode::Hunting;
        self.tuned = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gates_all_open() -> PolicyGates {
        PolicyGates {
            tune_group: true,
            tune_private: true,
            tune_data: true,
            tune_encrypted: true,
            tg_hold: 0,
            allow_list_mode: false,
            allow_list_permits: true,
        }
    }

    fn grant(freq_hz: u64, tg: u32) -> SmEvent {
        SmEvent::Grant { freq_hz, lpcn: None, tg_or_dst: tg, src: 42, is_group: true, svc_bits: 0 }
    }

    #[test]
    fn tg_hold_blocks_non_matching_grants() {
        let mut tsm = Tsm::new(TimingParams::default());
        tsm.enter_on_cc(851_000_000);
        let mut gates = gates_all_open();
        gates.tg_hold = 1234;

        let result = tsm.handle_event(grant(851_500_000, 4321), Duration::ZERO, &gates);
        assert!(result.is_none());
        assert_eq!(tsm.tune_count, 0);

        let result = tsm.handle_event(grant(851_500_000, 1234), Duration::ZERO, &gates);
        assert!(result.is_some());
        assert_eq!(tsm.tune_count, 1);
    }

    #[test]
    fn zero_freq_grant_never_retunes() {
        let mut tsm = Tsm::new(TimingParams::default());
        tsm.enter_on_cc(851_000_000);
        let result = tsm.handle_event(grant(0, 1), Duration::ZERO, &gates_all_open());
        assert!(result.is_none());
        assert_eq!(tsm.tune_count, 0);
    }

    #[test]
    fn grant_then_voice_then_hangtime_returns_to_cc() {
        let mut timing = TimingParams::default();
        timing.hangtime_s = 2.0;
        timing.grant_voice_to_s = 5.0;
        timing.force_release_extra_s = 100.0;
        let mut tsm = Tsm::new(timing);
        tsm.enter_on_cc(851_000_000);
        let gates = gates_all_open();

        let cmd = tsm.handle_event(grant(851_500_000, 1), Duration::from_secs(0), &gates);
        assert_eq!(cmd, Some(RetuneCommand::ToVoice { freq_hz: 851_500_000, slot: -1 }));
        assert_eq!(tsm.state(), State::Tuned);

        tsm.handle_event(SmEvent::VoiceSync { slot: -1 }, Duration::from_millis(100), &gates);
        assert!(tsm.handle_event(SmEvent::Tick, Duration::from_millis(500), &gates).is_none());

        let cmd = tsm.handle_event(SmEvent::Tick, Duration::from_millis(2200), &gates);
        assert_eq!(cmd, Some(RetuneCommand::ToControl { freq_hz: 851_000_000 }));
        assert_eq!(tsm.state(), State::OnCc);
    }

    #[test]
    fn grant_timeout_without_voice_returns_to_cc() {
        let mut timing = TimingParams::default();
        timing.grant_voice_to_s = 1.0;
        timing.hangtime_s = 100.0;
        timing.force_release_extra_s = 100.0;
        let mut tsm = Tsm::new(timing);
        tsm.enter_on_cc(851_000_000);
        let gates = gates_all_open();
        tsm.handle_event(grant(851_500_000, 1), Duration::ZERO, &gates);

        let cmd = tsm.handle_event(SmEvent::Tick, Duration::from_millis(1500), &gates);
        assert_eq!(cmd, Some(RetuneCommand::ToControl { freq_hz: 851_000_000 }));
    }

    #[test]
    fn retune_backoff_blocks_immediate_re_return() {
        let mut timing = TimingParams::default();
        timing.hangtime_s = 0.1;
        timing.grant_voice_to_s = 100.0;
        timing.force_release_extra_s = 100.0;
        timing.retune_backoff_s = 5.0;
        let mut tsm = Tsm::new(timing);
        tsm.enter_on_cc(851_000_000);
        let gates = gates_all_open();

        tsm.handle_event(grant(851_500_000, 1), Duration::ZERO, &gates);
        tsm.handle_event(SmEvent::VoiceSync { slot: -1 }, Duration::from_millis(10), &gates);
        let first_return = tsm.handle_event(SmEvent::Tick, Duration::from_millis(200), &gates);
        assert!(first_return.is_some());

        // Re-grant the same channel immediately and let hangtime expire again.
        tsm.enter_on_cc(851_000_000);
        tsm.handle_event(grant(851_500_000, 1), Duration::from_millis(210), &gates);
        tsm.handle_event(SmEvent::VoiceSync { slot: -1 }, Duration::from_millis(220), &gates);
        let second_return = tsm.handle_event(SmEvent::Tick, Duration::from_millis(400), &gates);
        assert!(second_return.is_none(), "backoff should suppress the second return");
    }

    #[test]
    fn sync_lost_enters_hunting() {
        let mut tsm = Tsm::new(TimingParams::default());
        tsm.enter_on_cc(851_000_000);
        tsm.handle_event(SmEvent::SyncLost, Duration::ZERO, &gates_all_open());
        assert_eq!(tsm.state(), State::Hunting);
    }

    #[test]
    fn p25p2_release_deferred_until_both_slots_idle() {
        let mut timing = TimingParams::default();
        timing.hangtime_s = 0.1;
        timing.grant_voice_to_s = 100.0;
        timing.force_release_extra_s = 100.0;
        timing.mac_hold_s = 1.0;
        let mut tsm = Tsm::new(timing);
        tsm.enter_on_cc(851_000_000);
        let gates = gates_all_open();
        tsm.handle_event(grant(851_500_000, 1), Duration::ZERO, &gates);
        tsm.on_p25p2_grant_slot(0);
        tsm.handle_event(SmEvent::VoiceSync { slot: 0 }, Duration::from_millis(10), &gates);
        tsm.set_ring_has_data(1, true);
        tsm.note_mac_active(1, Duration::from_millis(50));

        // Slot 0 releases explicitly, but slot 1 still has fresh ring
        // activity — the combined release must still defer.
        tsm.handle_event(SmEvent::Release { slot: 0 }, Duration::from_millis(60), &gates);
        let still_tuned = tsm.handle_event(SmEvent::Tick, Duration::from_millis(200), &gates);
        assert!(still_tuned.is_none(), "slot 1 still active, release must defer");
    }
}
