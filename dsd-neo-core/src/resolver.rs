//! Channel-plan / IDEN resolver: translates a 16-bit logical
//! channel identifier into an RF frequency using learned IDEN_UP /
//! IDEN_UP_TDMA tables, plus the shared CC-candidate cache and neighbor set
//! used by both P25 (keyed by `(iden, channel)`) and DMR (keyed directly by
//! LCN).
//!
//! Generic over the channel key (`u16` for P25's `(iden<<12)|chan`, `u16` for
//! DMR's bare LCN) so both protocols share the trust-promotion and cache
//! mechanics through [`ChannelPlan`].

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ResolverError, Result};

/// Confidence that a learned IDEN/LCN table entry reflects the current site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trust {
    Unknown,
    Provisional,
    Confirmed,
}

/// Number of TDMA slots sharing one FDMA-equivalent carrier, indexed by
/// P25 channel-type.
const SLOTS_PER_CARRIER: [u32; 16] = [1, 1, 1, 2, 4, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2];

/// Provenance context an IDEN/LCN entry was learned under; a later PDU on a
/// matching context promotes the entry from provisional toward confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SiteContext {
    pub wacn: u32,
    pub sysid: u16,
    pub rfss: u8,
    pub site: u8,
}

/// One P25 IDEN_UP / IDEN_UP_TDMA entry.
#[derive(Debug, Clone, Copy)]
pub struct IdenEntry {
    /// Base frequency in units of 5 Hz.
    pub base_freq_5hz: u32,
    /// Channel spacing in units of 125 Hz.
    pub spacing_125hz: u16,
    pub tdma: bool,
    /// P25 channel-type (0..15), selects `SLOTS_PER_CARRIER`.
    pub channel_type: u8,
    /// Transmit offset, carried through but not used by `resolve`.
    pub transmit_offset: i32,
    pub context: SiteContext,
    pub trust: Trust,
}

impl IdenEntry {
    fn slots_per_carrier(&self) -> u32 {
        SLOTS_PER_CARRIER[(self.channel_type & 0x0F) as usize]
    }
}

/// Output of a successful channel resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub freq_hz: u64,
    /// `-1` when the channel-type/iden is FDMA-only (no TDMA slot concept).
    pub slot: i8,
    pub samples_per_symbol: u32,
    pub symbol_center: u32,
}

/// A direct channel-map override entry (user CSV import or learned LCN map),
/// which takes precedence over iden arithmetic.
#[derive(Debug, Clone, Copy)]
struct Override {
    freq_hz: u64,
}

/// Up to 16 ring-buffered CC candidates with insertion/consumption counters.
#[derive(Debug, Default)]
pub struct CcCandidateRing {
    entries: Vec<u64>,
    capacity: usize,
    next_read: usize,
    pub inserted: u64,
    pub consumed: u64,
}

impl CcCandidateRing {
    pub fn new() -> Self {
        Self { entries: Vec::new(), capacity: 16, next_read: 0, inserted: 0, consumed: 0 }
    }

    pub fn push(&mut self, freq_hz: u64) {
        if self.entries.contains(&freq_hz) {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.remove(0);
            if self.next_read > 0 {
                self.next_read -= 1;
            }
        }
        self.entries.push(freq_hz);
        self.inserted += 1;
    }

    /// Pops the next candidate in insertion order, wrapping (recycling) once
    /// the ring is exhausted; if empty, the caller should recycle from the
    /// persisted cache instead.
    pub fn pop_next(&mut self) -> Option<u64> {
        if self.entries.is_empty() {
            return None;
        }
        let freq = self.entries[self.next_read % self.entries.len()];
        self.next_read = (self.next_read + 1) % self.entries.len();
        self.consumed += 1;
        Some(freq)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_from(&mut self, freqs: impl IntoIterator<Item = u64>) {
        for f in freqs {
            self.push(f);
        }
    }

    pub fn entries(&self) -> &[u64] {
        &self.entries
    }
}

/// A ring of up to 32 neighbor frequencies with last-seen monotonic
/// timestamps; a 30-minute TTL ages entries out on tick.
#[derive(Debug, Default)]
pub struct NeighborSet {
    entries: Vec<(u64, Duration)>,
    capacity: usize,
}

const NEIGHBOR_TTL: Duration = Duration::from_secs(30 * 60);

impl NeighborSet {
    pub fn new() -> Self {
        Self { entries: Vec::new(), capacity: 32 }
    }

    pub fn observe(&mut self, freq_hz: u64, now: Duration) {
        if let Some(e) = self.entries.iter_mut().find(|(f, _)| *f == freq_hz) {
            e.1 = now;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.remove(0);
        }
        self.entries.push((freq_hz, now));
    }

    /// Drops entries whose last-seen time is more than [`NEIGHBOR_TTL`]
    /// behind `now`.
    pub fn age_out(&mut self, now: Duration) {
        self.entries.retain(|(_, last_seen)| now.saturating_sub(*last_seen) < NEIGHBOR_TTL);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, Duration)> + '_ {
        self.entries.iter().copied()
    }
}

/// Channel-plan resolver shared by P25 (iden-keyed) and DMR (LCN-keyed).
#[derive(Debug, Default)]
pub struct ChannelPlan {
    idens: HashMap<u8, IdenEntry>,
    overrides: HashMap<u16, Override>,
    pub candidates: CcCandidateRing,
    pub neighbors: NeighborSet,
}

impl ChannelPlan {
    pub fn new() -> Self {
        Self {
            idens: HashMap::new(),
            overrides: HashMap::new(),
            candidates: CcCandidateRing::new(),
            neighbors: NeighborSet::new(),
        }
    }

    /// Learns (or updates) an IDEN entry from a decoded PDU, stamping it
    /// provisional if not already confirmed.
    pub fn learn_iden(&mut self, idx: u8, mut entry: IdenEntry) {
        if let Some(existing) = self.idens.get(&idx) {
            if existing.trust == Trust::Confirmed {
                entry.trust = Trust::Confirmed;
            } else {
                entry.trust = Trust::Provisional;
            }
        } else {
            entry.trust = Trust::Provisional;
        }
        self.idens.insert(idx, entry);
    }

    /// Promotes all provisional entries whose context matches `current_site`
    /// to confirmed.
    pub fn confirm_idens_for_current_site(&mut self, current_site: SiteContext) {
        for entry in self.idens.values_mut() {
            if entry.trust == Trust::Provisional && entry.context == current_site {
                entry.trust = Trust::Confirmed;
            }
        }
    }

    /// Installs a direct channel-map override (CSV import or learned LCN
    /// map), which always takes precedence over iden arithmetic.
    pub fn set_override(&mut self, channel: u16, freq_hz: u64) {
        self.overrides.insert(channel, Override { freq_hz });
    }

    pub fn iden(&self, idx: u8) -> Option<&IdenEntry> {
        self.idens.get(&idx)
    }

    /// Resolves a 16-bit channel id (high nibble = IDEN index, low 12 bits =
    /// raw channel number) to a frequency, slot, and the derived symbol
    /// timing.
    pub fn resolve(&self, channel: u16) -> Result<Resolved> {
        if let Some(ov) = self.overrides.get(&channel) {
            return Ok(Resolved {
                freq_hz: ov.freq_hz,
                slot: -1,
                samples_per_symbol: 10,
                symbol_center: 4,
            });
        }
        let idx = ((channel >> 12) & 0x0F) as u8;
        let raw = channel & 0x0FFF;
        let entry = self.idens.get(&idx).ok_or(ResolverError::UnknownIden { iden: idx })?;

        let slots = entry.slots_per_carrier();
        let is_tdma = entry.tdma || slots > 1;
        let (step, slot) = if is_tdma {
            (raw as u32 / slots, (raw as u32 % slots) as i8)
        } else {
            (raw as u32, -1)
        };

        let freq_hz = entry.base_freq_5hz as u64 * 5
            + step as u64 * entry.spacing_125hz as u64 * 125;

        let samples_per_symbol = if is_tdma { 8 } else { 10 };
        let symbol_center = symbol_center_for_sps(samples_per_symbol);

        Ok(Resolved { freq_hz, slot, samples_per_symbol, symbol_center })
    }

    /// Retune policy gate: a provisional
    /// IDEN may be used only if no *other* confirmed entry shares its
    /// `(channel_type, context)` — since a single learned index always holds
    /// exactly one entry, this only excludes a provisional index when a
    /// distinct index has already been confirmed for the same site/type.
    pub fn retune_allowed(&self, idx: u8) -> bool {
        let Some(entry) = self.idens.get(&idx) else { return false };
        match entry.trust {
            Trust::Unknown => false,
            Trust::Confirmed => true,
            Trust::Provisional => !self.idens.iter().any(|(&other_idx, other)| {
                other_idx != idx
                    && other.trust == Trust::Confirmed
                    && other.channel_type == entry.channel_type
                    && other.context == entry.context
            }),
        }
    }
}

/// `symbol_center = (sps - 1) / 2`, clamped to the documented SPS range.
pub fn symbol_center_for_sps(sps: u32) -> u32 {
    let clamped = sps.clamp(2, 64);
    (clamped - 1) / 2
}

/// Formats the UI channel suffix for a resolved TDMA channel, e.g.
/// `" (FDMA 0001 S4)"` for step 1, slot 4 (1-based in the label). Pass
/// `slot_hint` to override the label's slot number (e.g. when the caller
/// already knows which slot it is following) instead of the raw `slot`
/// field on [`Resolved`].
pub fn format_channel_suffix(step: u32, slot_hint: Option<i8>, resolved_slot: i8) -> String {
    let slot_for_label = slot_hint.unwrap_or(resolved_slot).max(0) + 1;
    format!(" (FDMA {step:04} S{slot_for_label})")
}

/// Builds the platform CC-candidate cache file path for a system identity
///: `$DSD_NEO_CACHE_DIR/p25_cc_{WACN:05X}_{SYSID:03X}[_R{RFSS}_S{SITE}].txt`.
pub fn cc_cache_path(cache_root: &Path, ctx: SiteContext, include_site: bool) -> PathBuf {
    let name = if include_site {
        format!("p25_cc_{:05X}_{:03X}_R{}_S{}.txt", ctx.wacn, ctx.sysid, ctx.rfss, ctx.site)
    } else {
        format!("p25_cc_{:05X}_{:03X}.txt", ctx.wacn, ctx.sysid)
    };
    cache_root.join(name)
}

/// Loads the persisted CC-candidate cache (one decimal Hz frequency per
/// line, most-recent first) if it exists.
pub fn load_cc_cache(path: &Path) -> Result<Vec<u64>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(path).map_err(|e| ResolverError::CacheIoFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| ResolverError::CacheIoFailed {
            path: path.display().to_string(),
            source: e,
        })?;
        if let Ok(freq) = line.trim().parse::<u64>() {
            out.push(freq);
        }
    }
    Ok(out)
}

/// Persists the CC-candidate cache, most-recent-first, creating parent
/// directories as needed.
pub fn save_cc_cache(path: &Path, freqs: &[u64]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ResolverError::CacheIoFailed {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    let mut file = std::fs::File::create(path).map_err(|e| ResolverError::CacheIoFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    for freq in freqs {
        writeln!(file, "{freq}").map_err(|e| ResolverError::CacheIoFailed {
            path: path.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fdma_entry(ctx: SiteContext) -> IdenEntry {
        IdenEntry {
            base_freq_5hz: 170_200_000,
            spacing_125hz: 100,
            tdma: false,
            channel_type: 1,
            transmit_offset: 0,
            context: ctx,
            trust: Trust::Unknown,
        }
    }

    fn tdma_entry(ctx: SiteContext) -> IdenEntry {
        IdenEntry {
            base_freq_5hz: 170_200_000,
            spacing_125hz: 100,
            tdma: true,
            channel_type: 3,
            transmit_offset: 0,
            context: ctx,
            trust: Trust::Unknown,
        }
    }

    #[test]
    fn tdma_slot_bit_does_not_affect_frequency() {
        let mut plan = ChannelPlan::new();
        plan.learn_iden(2, tdma_entry(SiteContext::default()));
        let a = plan.resolve((2 << 12) | 0).unwrap();
        let b = plan.resolve((2 << 12) | 1).unwrap();
        assert_eq!(a.freq_hz, b.freq_hz);
        assert_ne!(a.slot, b.slot);
    }

    #[test]
    fn tdma_and_fdma_resolve_distinct_symbol_timing() {
        let mut plan = ChannelPlan::new();
        plan.learn_iden(2, tdma_entry(SiteContext::default()));
        let r = plan.resolve((2 << 12) | 1).unwrap();
        assert_eq!(r.samples_per_symbol, 8);
        assert_eq!(r.symbol_center, 3);
        assert_eq!(r.slot, 1);

        plan.learn_iden(1, fdma_entry(SiteContext::default()));
        let r2 = plan.resolve((1 << 12) | 10).unwrap();
        assert_eq!(r2.samples_per_symbol, 10);
        assert_eq!(r2.symbol_center, 4);
        assert_eq!(r2.slot, -1);
    }

    #[test]
    fn provisional_resolves_but_is_gated_for_retune() {
        let mut plan = ChannelPlan::new();
        plan.learn_iden(1, fdma_entry(SiteContext::default()));
        assert!(plan.resolve((1 << 12) | 5).is_ok());
        assert!(plan.retune_allowed(1));

        // A confirmed entry for a *different* iden/context doesn't block.
        let mut confirmed_ctx = SiteContext::default();
        confirmed_ctx.site = 9;
        let mut other = fdma_entry(confirmed_ctx);
        other.trust = Trust::Confirmed;
        plan.idens.insert(9, other);
        assert!(plan.retune_allowed(1));
    }

    #[test]
    fn confirm_idens_for_current_site_promotes_matching_context() {
        let mut plan = ChannelPlan::new();
        let ctx = SiteContext { wacn: 0xBEE00, sysid: 0x1A2, rfss: 3, site: 7 };
        plan.learn_iden(1, fdma_entry(ctx));
        assert_eq!(plan.iden(1).unwrap().trust, Trust::Provisional);
        plan.confirm_idens_for_current_site(ctx);
        assert_eq!(plan.iden(1).unwrap().trust, Trust::Confirmed);
    }

    #[test]
    fn override_takes_precedence_over_iden_arithmetic() {
        let mut plan = ChannelPlan::new();
        plan.learn_iden(1, fdma_entry(SiteContext::default()));
        plan.set_override((1 << 12) | 5, 851_012_500);
        let r = plan.resolve((1 << 12) | 5).unwrap();
        assert_eq!(r.freq_hz, 851_012_500);
    }

    #[test]
    fn symbol_center_boundary_table() {
        let expected = [0u32, 1, 1, 2, 2, 3, 3, 4];
        for (i, &want) in expected.iter().enumerate() {
            let sps = (i + 1) as u32;
            assert_eq!(symbol_center_for_sps(sps), want, "sps={sps}");
        }
    }

    #[test]
    fn cc_candidate_ring_recycles_when_exhausted() {
        let mut ring = CcCandidateRing::new();
        ring.push(851_000_000);
        ring.push(851_500_000);
        assert_eq!(ring.pop_next(), Some(851_000_000));
        assert_eq!(ring.pop_next(), Some(851_500_000));
        assert_eq!(ring.pop_next(), Some(851_000_000));
    }

    #[test]
    fn neighbor_set_ages_out_after_ttl() {
        let mut set = NeighborSet::new();
        set.observe(851_000_000, Duration::from_secs(0));
        set.age_out(Duration::from_secs(60));
        assert_eq!(set.len(), 1);
        set.age_out(Duration::from_secs(30 * 60 + 1));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn cc_cache_roundtrips_through_disk() {
        let dir = std::env::temp_dir().join(format!("dsd_neo_test_{}", std::process::id()));
        let path = cc_cache_path(&dir, SiteContext { wacn: 0xBEE00, sysid: 0x1A2, rfss: 1, site: 1 }, true);
        save_cc_cache(&path, &[851_000_000, 851_500_000]).unwrap();
        let loaded = load_cc_cache(&path).unwrap();
        assert_eq!(loaded, vec![851_000_000, 851_500_000]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn channel_suffix_reflects_forced_slot_hint() {
        let mut plan = ChannelPlan::new();
        let mut entry = tdma_entry(SiteContext::default());
        entry.channel_type = 4; // denom 4
        plan.learn_iden(5, entry);
        let r = plan.resolve((5 << 12) | 7).unwrap();
        assert_eq!(r.slot, 3);
        let step = 7u32 / 4;
        assert_eq!(format_channel_suffix(step, None, r.slot), " (FDMA 0001 S4)");
        assert_eq!(format_channel_suffix(step, Some(0), r.slot), " (FDMA 0001 S1)");
    }

    use proptest::prelude::*;

    proptest! {
        /// IDEN resolver round-trip law: for a 2-slot TDMA iden, the raw
        /// channel carrying step `s` slot 0 and the one carrying step `s`
        /// slot 1 always resolve to the same frequency and always differ in
        /// slot — the slot bit never perturbs the arithmetic that derives
        /// the carrier frequency from the step.
        #[test]
        fn tdma_slot_bit_irrelevant_to_frequency(step in 0u32..2048) {
            let mut plan = ChannelPlan::new();
            plan.learn_iden(2, tdma_entry(SiteContext::default()));
            let raw_a = (step * 2) as u16;
            let raw_b = (step * 2 + 1) as u16;
            let a = plan.resolve((2 << 12) | raw_a).unwrap();
            let b = plan.resolve((2 << 12) | raw_b).unwrap();
            prop_assert_eq!(a.freq_hz, b.freq_hz);
            prop_assert_ne!(a.slot, b.slot);
        }
    }
}
