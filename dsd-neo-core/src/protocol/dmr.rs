//! DMR Tier II/III pipeline: CACH/SLCO/EMB embedded signaling,
//! 2-slot TDMA, CSBK handling, data-header PDU assembly, and LCN-based
//! channel resolution. Structurally a lighter parallel to the P25 Phase 1
//! pipeline — the TSM shape is identical and shared.

use crate::fec::{crc, hamming};
use crate::protocol::common::{CsbkResult, FrameOutcome, SmEvent};
use crate::resolver::ChannelPlan;
use crate::utils::bits_to_u64;

/// CACH Slot Type / Short Link Control opcode space (the subset the TSM and
/// channel resolver act on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slco {
    Idle,
    ActivityUpdate,
    /// Announces one or more candidate control channels, fed into the
    /// shared CC-candidate cache.
    NeighborAnnouncement,
    Other(u8),
}

impl Slco {
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0b111 {
            0b000 => Slco::Idle,
            0b001 => Slco::ActivityUpdate,
            0b010 => Slco::NeighborAnnouncement,
            other => Slco::Other(other),
        }
    }
}

/// EMB (EMBedded signalling) fields carried in every DMR voice burst.
#[derive(Debug, Clone, Copy)]
pub struct Emb {
    pub color_code: u8,
    pub pi: bool,
    pub lcss: u8,
}

/// Decodes the 8-bit EMB field (4-bit color code, 1-bit PI, 2-bit LCSS,
/// 1-bit parity not separately modeled here).
pub fn decode_emb(raw: u8) -> Emb {
    Emb { color_code: (raw >> 4) & 0x0F, pi: (raw >> 3) & 1 == 1, lcss: (raw >> 1) & 0b11 }
}

/// CSBK opcodes the resolver/TSM act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsbkOpcode {
    NeighborAnnouncement,
    VoiceChannelGrant,
    DataChannelGrant,
    MultiItemGrant,
    ChannelGrantImpliedTg,
    ClearTg,
    /// Primes the TSM for an immediately following grant without itself
    /// causing a retune.
    Preamble,
    Unknown(u8),
}

impl CsbkOpcode {
    pub fn from_raw(raw: u8) -> Self {
        match raw & 0x3F {
            0x01 => CsbkOpcode::NeighborAnnouncement,
            0x02 => CsbkOpcode::Preamble,
            0x03 => CsbkOpcode::VoiceChannelGrant,
            0x04 => CsbkOpcode::DataChannelGrant,
            0x05 => CsbkOpcode::MultiItemGrant,
            0x06 => CsbkOpcode::ChannelGrantImpliedTg,
            0x07 => CsbkOpcode::ClearTg,
            other => CsbkOpcode::Unknown(other),
        }
    }

    /// Whether this opcode, once resolved, should cause a grant to be raised
    /// to the TSM (the Preamble opcode explicitly must not).
    pub fn causes_grant(self) -> bool {
        !matches!(self, CsbkOpcode::Preamble | CsbkOpcode::Unknown(_))
    }
}

/// A DMR CSBK is 96 bits: an 8-bit header (LB|PF|opcode), 8-bit FID, 64-bit
/// payload, 16-bit CRC-CCITT over the first 80 bits, protected overall by a
/// (96,72) shortened BPTC in the real air interface. The BPTC/Hamming
/// deinterleave for raw dibits is a fixed lookup table and out of scope
/// here; this module starts from the already-deinterleaved 96-bit block.
pub fn decode_csbk(block: &[u8; 96]) -> CsbkResult {
    let lb = block[0] == 1;
    let pf = block[1] == 1;
    let opcode = bits_to_u64(block, 2, 6) as u8;
    let fid = bits_to_u64(block, 8, 8) as u8;
    let payload = bits_to_u64(block, 16, 64);

    let crc_ok = crc::check(&block[..80], bits_to_u64(block, 80, 16) as u16);
    let outcome = if crc_ok { FrameOutcome::Clean } else { FrameOutcome::Failed };

    let op = CsbkOpcode::from_raw(opcode);
    let (lpcn, physical_channel_number, lcn, source, target, resolved_freq_hz) = match op {
        CsbkOpcode::VoiceChannelGrant | CsbkOpcode::DataChannelGrant | CsbkOpcode::ChannelGrantImpliedTg => {
            let lcn = ((payload >> 48) & 0x0FFF) as u16;
            let target = ((payload >> 24) & 0x00FF_FFFF) as u32;
            let source = (payload & 0x00FF_FFFF) as u32;
            (Some(lcn), Some(lcn), Some(lcn), source, target, 0u64)
        }
        CsbkOpcode::MultiItemGrant => {
            let lcn = ((payload >> 48) & 0x0FFF) as u16;
            (Some(lcn), Some(lcn), Some(lcn), 0, 0, 0)
        }
        _ => (None, None, None, 0, 0, 0),
    };

    let bytes = pack_csbk_bits(block);
    CsbkResult {
        lb,
        pf,
        opcode,
        fid,
        lpcn,
        physical_channel_number,
        lcn,
        status_bits: 0,
        source,
        target,
        resolved_freq_hz,
        bits: block.to_vec(),
        bytes,
        outcome,
    }
}

fn pack_csbk_bits(block: &[u8; 96]) -> Vec<u8> {
    crate::utils::pack_bits(block)
}

/// Turns a CRC-clean channel-grant CSBK into a TSM [`SmEvent::Grant`],
/// resolving the LCN to a frequency through `channel_plan`.
///
/// `ChannelPlan` is built around P25's `(iden << 12) | chan` keyspace; DMR
/// has no IDEN_UP table of its own, so the LCN is looked up directly in
/// `channel_plan`'s override map (the same path `set_override` populates).
/// This is a pragmatic simplification, not a generic key type: a DMR site
/// sharing raw LCN values with a P25 iden-derived channel id on the same
/// `ChannelPlan` would collide. See DESIGN.md.
pub fn dmr_voice_grant(csbk: &mut CsbkResult, channel_plan: &ChannelPlan) -> Option<SmEvent> {
    let op = CsbkOpcode::from_raw(csbk.opcode);
    if !op.causes_grant() || !csbk.outcome.is_ok() {
        return None;
    }
    let lcn = csbk.lcn?;
    let freq_hz = channel_plan.resolve(lcn).map(|r| r.freq_hz).unwrap_or(0);
    csbk.resolved_freq_hz = freq_hz;
    Some(SmEvent::Grant {
        freq_hz,
        lpcn: csbk.lpcn,
        tg_or_dst: csbk.target,
        src: csbk.source,
        is_group: !matches!(op, CsbkOpcode::DataChannelGrant),
        svc_bits: csbk.status_bits,
    })
}

/// DBSN (Data Block Serial Number) sequence tracker for confirmed-mode data
/// headers.
#[derive(Debug, Default)]
pub struct DbsnTracker {
    expected: u8,
    missing: Vec<u8>,
}

impl DbsnTracker {
    pub fn new() -> Self {
        Self { expected: 0, missing: Vec::new() }
    }

    /// Records an arriving block's DBSN, returning `true` if it was the
    /// expected next block in sequence.
    pub fn observe(&mut self, dbsn: u8) -> bool {
        if dbsn == self.expected {
            self.expected = self.expected.wrapping_add(1);
            true
        } else {
            if !self.missing.contains(&dbsn) {
                self.missing.push(dbsn);
            }
            false
        }
    }

    pub fn missing_blocks(&self) -> &[u8] {
        &self.missing
    }
}

/// Late-entry MI (Message Indicator) fragment accumulator, maintained per
/// slot.
#[derive(Debug, Default, Clone)]
pub struct MiFragments {
    fragments: [Option<u8>; 4],
}

impl MiFragments {
    pub fn set_fragment(&mut self, index: usize, value: u8) {
        if index < self.fragments.len() {
            self.fragments[index] = Some(value);
        }
    }

    /// Returns the reassembled 32-bit MI once all four fragments have
    /// arrived (via late entry or full header reception), `None` otherwise.
    pub fn complete(&self) -> Option<u32> {
        let mut mi = 0u32;
        for frag in self.fragments.iter() {
            mi = (mi << 8) | (*frag)? as u32;
        }
        Some(mi)
    }

    pub fn reset(&mut self) {
        self.fragments = [None; 4];
    }
}

/// Repairs a single Hamming(7,4)-protected DMR voice-sync nibble; used by
/// the short-burst sync/slot-type fields that ride alongside CACH.
pub fn decode_slot_type_nibble(codeword: u8) -> (u8, hamming::HammingOutcome) {
    hamming::decode(codeword)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csbk_block(opcode: u8, fid: u8, payload: u64) -> [u8; 96] {
        let mut bits = [0u8; 96];
        bits[0] = 0; // LB
        bits[1] = 0; // PF
        for i in 0..6 {
            bits[2 + i] = ((opcode >> (5 - i)) & 1) as u8;
        }
        for i in 0..8 {
            bits[8 + i] = ((fid >> (7 - i)) & 1) as u8;
        }
        for i in 0..64 {
            bits[16 + i] = ((payload >> (63 - i)) & 1) as u8;
        }
        let crc = crc::compute(bits[..80].iter().copied());
        for i in 0..16 {
            bits[80 + i] = ((crc >> (15 - i)) & 1) as u8;
        }
        bits
    }

    #[test]
    fn voice_channel_grant_resolves_lcn() {
        let lcn: u64 = 0x0AB;
        let target: u64 = 0x001122;
        let source: u64 = 0x003344;
        let payload = (lcn << 48) | (target << 24) | source;
        let block = csbk_block(0x03, 0x00, payload);
        let decision = decode_csbk(&block);
        assert!(decision.outcome.is_ok());
        assert_eq!(decision.lcn, Some(0x0AB));
        assert_eq!(decision.target, 0x001122);
        assert_eq!(decision.source, 0x003344);
    }

    #[test]
    fn preamble_opcode_never_causes_grant() {
        assert!(!CsbkOpcode::Preamble.causes_grant());
        assert!(CsbkOpcode::VoiceChannelGrant.causes_grant());
    }

    #[test]
    fn dbsn_tracker_flags_out_of_sequence_blocks() {
        let mut tracker = DbsnTracker::new();
        assert!(tracker.observe(0));
        assert!(tracker.observe(1));
        assert!(!tracker.observe(3));
        assert_eq!(tracker.missing_blocks(), &[3]);
    }

    #[test]
    fn mi_fragments_complete_only_once_all_four_present() {
        let mut mi = MiFragments::default();
        mi.set_fragment(0, 0xDE);
        mi.set_fragment(1, 0xAD);
        assert!(mi.complete().is_none());
        mi.set_fragment(2, 0xBE);
        mi.set_fragment(3, 0xEF);
        assert_eq!(mi.complete(), Some(0xDEADBEEF));
    }

    #[test]
    fn slco_neighbor_announcement_decodes() {
        assert_eq!(Slco::from_raw(0b010), Slco::NeighborAnnouncement);
    }
}
