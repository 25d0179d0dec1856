//! P25 Phase 2 frame pipeline: two interleaved TDMA logical
//! slots, hexbit (6-bit / 3-dibit) Reed-Solomon protection on FACCH/SACCH/ESS,
//! soft-decision erasure marking, and the MAC-VPDU parser.

use std::collections::HashMap;

use crate::fec::rs::{ReedSolomon, RsOutcome};
use crate::protocol::common::{ChannelClass, FrameOutcome, MacVpdu};

/// Default erasure-reliability threshold on a 0..255 scale.
pub const DEFAULT_ERASURE_THRESHOLD: u8 = 64;

/// RS(63,35) FACCH layout: 26 payload hexbits at positions 9..34, 19 parity
/// at 35..53.
pub struct FacchLayout;
impl FacchLayout {
    pub const PAYLOAD_START: usize = 9;
    pub const PAYLOAD_LEN: usize = 26;
    pub const PARITY_START: usize = 35;
    pub const PARITY_LEN: usize = 19;
    pub const MAX_DYNAMIC_ERASURES: usize = 10;
    pub const CAPACITY_OCTETS: usize = 16;
}

/// RS(63,37) SACCH layout: 30 payload hexbits at positions 5..34, 22 parity
/// at 35..56.
pub struct SacchLayout;
impl SacchLayout {
    pub const PAYLOAD_START: usize = 5;
    pub const PAYLOAD_LEN: usize = 30;
    pub const PARITY_START: usize = 35;
    pub const PARITY_LEN: usize = 22;
    pub const MAX_DYNAMIC_ERASURES: usize = 16;
    pub const CAPACITY_OCTETS: usize = 19;
}

/// ESS_B (4V mode): 16 payload hexbits spread across four frames, base
/// bit-offsets 148..171 advanced by 360 bits/frame, at RS positions 0..15.
pub struct EssBLayout;
impl EssBLayout {
    pub const BASE_BIT_OFFSET: usize = 148;
    pub const FRAME_STRIDE_BITS: usize = 360;
    pub const RS_START: usize = 0;
    pub const RS_LEN: usize = 16;
}

/// ESS_A (2V mode): 28 parity hexbits at RS positions 16..43, skipping bits
/// 244..245.
pub struct EssALayout;
impl EssALayout {
    pub const RS_START: usize = 16;
    pub const RS_LEN: usize = 28;
    pub const SKIP_BITS: [usize; 2] = [244, 245];
}

pub const MAX_ESS_DYNAMIC_ERASURES: usize = 28;

/// Maps a bit offset within a Phase 2 TDMA super-frame to the dibit index
/// carrying it, given the current TDMA slot counter.
pub fn dibit_index_for_bit_offset(bit_offset: usize, ts_counter: usize) -> usize {
    (bit_offset + ts_counter * EssBLayout::FRAME_STRIDE_BITS) / 2
}

/// Computes a hexbit's reliability as the minimum of its three constituent
/// dibit reliabilities.
pub fn hexbit_reliability(dibit_reliabilities: &[u8]) -> u8 {
    dibit_reliabilities.iter().copied().min().unwrap_or(0)
}

/// Builds the erasure-position list for an RS codeword given per-position
/// hexbit reliabilities, capping dynamic additions at `max_erasures`.
pub fn mark_erasures(position_reliabilities: &[(usize, u8)], threshold: u8, max_erasures: usize) -> Vec<usize> {
    position_reliabilities
        .iter()
        .filter(|(_, rel)| *rel < threshold)
        .take(max_erasures)
        .map(|(pos, _)| *pos)
        .collect()
}

/// Outcome of an RS decode that distinguishes hard-FEC recovery from
/// soft/erasure-assisted recovery, for the separate "soft RS OK" metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsDecodeKind {
    Hard,
    Soft,
}

pub struct RsDecodeResult {
    pub codeword: Vec<u8>,
    pub outcome: FrameOutcome,
    pub kind: RsDecodeKind,
}

/// Decodes an RS(63,k) codeword (FACCH k=35, SACCH k=37), using erasures if
/// any were marked, otherwise plain error correction.
pub fn decode_with_erasures(rs: &ReedSolomon, received: &[u8], erasures: &[usize]) -> RsDecodeResult {
    let (codeword, rs_outcome, kind) = if erasures.is_empty() {
        let (cw, out) = rs.decode_errors(received);
        (cw, out, RsDecodeKind::Hard)
    } else {
        let (cw, out) = rs.decode_erasures(received, erasures);
        (cw, out, RsDecodeKind::Soft)
    };
    let outcome = match rs_outcome {
        RsOutcome::Uncorrectable => FrameOutcome::Failed,
        RsOutcome::Clean => FrameOutcome::Clean,
        RsOutcome::Corrected { count } => FrameOutcome::Corrected { corrected: count as u32 },
    };
    RsDecodeResult { codeword, outcome, kind }
}

/// (MFID, opcode) -> declared `len_B` lookup table for the MAC-VPDU length
/// resolver. A handful of common P25 Phase 2 MAC opcodes; unknown
/// pairs fall through to the MCO-derived estimate.
pub fn len_b_table() -> HashMap<(u8, u8), usize> {
    let mut m = HashMap::new();
    m.insert((0x00, 0x00), 0usize); // MAC_SIGNAL (no B message)
    m.insert((0x00, 0x01), 9); // MAC_PTT
    m.insert((0x00, 0x02), 9); // MAC_END_PTT
    m.insert((0x00, 0x03), 7); // MAC_IDLE
    m.insert((0x00, 0x04), 9); // MAC_ACTIVE
    m.insert((0x00, 0x05), 7); // MAC_HANGTIME
    m
}

/// Resolved lengths (in octets) of the up-to-three MAC messages packed into
/// one FACCH/SACCH payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacLengths {
    pub len_a: usize,
    pub len_b: usize,
    pub len_c: usize,
}

/// Resolves `(len_A, len_B, len_C)` for a MAC-VPDU payload, idempotent given
/// the same `(channel_class, mac)`.
pub fn resolve_mac_lengths(channel_class: ChannelClass, mac: &[u8], table: &HashMap<(u8, u8), usize>) -> MacLengths {
    let capacity = match channel_class {
        ChannelClass::Sacch => SacchLayout::CAPACITY_OCTETS,
        ChannelClass::Facch | ChannelClass::Lcch => FacchLayout::CAPACITY_OCTETS,
    };
    let len_a = mac.len().min(capacity).min(24);

    let mfid_a = mac.first().copied().unwrap_or(0);
    let opcode_a = mac.get(1).copied().unwrap_or(0) & 0x3F;

    let mut len_b = table.get(&(mfid_a, opcode_a)).copied().unwrap_or(0);
    if len_b == 0 || len_b > capacity {
        let mco = mac.get(1).copied().unwrap_or(0) & 0x3F;
        len_b = (mco.saturating_sub(1) as usize).min(capacity);
    }

    let mut len_c = 0usize;
    let remaining_after_b = capacity.saturating_sub(len_a + len_b);
    if remaining_after_b > 0 {
        let next_header_idx = len_a + len_b;
        let mfid_b = mac.get(next_header_idx).copied().unwrap_or(0);
        let opcode_b = mac.get(next_header_idx + 1).copied().unwrap_or(0) & 0x3F;
        len_c = table.get(&(mfid_b, opcode_b)).copied().unwrap_or(0);
        if len_c == 0 || len_c > remaining_after_b {
            len_c = remaining_after_b;
        }
    }

    MacLengths { len_a, len_b, len_c }
}

/// Parses a decoded FACCH/SACCH/LCCH payload into a [`MacVpdu`] (the first
/// message, A, which carries the primary opcode the TSM/decoder state act on).
pub fn parse_mac_vpdu(channel_class: ChannelClass, payload: &[u8]) -> Option<MacVpdu> {
    if payload.len() < 2 {
        return None;
    }
    let mfid = payload[0];
    let opcode = payload[1] & 0x3F;
    let mut bytes = [0u8; 24];
    let n = payload.len().min(24);
    bytes[..n].copy_from_slice(&payload[..n]);
    Some(MacVpdu { channel_class, mfid, opcode, length: n, payload: bytes })
}

/// MAC_SIGNAL: carries one or more short TSBK-like PDUs, no TSM action.
pub const MAC_OPCODE_SIGNAL: u8 = 0x00;
/// MAC opcode for MAC_PTT, used by the ENC-pending early lockout logic.
pub const MAC_OPCODE_PTT: u8 = 0x01;
pub const MAC_OPCODE_END_PTT: u8 = 0x02;
pub const MAC_OPCODE_IDLE: u8 = 0x03;
pub const MAC_OPCODE_ACTIVE: u8 = 0x04;
/// Bit 0x01 of the MAC_PTT service-options byte signaling encryption.
pub const MAC_PTT_ENC_BIT: u8 = 0x01;

/// Maps a parsed MAC-VPDU opcode to the TSM event it should raise, if any.
/// MAC_PTT/MAC_ACTIVE mark voice presence on `slot`; MAC_END_PTT/MAC_IDLE
/// mark its release. MAC_SIGNAL carries no direct TSM action here.
pub fn mac_event(mac: &MacVpdu, slot: i8) -> Option<crate::protocol::common::SmEvent> {
    use crate::protocol::common::SmEvent;
    match mac.opcode {
        MAC_OPCODE_ACTIVE | MAC_OPCODE_PTT => Some(SmEvent::VoiceSync { slot }),
        MAC_OPCODE_END_PTT | MAC_OPCODE_IDLE => Some(SmEvent::Release { slot }),
        _ => None,
    }
}

/// Per-slot ENC-pending confirmation counter:
/// only locks audio out after two confirming indications.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncPending {
    count: u8,
}

impl EncPending {
    /// Feeds one MAC_PTT observation; returns `true` once the slot should be
    /// locked out (2 confirming indications).
    pub fn observe(&mut self, encrypted_indicated: bool) -> bool {
        if encrypted_indicated {
            self.count = self.count.saturating_add(1);
        } else {
            self.count = 0;
        }
        self.count >= 2
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Per-slot audio jitter ring: depth 4 of 160-sample frames.
#[derive(Debug)]
pub struct JitterRing {
    frames: std::collections::VecDeque<[i16; 160]>,
    capacity: usize,
}

impl Default for JitterRing {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterRing {
    pub fn new() -> Self {
        Self { frames: std::collections::VecDeque::with_capacity(4), capacity: 4 }
    }

    pub fn push(&mut self, frame: [i16; 160]) {
        if self.frames.len() >= self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    pub fn pop(&mut self) -> Option<[i16; 160]> {
        self.frames.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erasure_cap_never_exceeded_even_when_all_unreliable() {
        let positions: Vec<(usize, u8)> = (9..35).map(|p| (p, 0u8)).collect();
        let erasures = mark_erasures(&positions, DEFAULT_ERASURE_THRESHOLD, FacchLayout::MAX_DYNAMIC_ERASURES);
        assert!(erasures.len() <= FacchLayout::MAX_DYNAMIC_ERASURES);
        assert_eq!(erasures.len(), FacchLayout::MAX_DYNAMIC_ERASURES);
    }

    #[test]
    fn hexbit_reliability_is_min_of_constituents() {
        assert_eq!(hexbit_reliability(&[200, 50, 255]), 50);
    }

    #[test]
    fn mac_length_resolution_is_idempotent() {
        let table = len_b_table();
        let mac = vec![0x00u8, 0x01, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x11, 0x22];
        let a = resolve_mac_lengths(ChannelClass::Facch, &mac, &table);
        let b = resolve_mac_lengths(ChannelClass::Facch, &mac, &table);
        assert_eq!(a, b);
        assert_eq!(a.len_b, 9);
    }

    #[test]
    fn mac_length_falls_back_to_mco_derived_estimate() {
        let table = len_b_table();
        // Unknown (mfid, opcode) pair -> falls back to MCO-derived len_b.
        let mac = vec![0x05u8, 0x08, 0, 0, 0, 0, 0, 0, 0];
        let resolved = resolve_mac_lengths(ChannelClass::Facch, &mac, &table);
        assert_eq!(resolved.len_b, (0x08u8 - 1) as usize);
    }

    #[test]
    fn channel_labels_are_facch_sacch_lcch() {
        assert_eq!(ChannelClass::Facch.label(), "FACCH");
        assert_eq!(ChannelClass::Sacch.label(), "SACCH");
        assert_eq!(ChannelClass::Lcch.label(), "LCCH");
    }

    #[test]
    fn enc_pending_locks_after_two_confirmations() {
        let mut enc = EncPending::default();
        assert!(!enc.observe(true));
        assert!(enc.observe(true));
        enc.reset();
        assert!(!enc.observe(true));
    }

    #[test]
    fn jitter_ring_depth_four_pop_matches_push_order() {
        let mut ring = JitterRing::new();
        for i in 0..6u8 {
            let mut frame = [0i16; 160];
            frame[0] = i as i16;
            ring.push(frame);
        }
        // Only the last 4 pushes survive (depth 4).
        assert_eq!(ring.len(), 4);
        assert_eq!(ring.pop().unwrap()[0], 2);
        assert_eq!(ring.pop().unwrap()[0], 3);
    }

    #[test]
    fn facch_rs_recovers_with_marked_erasures() {
        let rs = ReedSolomon::new(63, 35);
        let message: Vec<u8> = (0..35u8).map(|i| i & 0x3F).collect();
        let mut codeword = rs.encode(&message);
        // Damage a few positions and mark them as erasures.
        let erasure_positions = [2usize, 5, 9];
        for &p in &erasure_positions {
            codeword[p] ^= 0x15;
        }
        let result = decode_with_erasures(&rs, &codeword, &erasure_positions);
        assert!(result.outcome.is_ok());
        assert_eq!(result.kind, RsDecodeKind::Soft);
        assert_eq!(&result.codeword[..35], message.as_slice());
    }
}
