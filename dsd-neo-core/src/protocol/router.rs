//! Frame router: turns the raw dibit stream the DSP front end hands the
//! decoder thread into P25/DMR frames and dispatches their side effects —
//! FEC counters, the event history, and the trunking state machine.
//!
//! There is no standalone frame-sync layer in this crate (locating NID/TDMA
//! sync patterns and demultiplexing TDMA slots is out of scope). This router
//! papers over that gap by running the P25 TSBK, P25 TDULC, DMR CSBK, and
//! P25 Phase 2 FACCH/SACCH decoders as independent fixed-size window
//! accumulators over the same dibit stream: each keeps its own little
//! buffer and attempts a decode every time its buffer fills, regardless of
//! whether a real frame actually started there. Whichever window's CRC/FEC
//! passes produces a frame; a window whose buffer fills on garbage just
//! fails its CRC and is silently dropped. This is a deliberate, documented
//! simplification (see DESIGN.md), not how a production decoder gates frame
//! boundaries, and every event here lands on slot 0 since no TDMA slot
//! demultiplexing exists either.

use std::time::{Duration, SystemTime};

use crate::config::RelaxedAcceptance;
use crate::events::{Event, EventSubtype, IdentityHierarchy, SystemType};
use crate::fec::rs::ReedSolomon;
use crate::protocol::common::{ChannelClass, FrameOutcome};
use crate::protocol::p25p2::{self, FacchLayout, SacchLayout};
use crate::protocol::{dmr, p25p1};
use crate::state::DecoderState;
use crate::tsm::{PolicyGates, RetuneCommand};
use crate::utils::dibits_to_bits;

const TSBK_WINDOW_DIBITS: usize = 101;
const TDULC_WINDOW_DIBITS: usize = 144;
const DMR_CSBK_WINDOW_DIBITS: usize = 48;
const RS_N: usize = 63;
const FACCH_WINDOW_HEXBITS: usize = FacchLayout::PAYLOAD_LEN + FacchLayout::PARITY_LEN;
const SACCH_WINDOW_HEXBITS: usize = SacchLayout::PAYLOAD_LEN + SacchLayout::PARITY_LEN;
const FACCH_WINDOW_DIBITS: usize = FACCH_WINDOW_HEXBITS * 3;
const SACCH_WINDOW_DIBITS: usize = SACCH_WINDOW_HEXBITS * 3;

/// A bounded dibit/reliability accumulator that signals once it has
/// collected exactly `capacity` dibits, then resets.
#[derive(Debug, Default)]
struct DibitWindow {
    dibits: Vec<u8>,
    reliabilities: Vec<u8>,
}

impl DibitWindow {
    fn push(&mut self, dibit: u8, reliability: u8, capacity: usize) -> bool {
        self.dibits.push(dibit);
        self.reliabilities.push(reliability);
        self.dibits.len() >= capacity
    }

    fn take(&mut self) -> (Vec<u8>, Vec<u8>) {
        (std::mem::take(&mut self.dibits), std::mem::take(&mut self.reliabilities))
    }
}

fn identity_of(state: &DecoderState) -> IdentityHierarchy {
    IdentityHierarchy {
        wacn: state.identity.wacn,
        sysid: state.identity.sysid,
        nac_or_cc: state.identity.nac_or_cc,
        rfss: state.identity.rfss,
        site: state.identity.site,
    }
}

fn make_event(
    systype: SystemType,
    subtype: EventSubtype,
    identity: IdentityHierarchy,
    group_call: bool,
    source_id: u32,
    target_id: u32,
    now: Duration,
    message: impl Into<String>,
) -> Event {
    Event {
        systype,
        subtype,
        identity,
        group_call,
        encrypted: false,
        source_id,
        target_id,
        wall_clock: SystemTime::now(),
        monotonic: now,
        message: String::new(),
    }
    .with_message(message)
}

/// Converts a run of 6-bit hexbit symbols into a big-endian byte stream
/// (4 hexbits -> 3 bytes), the layout [`p25p1::parse_net_sts_bcst`]-style
/// byte consumers and [`p25p2::parse_mac_vpdu`] expect.
fn hexbits_to_bytes(hexbits: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(hexbits.len() * 6);
    for &h in hexbits {
        for b in (0..6).rev() {
            bits.push((h >> b) & 1);
        }
    }
    crate::utils::pack_bits(&bits)
}

/// Builds a 63-symbol RS codeword from a captured payload+parity window,
/// placed at the layout's real `payload_start`/`parity_start` offsets (the
/// two are contiguous for both FACCH and SACCH). The untouched head and tail
/// this crate has no frame-sync to fill in are left zeroed and reliability-0,
/// so [`p25p2::mark_erasures`] always erases them ahead of the real decode.
fn build_rs_codeword(
    payload_start: usize,
    payload: &[u8],
    payload_rel: &[u8],
    parity: &[u8],
    parity_rel: &[u8],
) -> (Vec<u8>, Vec<(usize, u8)>) {
    let mut codeword = vec![0u8; RS_N];
    let mut rels = vec![0u8; RS_N];
    for (i, &h) in payload.iter().enumerate() {
        codeword[payload_start + i] = h;
        rels[payload_start + i] = payload_rel[i];
    }
    let parity_start = payload_start + payload.len();
    for (i, &h) in parity.iter().enumerate() {
        codeword[parity_start + i] = h;
        rels[parity_start + i] = parity_rel[i];
    }
    let positions: Vec<(usize, u8)> = rels.into_iter().enumerate().collect();
    (codeword, positions)
}

fn hexbits_from_dibits(dibits: &[u8], reliabilities: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut hexbits = Vec::with_capacity(dibits.len() / 3);
    let mut rel = Vec::with_capacity(dibits.len() / 3);
    for (chunk, rel_chunk) in dibits.chunks(3).zip(reliabilities.chunks(3)) {
        if chunk.len() < 3 {
            break;
        }
        hexbits.push((chunk[0] << 4) | (chunk[1] << 2) | chunk[2]);
        rel.push(p25p2::hexbit_reliability(rel_chunk));
    }
    (hexbits, rel)
}

/// Drives the P25/DMR decoders over a live dibit stream, updating
/// `state`'s counters/events/TSM and returning any retune command the
/// trunking state machine raised along the way.
#[derive(Debug, Default)]
pub struct FrameRouter {
    tsbk: DibitWindow,
    tdulc: DibitWindow,
    dmr_csbk: DibitWindow,
    facch: DibitWindow,
    sacch: DibitWindow,
}

impl FrameRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one dibit through every protocol window. Returns the last
    /// retune command raised this call, if any (at most one window
    /// completes and raises a command per dibit in practice).
    pub fn feed(
        &mut self,
        dibit: u8,
        reliability: u8,
        state: &mut DecoderState,
        relaxed: &RelaxedAcceptance,
        lcw_retune: bool,
        now: Duration,
        gates: &PolicyGates,
    ) -> Option<RetuneCommand> {
        let mut retune = None;

        if self.tsbk.push(dibit, reliability, TSBK_WINDOW_DIBITS) {
            let (dibits, rel) = self.tsbk.take();
            self.dispatch_tsbk(&dibits, &rel, state, relaxed, now);
        }
        if self.tdulc.push(dibit, reliability, TDULC_WINDOW_DIBITS) {
            let (dibits, _rel) = self.tdulc.take();
            if let Some(cmd) = self.dispatch_tdulc(&dibits, state, lcw_retune, now, gates) {
                retune = Some(cmd);
            }
        }
        if self.dmr_csbk.push(dibit, reliability, DMR_CSBK_WINDOW_DIBITS) {
            let (dibits, _rel) = self.dmr_csbk.take();
            if let Some(cmd) = self.dispatch_csbk(&dibits, state, relaxed, now, gates) {
                retune = Some(cmd);
            }
        }
        if self.facch.push(dibit, reliability, FACCH_WINDOW_DIBITS) {
            let (dibits, rel) = self.facch.take();
            if let Some(cmd) = self.dispatch_mac(ChannelClass::Facch, &dibits, &rel, state, now, gates) {
                retune = Some(cmd);
            }
        }
        if self.sacch.push(dibit, reliability, SACCH_WINDOW_DIBITS) {
            let (dibits, rel) = self.sacch.take();
            if let Some(cmd) = self.dispatch_mac(ChannelClass::Sacch, &dibits, &rel, state, now, gates) {
                retune = Some(cmd);
            }
        }

        retune
    }

    /// NET_STS_BCST and vendor-opcode side effects only; P25 Phase 1 voice
    /// grants arrive over TDULC (see `dispatch_tdulc`), so this never raises
    /// a retune command.
    fn dispatch_tsbk(
        &mut self,
        dibits: &[u8],
        rel: &[u8],
        state: &mut DecoderState,
        relaxed: &RelaxedAcceptance,
        now: Duration,
    ) {
        let decision = p25p1::decode_tsbk(&[(dibits, rel)]);
        state.counters.p1_tsbk_header.record(decision.outcome);

        let accepted = decision.outcome.is_ok() || relaxed.aggressive_framesync;
        if !accepted {
            return;
        }
        // Relaxed acceptance treats a failed CRC as usable anyway (an
        // explicit, documented broadening of §4.7's aggressive-framesync
        // knob), without claiming the frame was actually clean.
        let decision = if decision.outcome.is_ok() {
            decision
        } else {
            p25p1::TsbkDecision {
                bytes: decision.bytes,
                outcome: FrameOutcome::Corrected { corrected: 0 },
                selected_repetition: decision.selected_repetition,
                mfid: decision.mfid,
                protect: decision.protect,
                lb: decision.lb,
            }
        };

        let opcode = decision.bytes[0] & 0x3F;

        if opcode == p25p1::OPCODE_NET_STS_BCST && decision.bytes.len() >= 8 {
            let bcst = p25p1::parse_net_sts_bcst(&decision.bytes);
            p25p1::apply_net_sts_bcst(&bcst, &mut state.identity, &mut state.channel_plan, &mut state.tsm, false, now);
            state.events.push(
                0,
                make_event(
                    SystemType::P25Phase1,
                    EventSubtype::CcSync,
                    identity_of(state),
                    false,
                    0,
                    0,
                    now,
                    format!("NET_STS_BCST wacn={:05X} sysid={:03X} chan={:04X}", bcst.wacn, bcst.sysid, bcst.channel),
                ),
            );
        } else if let Some(cmd) = p25p1::handle_vendor_opcode(&decision, &mut state.patch_table, now) {
            state.voice_slots[0].encryption.alg = cmd.alg;
            state.voice_slots[0].encryption.key_id = cmd.key_id;
            state.events.push(
                0,
                make_event(
                    SystemType::P25Phase1,
                    EventSubtype::EncryptionUpdate,
                    identity_of(state),
                    true,
                    0,
                    u32::from(cmd.tg),
                    now,
                    format!("harris explicit enc cmd alg={:#04x} key={}", cmd.alg, cmd.key_id),
                ),
            );
        }

    }

    fn dispatch_tdulc(
        &mut self,
        dibits: &[u8],
        state: &mut DecoderState,
        lcw_retune: bool,
        now: Duration,
        gates: &PolicyGates,
    ) -> Option<RetuneCommand> {
        let bits = dibits_to_bits(dibits);
        if bits.len() < 288 {
            return None;
        }
        let mut words = [0u32; 12];
        for (i, chunk) in bits.chunks(24).take(12).enumerate() {
            words[i] = chunk.iter().fold(0u32, |acc, &b| (acc << 1) | u32::from(b));
        }
        let data_words: [u32; 6] = words[..6].try_into().unwrap();
        let parity_words: [u32; 6] = words[6..].try_into().unwrap();

        let (word, outcome) = p25p1::decode_tdulc(&data_words, &parity_words);
        state.counters.p1_voice_rs.record(outcome);

        let word = word?;
        let lastsrc = state.identity.lastsrc;
        let event = p25p1::tdulc_group_grant(&word, lastsrc, lcw_retune)?;
        state.events.push(
            0,
            make_event(
                SystemType::P25Phase1,
                EventSubtype::Grant,
                identity_of(state),
                true,
                lastsrc,
                0,
                now,
                "TDULC group voice channel update",
            ),
        );
        state.tsm.handle_event(event, now, gates)
    }

    fn dispatch_csbk(
        &mut self,
        dibits: &[u8],
        state: &mut DecoderState,
        relaxed: &RelaxedAcceptance,
        now: Duration,
        gates: &PolicyGates,
    ) -> Option<RetuneCommand> {
        let bits = dibits_to_bits(dibits);
        let block: [u8; 96] = bits.try_into().ok()?;
        let csbk = dmr::decode_csbk(&block);
        // No DMR-specific counter bucket exists; CSBKs are this protocol's
        // control-channel signaling blocks, the same role `p1_tsbk_header`
        // counts for P25.
        state.counters.p1_tsbk_header.record(csbk.outcome);

        let accepted = csbk.outcome.is_ok() || relaxed.dmr_crc_relaxed;
        if !accepted {
            return None;
        }
        let mut csbk = if csbk.outcome.is_ok() {
            csbk
        } else {
            crate::protocol::common::CsbkResult { outcome: FrameOutcome::Corrected { corrected: 0 }, ..csbk }
        };

        let event = dmr::dmr_voice_grant(&mut csbk, &state.channel_plan)?;
        state.events.push(
            0,
            make_event(
                SystemType::Dmr,
                EventSubtype::Grant,
                identity_of(state),
                true,
                csbk.source,
                csbk.target,
                now,
                format!("DMR CSBK grant lcn={:?} freq_hz={}", csbk.lcn, csbk.resolved_freq_hz),
            ),
        );
        state.tsm.handle_event(event, now, gates)
    }

    fn dispatch_mac(
        &mut self,
        channel_class: ChannelClass,
        dibits: &[u8],
        rel: &[u8],
        state: &mut DecoderState,
        now: Duration,
        gates: &PolicyGates,
    ) -> Option<RetuneCommand> {
        let (hexbits, hex_rel) = hexbits_from_dibits(dibits, rel);
        // FACCH is RS(63,35), SACCH is RS(63,37): the real message length `k`
        // of the RS code, distinct from this layout's captured payload/parity
        // window (which only spans the portion outside the untracked gap).
        type CounterField = fn(&mut crate::state::DecoderCounters) -> &mut crate::state::FecCounters;
        let (payload_start, payload_len, parity_len, rs_k, max_erasures, counter_field): (
            usize,
            usize,
            usize,
            usize,
            usize,
            CounterField,
        ) = match channel_class {
            ChannelClass::Facch => {
                (FacchLayout::PAYLOAD_START, FacchLayout::PAYLOAD_LEN, FacchLayout::PARITY_LEN, 35, FacchLayout::MAX_DYNAMIC_ERASURES, |c| &mut c.p2_facch_rs)
            }
            ChannelClass::Sacch => {
                (SacchLayout::PAYLOAD_START, SacchLayout::PAYLOAD_LEN, SacchLayout::PARITY_LEN, 37, SacchLayout::MAX_DYNAMIC_ERASURES, |c| &mut c.p2_sacch_rs)
            }
            ChannelClass::Lcch => return None,
        };
        if hexbits.len() < payload_len + parity_len {
            return None;
        }
        let payload = &hexbits[..payload_len];
        let payload_rel = &hex_rel[..payload_len];
        let parity = &hexbits[payload_len..payload_len + parity_len];
        let parity_rel = &hex_rel[payload_len..payload_len + parity_len];

        let (codeword, position_rel) = build_rs_codeword(payload_start, payload, payload_rel, parity, parity_rel);
        let rs = ReedSolomon::new(RS_N, rs_k);
        let erasures = p25p2::mark_erasures(
            &position_rel,
            crate::config::ErasureOptions::default().reliability_threshold,
            max_erasures,
        );
        let result = p25p2::decode_with_erasures(&rs, &codeword, &erasures);
        counter_field(&mut state.counters).record(result.outcome);
        if result.kind == p25p2::RsDecodeKind::Soft && result.outcome.is_ok() {
            state.counters.soft_rs_ok += 1;
        }
        if !result.outcome.is_ok() {
            return None;
        }

        let payload_bytes = hexbits_to_bytes(&result.codeword[payload_start..payload_start + payload_len]);
        let mac = p25p2::parse_mac_vpdu(channel_class, &payload_bytes)?;
        let slot = 0i8;
        state.events.push(
            0,
            make_event(
                SystemType::P25Phase2,
                EventSubtype::Other,
                identity_of(state),
                false,
                0,
                0,
                now,
                format!("{} mac opcode={:#04x}", channel_class.label(), mac.opcode),
            ),
        );
        if mac.opcode == p25p2::MAC_OPCODE_PTT {
            let enc = (mac.payload[2] & p25p2::MAC_PTT_ENC_BIT) != 0;
            if state.voice_slots[0].enc_pending.observe(enc) {
                state.voice_slots[0].audio_allowed = false;
            }
        }
        let event = p25p2::mac_event(&mac, slot)?;
        state.tsm.handle_event(event, now, gates)
    }
}
