//! P25 Phase 1 frame pipeline: TSBK, TDULC, and the voice frame
//! (HDU/LDU1/LDU2) pipeline.

use std::collections::HashMap;
use std::time::Duration;

use crate::fec::{crc, golay, rs};
use crate::protocol::common::{Duid, FrameOutcome, P1FrameDecision, SmEvent};
use crate::resolver::ChannelPlan;
use crate::state::SystemIdentity;
use crate::utils::{bits_to_u64, dibits_to_bits, majority_vote_bits, pack_bits};

/// Interval (in transmitted dibits) at which a status dibit is inserted; it
/// is stripped before trellis decoding. 101 transmitted dibits minus 3 status
/// dibits at indices 0, 36, 72 leaves the 98-dibit trellis block.
const STATUS_INTERVAL: usize = 36;
const TSBK_REP_LEN: usize = 101;
const TSBK_TRELLIS_DIBITS: usize = 98;
const TSBK_PAYLOAD_BITS: usize = 96;
const TSBK_CRC_PROTECTED_BITS: usize = 80;

/// Strips the fixed-cadence status dibits out of one 101-dibit TSBK repetition,
/// leaving the 98-dibit block the Viterbi decoder consumes.
fn strip_status_dibits(rep: &[u8], reliabilities: &[u8]) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(rep.len(), TSBK_REP_LEN);
    assert_eq!(reliabilities.len(), TSBK_REP_LEN);
    let mut dibits = Vec::with_capacity(TSBK_TRELLIS_DIBITS);
    let mut rel = Vec::with_capacity(TSBK_TRELLIS_DIBITS);
    for (i, (&d, &r)) in rep.iter().zip(reliabilities.iter()).enumerate() {
        if i % STATUS_INTERVAL == 0 {
            continue;
        }
        dibits.push(d);
        rel.push(r);
    }
    (dibits, rel)
}

/// One decoded TSBK repetition: its 96-bit payload and the Viterbi path metric.
struct DecodedRepetition {
    bits: Vec<u8>,
    metric: u32,
    crc_ok: bool,
}

fn decode_repetition(rep: &[u8], reliabilities: &[u8]) -> DecodedRepetition {
    let (dibits, rel) = strip_status_dibits(rep, reliabilities);
    let (data_dibits, metric) = crate::fec::viterbi::decode(&dibits, &rel);
    let bits = dibits_to_bits(&data_dibits);
    assert_eq!(bits.len(), TSBK_PAYLOAD_BITS);
    let crc_ok = crc::check(&bits[..TSBK_CRC_PROTECTED_BITS], tsbk_crc_field(&bits));
    DecodedRepetition { bits, metric, crc_ok }
}

fn tsbk_crc_field(bits: &[u8]) -> u16 {
    bits_to_u64(bits, TSBK_CRC_PROTECTED_BITS, TSBK_PAYLOAD_BITS - TSBK_CRC_PROTECTED_BITS) as u16
}

/// Result of decoding up to 3 TSBK repetitions.
pub struct TsbkDecision {
    pub bytes: Vec<u8>,
    pub outcome: FrameOutcome,
    /// Index (0-based) of the repetition selected by CRC pass, if any;
    /// `None` means the majority-vote path was taken.
    pub selected_repetition: Option<usize>,
    pub mfid: u8,
    pub protect: bool,
    pub lb: bool,
}

/// Decodes a TSBK from up to 3 status-stripped 101-dibit repetitions.
/// Selects the first repetition whose CRC passes; otherwise majority-votes
/// the 96 bits across all available repetitions and recomputes the CRC.
pub fn decode_tsbk(repetitions: &[(&[u8], &[u8])]) -> TsbkDecision {
    assert!(!repetitions.is_empty() && repetitions.len() <= 3);
    let decoded: Vec<DecodedRepetition> = repetitions
        .iter()
        .map(|(rep, rel)| decode_repetition(rep, rel))
        .collect();

    let (bytes_bits, outcome, selected_repetition) =
        if let Some((idx, rep)) = decoded.iter().enumerate().find(|(_, r)| r.crc_ok) {
            let outcome = if rep.metric == 0 {
                FrameOutcome::Clean
            } else {
                FrameOutcome::Corrected { corrected: rep.metric }
            };
            (rep.bits.clone(), outcome, Some(idx))
        } else {
            let bit_slices: Vec<&[u8]> = decoded.iter().map(|r| r.bits.as_slice()).collect();
            let majority = majority_vote_bits(&bit_slices);
            let crc_ok = crc::check(
                &majority[..TSBK_CRC_PROTECTED_BITS],
                tsbk_crc_field(&majority),
            );
            let outcome = if crc_ok {
                FrameOutcome::Corrected { corrected: decoded.iter().map(|r| r.metric).sum() }
            } else {
                FrameOutcome::Failed
            };
            (majority, outcome, None)
        };

    let bytes = pack_bits(&bytes_bits);
    let mfid = bytes[1];
    let protect = (bytes[0] >> 6) & 1 == 1;
    let lb = (bytes[0] >> 7) & 1 == 1;

    TsbkDecision { bytes, outcome, selected_repetition, mfid, protect, lb }
}

/// Builds the MAC-like PDU dispatched to the trunking state machine when
/// `MFID < 2 ∧ protect = 0 ∧ CRC OK`: DUID 0x07, MAC-coded opcode = raw
/// opcode | 0x40, payload bytes 2..9, CRC bytes zeroed.
pub fn build_mac_like_pdu(decision: &TsbkDecision) -> Option<P1FrameDecision> {
    if decision.mfid >= 2 || decision.protect || !decision.outcome.is_ok() {
        return None;
    }
    let raw_opcode = decision.bytes[0] & 0x3F;
    let mut pdu = vec![0u8; 24];
    pdu[0] = 0x07;
    pdu[1] = raw_opcode | 0x40;
    let payload_len = (9usize.min(decision.bytes.len())).saturating_sub(2);
    pdu[2..2 + payload_len].copy_from_slice(&decision.bytes[2..2 + payload_len]);
    // CRC bytes (last two) explicitly zeroed, matching spec wording.
    let len = pdu.len();
    pdu[len - 2] = 0;
    pdu[len - 1] = 0;

    Some(P1FrameDecision { duid: Duid::Mpdu, bits: pdu, outcome: decision.outcome })
}

/// NET_STS_BCST abbreviated opcode value.
pub const OPCODE_NET_STS_BCST: u8 = 0x3B;
/// Motorola regroup/vendor-status manufacturer ID.
pub const MFID_MOTOROLA: u8 = 0x90;
/// Harris explicit-encryption-command manufacturer ID.
pub const MFID_HARRIS: u8 = 0xA4;

/// LCW format field value for "Group Voice Channel Update, explicit channel".
pub const LCW_FORMAT_GROUP_VOICE_CHANNEL_UPDATE: u8 = 0x44;

/// A parsed TDULC link-control word, once RS(24,12,13)-protected and Golay
/// words check out.
pub struct TduLcWord {
    pub format: u8,
    pub service_bits: u8,
    pub tg: u16,
    pub chan_t: u16,
}

/// Decodes a TDULC: 6 Golay(24,12)-protected 12-bit data words and 6
/// Golay(24,12)-protected 12-bit parity words, assembled into a 72-bit LC
/// protected by RS(24,12,13) over GF(2^6) (12 data hexbits + 12 parity
/// hexbits = 24 symbols of 6 bits each — the RS(24,12) codec already speaks
/// this hexbit alphabet directly).
pub fn decode_tdulc(data_words: &[u32; 6], parity_words: &[u32; 6]) -> (Option<TduLcWord>, FrameOutcome) {
    let mut hexbits = [0u8; 24];
    let mut total_bit_errors = 0u32;
    let mut any_uncorrectable = false;

    for (i, &cw) in data_words.iter().enumerate() {
        let (data12, outcome) = golay::decode(cw);
        match outcome {
            golay::GolayOutcome::Uncorrectable => any_uncorrectable = true,
            golay::GolayOutcome::Corrected { bit_errors } => total_bit_errors += bit_errors,
            golay::GolayOutcome::Clean => {}
        }
        hexbits[i * 2] = ((data12 >> 6) & 0x3F) as u8;
        hexbits[i * 2 + 1] = (data12 & 0x3F) as u8;
    }
    for (i, &cw) in parity_words.iter().enumerate() {
        let (data12, outcome) = golay::decode(cw);
        match outcome {
            golay::GolayOutcome::Uncorrectable => any_uncorrectable = true,
            golay::GolayOutcome::Corrected { bit_errors } => total_bit_errors += bit_errors,
            golay::GolayOutcome::Clean => {}
        }
        hexbits[12 + i * 2] = ((data12 >> 6) & 0x3F) as u8;
        hexbits[12 + i * 2 + 1] = (data12 & 0x3F) as u8;
    }

    if any_uncorrectable {
        return (None, FrameOutcome::Failed);
    }

    let rs = rs::ReedSolomon::new(24, 12);
    let (corrected, rs_outcome) = rs.decode_errors(&hexbits);
    let outcome = match rs_outcome {
        rs::RsOutcome::Uncorrectable => return (None, FrameOutcome::Failed),
        rs::RsOutcome::Clean if total_bit_errors == 0 => FrameOutcome::Clean,
        rs::RsOutcome::Clean => FrameOutcome::Corrected { corrected: total_bit_errors },
        rs::RsOutcome::Corrected { count } => {
            FrameOutcome::Corrected { corrected: total_bit_errors + count as u32 }
        }
    };

    // Reassemble the 72-bit LC from the 12 corrected data hexbits (positions
    // 0..12 are the message; RS(24,12) is systematic).
    let mut lc_bits = Vec::with_capacity(72);
    for &h in &corrected[..12] {
        for b in (0..6).rev() {
            lc_bits.push((h >> b) & 1);
        }
    }
    let format = bits_to_u64(&lc_bits, 0, 8) as u8;
    let word = if format == LCW_FORMAT_GROUP_VOICE_CHANNEL_UPDATE {
        let service_bits = bits_to_u64(&lc_bits, 8, 8) as u8;
        let tg = bits_to_u64(&lc_bits, 16, 16) as u16;
        let chan_t = bits_to_u64(&lc_bits, 32, 16) as u16;
        Some(TduLcWord { format, service_bits, tg, chan_t })
    } else {
        Some(TduLcWord { format, service_bits: 0, tg: 0, chan_t: 0 })
    };
    (word, outcome)
}

/// Raises the group-voice-channel-update grant carried in a TDULC, gated by
/// the `lcw_retune` policy toggle. Only format 0x44 carries a channel update;
/// anything else (or `lcw_retune = false`) yields no event. The channel
/// field is passed through unresolved as `lpcn`; frequency resolution is the
/// channel plan's job, not this one's.
pub fn tdulc_group_grant(word: &TduLcWord, lastsrc: u32, lcw_retune: bool) -> Option<SmEvent> {
    if !lcw_retune || word.format != LCW_FORMAT_GROUP_VOICE_CHANNEL_UPDATE {
        return None;
    }
    Some(SmEvent::Grant {
        freq_hz: 0,
        lpcn: Some(word.chan_t),
        tg_or_dst: word.tg as u32,
        src: lastsrc,
        is_group: true,
        svc_bits: word.service_bits,
    })
}

/// Accumulates voice-frame (HDU/LDU1/LDU2) quality state: the IMBE
/// error moving average and a DUID histogram. IMBE/AMBE bitstream decode
/// itself is out of scope; this only tracks the header ECC outcomes and
/// per-voice-frame error counts fed to it.
#[derive(Debug, Default)]
pub struct VoiceFramePipeline {
    pub imbe_error_avg: Option<crate::utils::MovingAverage>,
    pub duid_histogram: std::collections::HashMap<Duid, u64>,
}

impl VoiceFramePipeline {
    pub fn new() -> Self {
        Self { imbe_error_avg: Some(crate::utils::MovingAverage::new(64)), duid_histogram: Default::default() }
    }

    pub fn record_duid(&mut self, duid: Duid) {
        *self.duid_histogram.entry(duid).or_insert(0) += 1;
    }

    pub fn record_voice_errors(&mut self, corrected_bits: u32) {
        if let Some(avg) = self.imbe_error_avg.as_mut() {
            avg.push(corrected_bits as f64);
        }
    }

    pub fn voice_error_rate(&self) -> f64 {
        self.imbe_error_avg.as_ref().map(|a| a.mean()).unwrap_or(0.0)
    }
}

/// A single Motorola-style talkgroup regroup/patch: calls addressed to
/// `superseded_tg` are treated as if addressed to `patched_tg` until the
/// patch is cleared. Vendor status opcodes only refresh `last_seen` on an
/// existing entry; they never create one.
#[derive(Debug, Clone, Copy)]
pub struct PatchTableEntry {
    pub patched_tg: u16,
    pub last_seen: Duration,
}

/// Vendor-opcode side effects (Motorola MFID 0x90 regroup/vendor-status)
/// land here rather than tuning a voice channel — §4.3 is explicit that
/// these opcodes update local bookkeeping, not the retune path.
#[derive(Debug, Default)]
pub struct PatchTable {
    entries: HashMap<u16, PatchTableEntry>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or refreshes a regroup patch (`superseded_tg` -> `patched_tg`).
    pub fn apply_regroup(&mut self, superseded_tg: u16, patched_tg: u16, now: Duration) {
        self.entries.insert(superseded_tg, PatchTableEntry { patched_tg, last_seen: now });
    }

    /// Refreshes an existing patch's `last_seen` without changing its target;
    /// a vendor-status opcode for a TG with no prior regroup is a no-op.
    pub fn apply_vendor_status(&mut self, tg: u16, now: Duration) {
        if let Some(entry) = self.entries.get_mut(&tg) {
            entry.last_seen = now;
        }
    }

    pub fn clear(&mut self, tg: u16) {
        self.entries.remove(&tg);
    }

    /// Resolves a talkgroup through any active patch, passing it through
    /// unchanged if no patch applies.
    pub fn resolve(&self, tg: u16) -> u16 {
        self.entries.get(&tg).map(|e| e.patched_tg).unwrap_or(tg)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Harris MFID 0xA4 explicit-encryption-command payload: the algorithm and
/// key ID a subsequent voice grant on this talkgroup should honor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarrisEncryptionCommand {
    pub tg: u16,
    pub alg: u8,
    pub key_id: u16,
}

/// Outcome of dispatching a vendor-specific TSBK opcode (§4.3): Motorola
/// regroup/vendor-status mutate `patch_table` in place and return nothing;
/// Harris's explicit-encryption-command is returned for the caller to apply
/// to the relevant voice slot's [`crate::state::EncryptionParams`].
pub fn handle_vendor_opcode(
    decision: &TsbkDecision,
    patch_table: &mut PatchTable,
    now: Duration,
) -> Option<HarrisEncryptionCommand> {
    if !decision.outcome.is_ok() {
        return None;
    }
    let opcode = decision.bytes[0] & 0x3F;
    match decision.mfid {
        MFID_MOTOROLA => {
            // Byte layout: opcode-specific, but both regroup and vendor
            // status carry the affected TG at bytes 4..6 and, for regroup,
            // the patched TG at bytes 6..8.
            let tg = u16::from_be_bytes([decision.bytes[4], decision.bytes[5]]);
            const MOTOROLA_OPCODE_REGROUP: u8 = 0x0E;
            if opcode == MOTOROLA_OPCODE_REGROUP {
                let patched_tg = u16::from_be_bytes([decision.bytes[6], decision.bytes[7]]);
                patch_table.apply_regroup(tg, patched_tg, now);
            } else {
                patch_table.apply_vendor_status(tg, now);
            }
            None
        }
        MFID_HARRIS => {
            let tg = u16::from_be_bytes([decision.bytes[4], decision.bytes[5]]);
            let alg = decision.bytes[6];
            let key_id = u16::from_be_bytes([decision.bytes[7], decision.bytes[8]]);
            Some(HarrisEncryptionCommand { tg, alg, key_id })
        }
        _ => None,
    }
}

/// A parsed NET_STS_BCST abbreviated TSBK (opcode 0x3B): system identity plus
/// the embedded control-channel IDEN/channel the site currently advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetStsBcst {
    pub wacn: u32,
    pub sysid: u16,
    pub channel: u16,
}

/// Parses the TSBK payload bytes of a decoded NET_STS_BCST. Layout (bytes
/// after the opcode/mfid header): WACN in the top 20 bits of bytes 2..5 and
/// the low nibble of byte 4, SYSID the low 12 bits spanning bytes 4..6, CC
/// channel in bytes 6..8.
pub fn parse_net_sts_bcst(bytes: &[u8]) -> NetStsBcst {
    let wacn = (u32::from(bytes[2]) << 12) | (u32::from(bytes[3]) << 4) | (u32::from(bytes[4]) >> 4);
    let sysid = (u16::from(bytes[4] & 0x0F) << 8) | u16::from(bytes[5]);
    let channel = u16::from_be_bytes([bytes[6], bytes[7]]);
    NetStsBcst { wacn, sysid, channel }
}

/// Applies a decoded NET_STS_BCST to system identity and the channel plan
/// (§4.3): learns WACN/SYSID unless `p2_hardset` pins them from config,
/// registers the CC frequency with the trunking state machine, records the
/// site as a neighbor, and promotes any provisional IDEN entries matching
/// the now-confirmed site.
pub fn apply_net_sts_bcst(
    bcst: &NetStsBcst,
    identity: &mut SystemIdentity,
    channel_plan: &mut ChannelPlan,
    tsm: &mut crate::tsm::Tsm,
    p2_hardset: bool,
    now: Duration,
) {
    if !p2_hardset {
        identity.wacn = bcst.wacn;
        identity.sysid = bcst.sysid;
    }
    if let Ok(resolved) = channel_plan.resolve(bcst.channel) {
        tsm.enter_on_cc(resolved.freq_hz);
        channel_plan.neighbors.observe(resolved.freq_hz, now);
    }
    channel_plan.confirm_idens_for_current_site(identity.as_context());
    identity.note_cc_sync(std::time::SystemTime::now(), now);
}
