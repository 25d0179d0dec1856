//! Decoder options: the immutable-after-startup configuration record.
//!
//! Every field that participates in CLI > env > config-file > built-in-default
//! precedence is `Option<T>` at the merge-fragment level (`DecoderOptionsLayer`)
//! so that "not set" is distinguishable from "set to the zero value"; layers are
//! deep-merged cheapest-first into a fully-resolved `DecoderOptions` via
//! `DecoderOptionsLayer::resolve`. The resolved struct carries plain (non-Option)
//! fields plus built-in defaults baked in, since downstream code (DSP feeder,
//! TSM, frame pipeline) should never have to re-ask "did the user set this".

use serde::{Deserialize, Serialize};

/// Where raw samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    PulseAudio,
    Stdin,
    WavFile,
    RtlSdr,
    SymbolCaptureFile,
    UdpPcm16Le,
    TcpPcm16Le,
    Null,
}

/// Where decoded PCM/events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSink {
    PulseAudio,
    WavFile,
    UdpPcm16Le,
    Null,
}

/// Enables the protocol family decoders that the frame pipeline will try
/// against incoming symbol streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEnables {
    pub p25_phase1: bool,
    pub p25_phase2: bool,
    pub dmr: bool,
    pub nxdn: bool,
    pub dpmr: bool,
    pub ysf: bool,
    pub dstar: bool,
    pub m17: bool,
    pub edacs: bool,
}

impl Default for ProtocolEnables {
    fn default() -> Self {
        Self {
            p25_phase1: true,
            p25_phase2: true,
            dmr: true,
            nxdn: false,
            dpmr: false,
            ysf: false,
            dstar: false,
            m17: false,
            edacs: false,
        }
    }
}

/// Trunking behavior toggles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrunkingOptions {
    pub enable: bool,
    pub allow_list_mode: bool,
    pub tune_group_calls: bool,
    pub tune_private_calls: bool,
    pub tune_data_calls: bool,
    pub tune_encrypted_calls: bool,
    pub hangtime_s: f64,
    pub tg_hold: u32,
    pub lcw_retune: bool,
    /// When set, NET_STS_BCST never overwrites the configured WACN/SYSID —
    /// the operator has hard-set them (e.g. from a known system CSV).
    pub p2_hardset: bool,
}

impl Default for TrunkingOptions {
    fn default() -> Self {
        Self {
            enable: true,
            allow_list_mode: false,
            tune_group_calls: true,
            tune_private_calls: true,
            tune_data_calls: false,
            tune_encrypted_calls: true,
            hangtime_s: 1.0,
            tg_hold: 0,
            lcw_retune: true,
            p2_hardset: false,
        }
    }
}

/// DSP front-end knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DspOptions {
    pub enable_filters: bool,
    pub fm_agc_enable: bool,
    pub fll_enable: bool,
    pub fll_kp: f64,
    pub fll_ki: f64,
    pub ted_enable: bool,
    pub c4fm_clock_assist: bool,
    pub c4fm_assist_after_lock: bool,
    pub retune_drain_ms: u64,
}

impl Default for DspOptions {
    fn default() -> Self {
        Self {
            enable_filters: true,
            fm_agc_enable: true,
            fll_enable: true,
            fll_kp: 0.05,
            fll_ki: 0.0025,
            ted_enable: true,
            c4fm_clock_assist: true,
            c4fm_assist_after_lock: false,
            retune_drain_ms: 50,
        }
    }
}

/// Per-protocol voice-channel follower tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FollowerOptions {
    pub vc_grace_s: f64,
    pub min_follow_dwell_s: f64,
    pub grant_voice_to_s: f64,
    pub retune_backoff_s: f64,
    pub force_release_extra_s: f64,
    pub force_release_margin_s: f64,
    pub p25p1_err_hold_s: f64,
    pub ring_hold_s: f64,
    pub mac_hold_s: f64,
    pub cc_grace_s: f64,
}

impl Default for FollowerOptions {
    fn default() -> Self {
        Self {
            vc_grace_s: 0.5,
            min_follow_dwell_s: 0.5,
            grant_voice_to_s: 1.5,
            retune_backoff_s: 1.0,
            force_release_extra_s: 1.0,
            force_release_margin_s: 0.5,
            p25p1_err_hold_s: 0.5,
            ring_hold_s: 0.75,
            mac_hold_s: 3.0,
            cc_grace_s: 3.0,
        }
    }
}

/// Relaxed-acceptance knobs that broaden CRC/sync acceptance rather than
/// reject. Default to the conservative, non-relaxed behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RelaxedAcceptance {
    pub dmr_crc_relaxed: bool,
    pub aggressive_framesync: bool,
}

/// Soft-decision erasure threshold for P25 Phase 2 RS decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureOptions {
    pub reliability_threshold: u8,
}

impl Default for ErasureOptions {
    fn default() -> Self {
        Self {
            reliability_threshold: 64,
        }
    }
}

/// Fully-resolved, immutable-after-startup decoder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderOptions {
    pub input_source: InputSource,
    pub output_sink: OutputSink,
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub sample_rate_hz: u32,
    pub dsp_rate_hz: u32,
    pub center_freq_hz: u64,

    pub trunking: TrunkingOptions,
    pub protocols: ProtocolEnables,
    pub dsp: DspOptions,
    pub follower: FollowerOptions,
    pub relaxed: RelaxedAcceptance,
    pub erasure: ErasureOptions,

    pub cache_dir: Option<String>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            input_source: InputSource::RtlSdr,
            output_sink: OutputSink::PulseAudio,
            input_path: None,
            output_path: None,
            sample_rate_hz: 2_048_000,
            dsp_rate_hz: 48_000,
            center_freq_hz: 0,
            trunking: TrunkingOptions::default(),
            protocols: ProtocolEnables::default(),
            dsp: DspOptions::default(),
            follower: FollowerOptions::default(),
            relaxed: RelaxedAcceptance::default(),
            erasure: ErasureOptions::default(),
            cache_dir: None,
        }
    }
}

/// An overlay fragment: every field optional, used for one precedence layer
/// (built-in default, config file [+ profile overlay], environment, CLI).
/// Layers are merged lowest-to-highest precedence via [`DecoderOptionsLayer::merge`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecoderOptionsLayer {
    pub input_source: Option<InputSource>,
    pub output_sink: Option<OutputSink>,
    pub input_path: Option<String>,
    pub output_path: Option<String>,
    pub sample_rate_hz: Option<u32>,
    pub dsp_rate_hz: Option<u32>,
    pub center_freq_hz: Option<u64>,

    pub trunking_enable: Option<bool>,
    pub allow_list_mode: Option<bool>,
    pub tune_group_calls: Option<bool>,
    pub tune_private_calls: Option<bool>,
    pub tune_data_calls: Option<bool>,
    pub tune_encrypted_calls: Option<bool>,
    pub hangtime_s: Option<f64>,
    pub tg_hold: Option<u32>,
    pub lcw_retune: Option<bool>,
    pub p2_hardset: Option<bool>,

    pub p25_phase1: Option<bool>,
    pub p25_phase2: Option<bool>,
    pub dmr: Option<bool>,
    pub nxdn: Option<bool>,
    pub dpmr: Option<bool>,
    pub ysf: Option<bool>,
    pub dstar: Option<bool>,
    pub m17: Option<bool>,
    pub edacs: Option<bool>,

    pub enable_filters: Option<bool>,
    pub fm_agc_enable: Option<bool>,
    pub fll_enable: Option<bool>,
    pub fll_kp: Option<f64>,
    pub fll_ki: Option<f64>,
    pub ted_enable: Option<bool>,
    pub c4fm_clock_assist: Option<bool>,
    pub c4fm_assist_after_lock: Option<bool>,
    pub retune_drain_ms: Option<u64>,

    pub vc_grace_s: Option<f64>,
    pub min_follow_dwell_s: Option<f64>,
    pub grant_voice_to_s: Option<f64>,
    pub retune_backoff_s: Option<f64>,
    pub force_release_extra_s: Option<f64>,
    pub force_release_margin_s: Option<f64>,
    pub p25p1_err_hold_s: Option<f64>,
    pub ring_hold_s: Option<f64>,
    pub mac_hold_s: Option<f64>,
    pub cc_grace_s: Option<f64>,

    pub dmr_crc_relaxed: Option<bool>,
    pub aggressive_framesync: Option<bool>,
    pub erasure_reliability_threshold: Option<u8>,

    pub cache_dir: Option<String>,
}

macro_rules! overlay {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field;
            }
        )+
    };
}

impl DecoderOptionsLayer {
    /// Overlays `higher` onto `self` in place, `higher` winning per field.
    pub fn merge(&mut self, higher: &DecoderOptionsLayer) {
        overlay!(
            self, higher,
            input_source, output_sink, input_path, output_path, sample_rate_hz,
            dsp_rate_hz, center_freq_hz, trunking_enable, allow_list_mode,
            tune_group_calls, tune_private_calls, tune_data_calls,
            tune_encrypted_calls, hangtime_s, tg_hold, lcw_retune, p2_hardset,
            p25_phase1, p25_phase2, dmr, nxdn, dpmr, ysf, dstar, m17, edacs,
            enable_filters, fm_agc_enable, fll_enable, fll_kp, fll_ki,
            ted_enable, c4fm_clock_assist, c4fm_assist_after_lock,
            retune_drain_ms, vc_grace_s, min_follow_dwell_s, grant_voice_to_s,
            retune_backoff_s, force_release_extra_s, force_release_margin_s,
            p25p1_err_hold_s, ring_hold_s, mac_hold_s, cc_grace_s,
            dmr_crc_relaxed, aggressive_framesync, erasure_reliability_threshold,
            cache_dir,
        );
    }

    /// Folds `[default, file, env, cli]` (lowest to highest precedence) into a
    /// fully-resolved [`DecoderOptions`]. Each layer is optional in the slice.
    pub fn resolve(layers: &[DecoderOptionsLayer]) -> DecoderOptions {
        let mut merged = DecoderOptionsLayer::default();
        for layer in layers {
            merged.merge(layer);
        }
        let base = DecoderOptions::default();
        DecoderOptions {
            input_source: merged.input_source.unwrap_or(base.input_source),
            output_sink: merged.output_sink.unwrap_or(base.output_sink),
            input_path: merged.input_path.or(base.input_path),
            output_path: merged.output_path.or(base.output_path),
            sample_rate_hz: merged.sample_rate_hz.unwrap_or(base.sample_rate_hz),
            dsp_rate_hz: merged.dsp_rate_hz.unwrap_or(base.dsp_rate_hz),
            center_freq_hz: merged.center_freq_hz.unwrap_or(base.center_freq_hz),
            trunking: TrunkingOptions {
                enable: merged.trunking_enable.unwrap_or(base.trunking.enable),
                allow_list_mode: merged.allow_list_mode.unwrap_or(base.trunking.allow_list_mode),
                tune_group_calls: merged.tune_group_calls.unwrap_or(base.trunking.tune_group_calls),
                tune_private_calls: merged
                    .tune_private_calls
                    .unwrap_or(base.trunking.tune_private_calls),
                tune_data_calls: merged.tune_data_calls.unwrap_or(base.trunking.tune_data_calls),
                tune_encrypted_calls: merged
                    .tune_encrypted_calls
                    .unwrap_or(base.trunking.tune_encrypted_calls),
                hangtime_s: merged.hangtime_s.unwrap_or(base.trunking.hangtime_s),
                tg_hold: merged.tg_hold.unwrap_or(base.trunking.tg_hold),
                lcw_retune: merged.lcw_retune.unwrap_or(base.trunking.lcw_retune),
                p2_hardset: merged.p2_hardset.unwrap_or(base.trunking.p2_hardset),
            },
            protocols: ProtocolEnables {
                p25_phase1: merged.p25_phase1.unwrap_or(base.protocols.p25_phase1),
                p25_phase2: merged.p25_phase2.unwrap_or(base.protocols.p25_phase2),
                dmr: merged.dmr.unwrap_or(base.protocols.dmr),
                nxdn: merged.nxdn.unwrap_or(base.protocols.nxdn),
                dpmr: merged.dpmr.unwrap_or(base.protocols.dpmr),
                ysf: merged.ysf.unwrap_or(base.protocols.ysf),
                dstar: merged.dstar.unwrap_or(base.protocols.dstar),
                m17: merged.m17.unwrap_or(base.protocols.m17),
                edacs: merged.edacs.unwrap_or(base.protocols.edacs),
            },
            dsp: DspOptions {
                enable_filters: merged.enable_filters.unwrap_or(base.dsp.enable_filters),
                fm_agc_enable: merged.fm_agc_enable.unwrap_or(base.dsp.fm_agc_enable),
                fll_enable: merged.fll_enable.unwrap_or(base.dsp.fll_enable),
                fll_kp: merged.fll_kp.unwrap_or(base.dsp.fll_kp),
                fll_ki: merged.fll_ki.unwrap_or(base.dsp.fll_ki),
                ted_enable: merged.ted_enable.unwrap_or(base.dsp.ted_enable),
                c4fm_clock_assist: merged.c4fm_clock_assist.unwrap_or(base.dsp.c4fm_clock_assist),
                c4fm_assist_after_lock: merged
                    .c4fm_assist_after_lock
                    .unwrap_or(base.dsp.c4fm_assist_after_lock),
                retune_drain_ms: merged.retune_drain_ms.unwrap_or(base.dsp.retune_drain_ms),
            },
            follower: FollowerOptions {
                vc_grace_s: merged.vc_grace_s.unwrap_or(base.follower.vc_grace_s),
                min_follow_dwell_s: merged
                    .min_follow_dwell_s
                    .unwrap_or(base.follower.min_follow_dwell_s),
                grant_voice_to_s: merged.grant_voice_to_s.unwrap_or(base.follower.grant_voice_to_s),
                retune_backoff_s: merged.retune_backoff_s.unwrap_or(base.follower.retune_backoff_s),
                force_release_extra_s: merged
                    .force_release_extra_s
                    .unwrap_or(base.follower.force_release_extra_s),
                force_release_margin_s: merged
                    .force_release_margin_s
                    .unwrap_or(base.follower.force_release_margin_s),
                p25p1_err_hold_s: merged.p25p1_err_hold_s.unwrap_or(base.follower.p25p1_err_hold_s),
                ring_hold_s: merged.ring_hold_s.unwrap_or(base.follower.ring_hold_s),
                mac_hold_s: merged.mac_hold_s.unwrap_or(base.follower.mac_hold_s),
                cc_grace_s: merged.cc_grace_s.unwrap_or(base.follower.cc_grace_s),
            },
            relaxed: RelaxedAcceptance {
                dmr_crc_relaxed: merged.dmr_crc_relaxed.unwrap_or(base.relaxed.dmr_crc_relaxed),
                aggressive_framesync: merged
                    .aggressive_framesync
                    .unwrap_or(base.relaxed.aggressive_framesync),
            },
            erasure: ErasureOptions {
                reliability_threshold: merged
                    .erasure_reliability_threshold
                    .unwrap_or(base.erasure.reliability_threshold),
            },
            cache_dir: merged.cache_dir.or(base.cache_dir),
        }
    }
}

/// Reads the documented environment-variable overlay (one var per knob) into a
/// layer. Unset/unparseable variables simply leave the corresponding field `None`.
pub fn layer_from_env() -> DecoderOptionsLayer {
    fn parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|v| v.parse().ok())
    }
    fn parse_bool(key: &str) -> Option<bool> {
        std::env::var(key).ok().and_then(|v| match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
    }

    DecoderOptionsLayer {
        center_freq_hz: parse("DSD_NEO_CENTER_FREQ_HZ"),
        sample_rate_hz: parse("DSD_NEO_SAMPLE_RATE_HZ"),
        dsp_rate_hz: parse("DSD_NEO_DSP_RATE_HZ"),
        trunking_enable: parse_bool("DSD_NEO_TRUNKING"),
        tg_hold: parse("DSD_NEO_TG_HOLD"),
        hangtime_s: parse("DSD_NEO_HANGTIME_S"),
        lcw_retune: parse_bool("DSD_NEO_LCW_RETUNE"),
        p2_hardset: parse_bool("DSD_NEO_P2_HARDSET"),
        fll_kp: parse("DSD_NEO_FLL_KP"),
        fll_ki: parse("DSD_NEO_FLL_KI"),
        fm_agc_enable: parse_bool("DSD_NEO_FM_AGC"),
        ted_enable: parse_bool("DSD_NEO_TED_ENABLE"),
        grant_voice_to_s: parse("DSD_NEO_GRANT_VOICE_TO_S"),
        retune_backoff_s: parse("DSD_NEO_RETUNE_BACKOFF_S"),
        dmr_crc_relaxed: parse_bool("DSD_NEO_DMR_CRC_RELAXED"),
        aggressive_framesync: parse_bool("DSD_NEO_AGGRESSIVE_FRAMESYNC"),
        cache_dir: std::env::var("DSD_NEO_CACHE_DIR").ok(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_no_layers_yields_built_in_default() {
        let resolved = DecoderOptionsLayer::resolve(&[]);
        assert_eq!(resolved, DecoderOptions::default());
    }

    #[test]
    fn higher_precedence_layer_wins() {
        let file_layer = DecoderOptionsLayer {
            tg_hold: Some(100),
            hangtime_s: Some(2.0),
            ..Default::default()
        };
        let cli_layer = DecoderOptionsLayer {
            tg_hold: Some(200),
            ..Default::default()
        };
        let resolved = DecoderOptionsLayer::resolve(&[file_layer, cli_layer]);
        assert_eq!(resolved.trunking.tg_hold, 200);
        assert_eq!(resolved.trunking.hangtime_s, 2.0);
    }

    #[test]
    fn unset_fields_fall_through_to_default() {
        let layer = DecoderOptionsLayer {
            tg_hold: Some(42),
            ..Default::default()
        };
        let resolved = DecoderOptionsLayer::resolve(&[layer]);
        assert_eq!(resolved.trunking.tg_hold, 42);
        assert_eq!(resolved.dsp.fll_kp, DecoderOptions::default().dsp.fll_kp);
    }

    #[test]
    fn env_layer_only_sets_documented_vars() {
        std::env::remove_var("DSD_NEO_TG_HOLD_UNUSED_PROBE");
        let layer = layer_from_env();
        // Variables that were never set in the test process remain None.
        assert!(layer.allow_list_mode.is_none());
    }
}
