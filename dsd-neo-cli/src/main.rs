mod config;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Context, Result};

use config::FileConfig;
use dsd_neo_core::config::{DecoderOptions, DecoderOptionsLayer, InputSource};
use dsd_neo_core::logging::{LogEvent, StatisticsEvent, StructuredEventLogger};
use dsd_neo_core::radio::{GainMode, RadioControl, RigctlClient, RtlTcpClient};
use dsd_neo_core::resolver::{cc_cache_path, load_cc_cache, save_cc_cache};
use dsd_neo_core::runtime::Runtime;

/// Typed driver for the dsd-neo decoder core: resolves CLI > env > config
/// file > built-in-default options, wires up a radio control client if the
/// configured input source needs one, and reports startup/shutdown
/// telemetry through the core's structured event logger.
#[derive(Parser, Debug)]
#[command(author, version, about = "Digital land-mobile-radio decoder driver", long_about = None)]
struct Cli {
    /// Path to a TOML config file (supports an `include` chain).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug-level) structured logging.
    #[arg(short, long)]
    verbose: bool,

    /// Center frequency in Hz (overrides config/env).
    #[arg(short = 'f', long)]
    freq: Option<u64>,

    /// Input sample rate in Hz.
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Trunking talkgroup hold value (0 disables hold).
    #[arg(long)]
    tg_hold: Option<u32>,

    /// Disable LCW-driven (TDULC format 0x44) retunes.
    #[arg(long)]
    no_lcw_retune: bool,

    /// rtl_tcp server address (host:port) to control when the input source is RTL-SDR.
    #[arg(long)]
    rtl_tcp_addr: Option<String>,

    /// rigctl server address (host:port) to control when the input source is a discrete radio.
    #[arg(long)]
    rigctl_addr: Option<String>,

    /// Cache directory override for the CC-candidate cache.
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Run for a fixed duration in seconds instead of until Ctrl-C.
    #[arg(long)]
    duration_secs: Option<u64>,
}

impl Cli {
    fn as_layer(&self) -> DecoderOptionsLayer {
        DecoderOptionsLayer {
            center_freq_hz: self.freq,
            sample_rate_hz: self.sample_rate,
            tg_hold: self.tg_hold,
            lcw_retune: if self.no_lcw_retune { Some(false) } else { None },
            cache_dir: self.cache_dir.as_ref().map(|p| p.display().to_string()),
            ..Default::default()
        }
    }
}

/// Issues the initial retune/sample-rate/gain-mode commands against whichever
/// radio control client matches the resolved input source, per the retry/backoff
/// shape documented for the capture front end's failure semantics.
fn connect_radio(options: &DecoderOptions, cli: &Cli) -> Result<Option<Box<dyn RadioControl>>> {
    match options.input_source {
        InputSource::RtlSdr => {
            let Some(addr) = &cli.rtl_tcp_addr else { return Ok(None) };
            let mut client = RtlTcpClient::connect(addr).wrap_err("connecting to rtl_tcp")?;
            client.set_sample_rate_hz(options.sample_rate_hz)?;
            client.set_center_freq_hz(options.center_freq_hz)?;
            client.set_gain_mode(GainMode::Auto)?;
            Ok(Some(Box::new(client)))
        }
        _ => {
            let Some(addr) = &cli.rigctl_addr else { return Ok(None) };
            let mut client = RigctlClient::connect(addr).wrap_err("connecting to rigctl")?;
            client.set_center_freq_hz(options.center_freq_hz)?;
            Ok(Some(Box::new(client)))
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let file_config = match &args.config {
        Some(path) => FileConfig::from_file(path).wrap_err_with(|| format!("loading config from {}", path.display()))?,
        None => FileConfig::default(),
    };

    let env_layer = dsd_neo_core::config::layer_from_env();
    let cli_layer = args.as_layer();
    let options = DecoderOptionsLayer::resolve(&[file_config.options.clone(), env_layer, cli_layer]);

    let mut event_logger_config = file_config.logging.to_core_event_logger_config();
    if args.verbose {
        event_logger_config.level = dsd_neo_core::logging::LogLevel::Debug;
    }
    let mut logger = StructuredEventLogger::new(event_logger_config)?;

    logger.log(LogEvent::Info {
        message: format!(
            "dsd-neo starting: input={:?} center_freq_hz={} sample_rate_hz={} trunking={}",
            options.input_source, options.center_freq_hz, options.sample_rate_hz, options.trunking.enable
        ),
    })?;

    let radio = match connect_radio(&options, &args) {
        Ok(client) => {
            if client.is_some() {
                logger.log(LogEvent::Info { message: "radio control client connected".into() })?;
            }
            client
        }
        Err(e) => {
            logger.log(LogEvent::Error { message: format!("radio control connect failed: {e}") })?;
            None
        }
    };

    let cache_dir = options.cache_dir.clone();
    let runtime = Runtime::spawn(options, radio).wrap_err("starting decoder runtime")?;

    // Audio backends and vocoder bitstream decode are opaque collaborators
    // invoked by the running capture/decode loop, not this driver; this loop
    // just keeps the process alive while the capture/DSP/decoder/watchdog
    // threads run and periodically reports the TSM's tune/release counters.
    let stop = Arc::new(AtomicBool::new(false));
    let stop_handler = stop.clone();
    ctrlc::set_handler(move || stop_handler.store(true, Ordering::Relaxed)).wrap_err("installing Ctrl-C handler")?;

    // Set once system identity (WACN/SYSID) is first known, so the
    // per-site cache file path can be resolved and the learned CC
    // candidates from a prior run folded in.
    let mut cache_path: Option<PathBuf> = None;

    let deadline = args.duration_secs.map(|secs| std::time::Instant::now() + Duration::from_secs(secs));
    while !stop.load(Ordering::Relaxed) {
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                break;
            }
        }
        std::thread::sleep(Duration::from_secs(5));
        let mut guard = runtime.state().lock().expect("decoder state mutex poisoned");
        logger.log(LogEvent::Statistics(StatisticsEvent {
            timestamp: chrono::Utc::now(),
            duration_secs: logger.elapsed(),
            tune_count: guard.tsm.tune_count,
            release_count: guard.tsm.release_count,
            cc_return_count: guard.tsm.cc_return_count,
        }))?;
        if let Some(cache_dir) = &cache_dir {
            if cache_path.is_none() && guard.identity.wacn != 0 {
                let path = cc_cache_path(Path::new(cache_dir), guard.identity.as_context(), true);
                match load_cc_cache(&path) {
                    Ok(freqs) => {
                        guard.channel_plan.candidates.load_from(freqs.iter().copied());
                        logger.log(LogEvent::Info {
                            message: format!("loaded {} cc-candidate entries from {}", freqs.len(), path.display()),
                        })?;
                    }
                    Err(e) => {
                        logger.log(LogEvent::Error { message: format!("cc-cache load failed: {e}") })?;
                    }
                }
                cache_path = Some(path);
            }
            if let Some(path) = &cache_path {
                let snapshot = guard.cc_cache_snapshot();
                match save_cc_cache(path, &snapshot) {
                    Ok(()) => {
                        logger.log(LogEvent::Info {
                            message: format!("persisted {} cc-candidate entries to {}", snapshot.len(), path.display()),
                        })?;
                    }
                    Err(e) => {
                        logger.log(LogEvent::Error { message: format!("cc-cache save failed: {e}") })?;
                    }
                }
            }
        }
    }

    logger.log(LogEvent::Info { message: "dsd-neo shutting down".into() })?;
    runtime.shutdown();
    Ok(())
}
