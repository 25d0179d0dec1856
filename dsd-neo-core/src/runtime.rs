//! Thread orchestration: capture, DSP, decoder, and TSM-watchdog threads
//! wired together over the SPSC rings and command channels this crate
//! otherwise only exposes as building blocks.
//!
//! Four roles run concurrently. Capture reads raw samples (or, for
//! [`crate::config::InputSource::SymbolCaptureFile`], pre-sliced symbols
//! directly) into a ring. DSP drains the IQ ring through [`FrontEnd`] into a
//! symbol ring. Decoder drains the symbol ring into the buffered state and
//! applies UI commands at the batch boundary. A watchdog ticks the TSM at
//! ~1Hz so hangtime/grant-timeout transitions fire even when no traffic is
//! arriving, and drives HUNTING by pulling the next CC candidate out of the
//! channel plan's ring.
//!
//! [`DecoderState`] lives behind one `Mutex`: the decoder thread holds it for
//! the length of one symbol batch, and the watchdog takes it with
//! `try_lock`, skipping its tick rather than blocking if the decoder thread
//! is mid-batch — the re-entrant guard that keeps the two tick sources from
//! ever overlapping. A shared atomic exit flag, polled between ring reads
//! bounded by [`RING_READ_TIMEOUT`], unwinds every thread promptly.
//!
//! Locating sync patterns and assembling protocol frames from the raw dibit
//! stream belongs to [`crate::protocol`]; this module only keeps the shared
//! buffers fed and the retune/command plumbing running between the pieces
//! that already exist.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use num_complex::Complex64;

use crate::command::{self, CommandReceiver, CommandSender, RetuneReceiver, RetuneSender, UiCommand};
use crate::config::{DecoderOptions, InputSource, RelaxedAcceptance};
use crate::errors::{DspError, Result};
use crate::io::{
    NullSource, RtlSdrIqSource, SampleSource, SymbolCaptureSource, TcpPcm16LeSource, UdpPcm16LeSource, WavIqSource,
};
use crate::protocol::common::SmEvent;
use crate::protocol::router::FrameRouter;
use crate::radio::{next_backoff, RadioControl, DEFAULT_RECONNECT_BACKOFF};
use crate::rings::spsc::{self, Consumer, Producer};
use crate::signal_processing::front_end::{ClockAssist, Discriminator, FrontEnd};
use crate::state::DecoderState;
use crate::tsm::{PolicyGates, RetuneCommand, State};

/// A sliced dibit with its reliability: the unit the DSP thread hands the
/// decoder thread.
pub type Symbol = (u8, u8);

const IQ_RING_CAPACITY: usize = 1 << 16;
const SYMBOL_RING_CAPACITY: usize = 1 << 14;
const IQ_BLOCK_LEN: usize = 4096;
const SYMBOL_BLOCK_LEN: usize = 288;
const RING_READ_TIMEOUT: Duration = Duration::from_millis(200);
const WATCHDOG_TICK: Duration = Duration::from_secs(1);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// P25/DMR common symbol rate; every digital protocol this crate decodes
/// runs its TDMA/FDMA signaling at 4800 symbols/second.
const SYMBOL_RATE_HZ: u32 = 4800;

fn samples_per_symbol_for(dsp_rate_hz: u32) -> u32 {
    (dsp_rate_hz / SYMBOL_RATE_HZ).clamp(2, 64)
}

/// Picks the discriminator family for the configured protocol mix. Every
/// digital protocol this crate decodes shares the C4FM 4-level slicer;
/// CQPSK is reserved for callers on a known simulcast-hardened P25 Phase 2
/// system and isn't auto-selected from [`DecoderOptions`] alone.
fn discriminator_for(options: &DecoderOptions) -> Discriminator {
    if options.protocols.p25_phase1 || options.protocols.p25_phase2 || options.protocols.dmr {
        Discriminator::C4fm
    } else {
        Discriminator::Fm
    }
}

fn retune_freq(cmd: RetuneCommand) -> u64 {
    match cmd {
        RetuneCommand::ToVoice { freq_hz, .. } => freq_hz,
        RetuneCommand::ToControl { freq_hz } => freq_hz,
    }
}

/// Builds the configured [`SampleSource`] for every [`InputSource`] variant
/// except [`InputSource::SymbolCaptureFile`], which bypasses the DSP stage
/// entirely (see [`Runtime::spawn`]). `input_path` doubles as a `host:port`
/// address for the network sources.
fn build_source(options: &DecoderOptions) -> Result<Box<dyn SampleSource>> {
    let need_path = |what: &str| {
        options
            .input_path
            .clone()
            .ok_or_else(|| DspError::SourceFailed { reason: format!("{what} input requires input_path") }.into())
    };
    match options.input_source {
        InputSource::WavFile => Ok(Box::new(WavIqSource::open(need_path("wav_file")?)?)),
        InputSource::RtlSdr => Ok(Box::new(RtlSdrIqSource::connect(&need_path("rtl_sdr")?, options.sample_rate_hz)?)),
        InputSource::TcpPcm16Le => {
            Ok(Box::new(TcpPcm16LeSource::connect(&need_path("tcp_pcm16le")?, options.sample_rate_hz)?))
        }
        InputSource::UdpPcm16Le => {
            Ok(Box::new(UdpPcm16LeSource::bind(&need_path("udp_pcm16le")?, options.sample_rate_hz)?))
        }
        InputSource::SymbolCaptureFile => Ok(Box::new(NullSource)),
        InputSource::Null | InputSource::PulseAudio | InputSource::Stdin => Ok(Box::new(NullSource)),
    }
}

/// Handle to a running decoder: owns the worker threads and the shared,
/// mutex-guarded state they publish into. Dropping a `Runtime` does not stop
/// the threads — call [`Runtime::shutdown`] explicitly so callers can choose
/// when to join.
pub struct Runtime {
    exit: Arc<AtomicBool>,
    state: Arc<Mutex<DecoderState>>,
    ui_tx: CommandSender<UiCommand>,
    capture: JoinHandle<()>,
    dsp: Option<JoinHandle<()>>,
    decoder: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl Runtime {
    /// Spawns the capture, (optional) DSP, decoder, and watchdog threads for
    /// `options`, wired to the TSM already primed by [`DecoderState::from_options`].
    /// `radio` is an already-connected radio control client (or `None` for
    /// sources that can't be retuned), built by the driver ahead of time
    /// since establishing it may need CLI-only addressing this crate doesn't
    /// carry in [`DecoderOptions`].
    pub fn spawn(options: DecoderOptions, radio: Option<Box<dyn RadioControl>>) -> Result<Self> {
        let exit = Arc::new(AtomicBool::new(false));
        let mut state = DecoderState::from_options(&options);
        let gates = DecoderState::policy_gates(&options);
        if options.trunking.enable {
            state.tsm.enter_on_cc(options.center_freq_hz);
        }
        let state = Arc::new(Mutex::new(state));

        let (ui_tx, ui_rx) = command::channel::<UiCommand>(16);
        let (retune_tx, retune_rx) = command::channel::<RetuneCommand>(8);
        let started = Instant::now();

        let (decoder, dsp, capture) = if matches!(options.input_source, InputSource::SymbolCaptureFile) {
            let (sym_tx, sym_rx) = spsc::channel::<Symbol>(SYMBOL_RING_CAPACITY);
            let path = options
                .input_path
                .clone()
                .ok_or_else(|| DspError::SourceFailed { reason: "symbol_capture_file input requires input_path".into() })?;
            let exit_c = exit.clone();
            let capture = thread::spawn(move || run_symbol_capture_stage(path, SYMBOL_RATE_HZ, sym_tx, exit_c));
            let decoder = spawn_decoder_thread(
                sym_rx,
                ui_rx,
                state.clone(),
                gates,
                options.relaxed,
                retune_tx.clone(),
                started,
                exit.clone(),
            );
            (decoder, None, capture)
        } else {
            let (iq_tx, iq_rx) = spsc::channel::<Complex64>(IQ_RING_CAPACITY);
            let (sym_tx, sym_rx) = spsc::channel::<Symbol>(SYMBOL_RING_CAPACITY);

            let source = build_source(&options).unwrap_or_else(|_| Box::new(NullSource));
            let opts_c = options.clone();
            let retune_rx_capture = retune_rx.clone();
            let exit_c = exit.clone();
            let capture =
                thread::spawn(move || run_capture_thread(opts_c, source, iq_tx, retune_rx_capture, radio, exit_c));

            let sps = samples_per_symbol_for(options.dsp_rate_hz);
            let front_end = FrontEnd::new(
                options.sample_rate_hz,
                options.dsp_rate_hz,
                sps,
                discriminator_for(&options),
                options.dsp.fll_kp,
                options.dsp.fll_ki,
                options.dsp.fll_enable,
                options.dsp.ted_enable,
                ClockAssist::new(options.dsp.c4fm_clock_assist, options.dsp.c4fm_assist_after_lock),
                options.dsp.fm_agc_enable,
                options.dsp.enable_filters,
            )?;
            let retune_rx_dsp = retune_rx.clone();
            let retune_drain_ms = options.dsp.retune_drain_ms;
            let exit_c2 = exit.clone();
            let dsp = thread::spawn(move || {
                run_dsp_thread(front_end, iq_rx, sym_tx, retune_rx_dsp, retune_drain_ms, exit_c2)
            });

            let decoder = spawn_decoder_thread(
                sym_rx,
                ui_rx,
                state.clone(),
                gates,
                options.relaxed,
                retune_tx.clone(),
                started,
                exit.clone(),
            );
            (decoder, Some(dsp), capture)
        };

        let watchdog = {
            let state_w = state.clone();
            let exit_w = exit.clone();
            thread::spawn(move || run_watchdog_thread(state_w, gates, retune_tx, started, exit_w))
        };

        Ok(Self { exit, state, ui_tx, capture, dsp, decoder, watchdog })
    }

    /// A clone of the shared state handle, for a UI or operator console to
    /// lock and snapshot between paints.
    pub fn state(&self) -> Arc<Mutex<DecoderState>> {
        self.state.clone()
    }

    /// The command sender a UI issues [`UiCommand`]s through; cloneable so
    /// multiple UI surfaces can hold one each.
    pub fn ui_commands(&self) -> CommandSender<UiCommand> {
        self.ui_tx.clone()
    }

    /// Signals every worker thread to stop at its next poll and joins all of
    /// them. Safe to call even if a thread has already exited on its own
    /// (e.g. a file source ran out of data).
    pub fn shutdown(self) {
        self.exit.store(true, Ordering::Relaxed);
        self.capture.join().ok();
        if let Some(dsp) = self.dsp {
            dsp.join().ok();
        }
        self.decoder.join().ok();
        self.watchdog.join().ok();
    }
}

fn spawn_decoder_thread(
    sym_rx: Consumer<Symbol>,
    ui_rx: CommandReceiver<UiCommand>,
    state: Arc<Mutex<DecoderState>>,
    gates: PolicyGates,
    relaxed: RelaxedAcceptance,
    retune_tx: RetuneSender,
    started: Instant,
    exit: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::spawn(move || run_decoder_thread(sym_rx, ui_rx, state, gates, relaxed, retune_tx, started, exit))
}

/// Reconnect-with-backoff capture loop: reads blocks from `source` into the
/// IQ ring, falling back to [`NullSource`] and doubling `backoff` (capped at
/// [`MAX_RECONNECT_BACKOFF`]) on read failure, and forwarding retune
/// commands to the radio control client when one is present.
fn run_capture_thread(
    options: DecoderOptions,
    mut source: Box<dyn SampleSource>,
    iq_tx: Producer<Complex64>,
    retune_rx: RetuneReceiver,
    mut radio: Option<Box<dyn RadioControl>>,
    exit: Arc<AtomicBool>,
) {
    let mut backoff = DEFAULT_RECONNECT_BACKOFF;
    let mut block = vec![Complex64::new(0.0, 0.0); IQ_BLOCK_LEN];

    while !exit.load(Ordering::Relaxed) {
        for cmd in retune_rx.drain() {
            if let Some(client) = radio.as_mut() {
                client.set_center_freq_hz(retune_freq(cmd)).ok();
            }
        }

        match source.read_block(&mut block) {
            Ok(0) => thread::sleep(Duration::from_millis(10)),
            Ok(n) => {
                iq_tx.write(block[..n].iter().copied());
                backoff = DEFAULT_RECONNECT_BACKOFF;
            }
            Err(_) => {
                thread::sleep(backoff);
                backoff = next_backoff(backoff, MAX_RECONNECT_BACKOFF);
                source = build_source(&options).unwrap_or_else(|_| Box::new(NullSource));
            }
        }
    }
}

/// Replays a symbol-capture file directly into the symbol ring, standing in
/// for both the capture and DSP stages when
/// [`InputSource::SymbolCaptureFile`] is selected.
fn run_symbol_capture_stage(path: String, symbol_rate_hz: u32, sym_tx: Producer<Symbol>, exit: Arc<AtomicBool>) {
    let mut source = match SymbolCaptureSource::open(&path, symbol_rate_hz) {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut block = [(0u8, 0u8); 256];
    while !exit.load(Ordering::Relaxed) && !source.is_exhausted() {
        let n = source.read_symbols(&mut block);
        if n > 0 {
            sym_tx.write(block[..n].iter().copied());
        } else {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

/// Drains the IQ ring through [`FrontEnd`] into the symbol ring, retuning
/// the front end (resetting its carrier/timing loops) on every retune
/// command and discarding whatever arrives on the ring for the next
/// `retune_drain_ms` — in-flight I/Q captured against the old center
/// frequency, which would otherwise desync the newly-reset carrier/timing
/// loops.
fn run_dsp_thread(
    mut front_end: FrontEnd,
    iq_rx: Consumer<Complex64>,
    sym_tx: Producer<Symbol>,
    retune_rx: RetuneReceiver,
    retune_drain_ms: u64,
    exit: Arc<AtomicBool>,
) {
    let mut symbols = [(0u8, 0u8); IQ_BLOCK_LEN];
    let mut draining_until: Option<Instant> = None;
    while !exit.load(Ordering::Relaxed) {
        for cmd in retune_rx.drain() {
            front_end.retune(retune_freq(cmd));
            draining_until = Some(Instant::now() + Duration::from_millis(retune_drain_ms));
        }

        let block = iq_rx.read(IQ_BLOCK_LEN, RING_READ_TIMEOUT);
        if block.is_empty() {
            continue;
        }

        if let Some(until) = draining_until {
            if Instant::now() < until {
                continue;
            }
            draining_until = None;
        }

        let (n, _sps) = front_end.read_symbols(&block, &mut symbols, symbols.len());
        if n > 0 {
            sym_tx.write(symbols[..n].iter().copied());
        }
    }
}

/// Drains decoded dibits into the buffered symbol state, runs them through
/// the [`FrameRouter`], and applies UI commands at the safe point between
/// batches. The router has no standalone frame-sync layer to lean on (see
/// its module docs); this loop just keeps it fed and the control-plane
/// commands flowing.
fn run_decoder_thread(
    sym_rx: Consumer<Symbol>,
    ui_rx: CommandReceiver<UiCommand>,
    state: Arc<Mutex<DecoderState>>,
    gates: PolicyGates,
    relaxed: RelaxedAcceptance,
    mut retune_tx: RetuneSender,
    started: Instant,
    exit: Arc<AtomicBool>,
) {
    // Consulted by the P25 Phase 1 LCW grant path before a TDULC grant is
    // allowed to retune; toggled live via `SetLcwRetune`.
    let mut lcw_retune = true;
    let mut router = FrameRouter::new();

    while !exit.load(Ordering::Relaxed) {
        for cmd in ui_rx.drain() {
            match cmd {
                UiCommand::SetTgHold(tg) => {
                    if let Ok(mut guard) = state.lock() {
                        guard.tsm.set_tg_hold(tg);
                    }
                }
                UiCommand::SetLcwRetune(enabled) => lcw_retune = enabled,
                UiCommand::ForceRelease => {
                    if let Ok(mut guard) = state.lock() {
                        let now = started.elapsed();
                        if let Some(cmd) = guard.tsm.handle_event(SmEvent::Release { slot: -1 }, now, &gates) {
                            retune_tx.send(cmd);
                        }
                    }
                }
                UiCommand::Shutdown => exit.store(true, Ordering::Relaxed),
            }
        }
        let batch = sym_rx.read(SYMBOL_BLOCK_LEN, RING_READ_TIMEOUT);
        if batch.is_empty() {
            continue;
        }
        if let Ok(mut guard) = state.lock() {
            let now = started.elapsed();
            for (dibit, reliability) in batch {
                guard.symbols.push(dibit, reliability);
                if let Some(cmd) = router.feed(dibit, reliability, &mut *guard, &relaxed, lcw_retune, now, &gates) {
                    retune_tx.send(cmd);
                }
            }
        }
    }
}

/// Ticks the TSM at roughly [`WATCHDOG_TICK`] and, while HUNTING, advances
/// through the channel plan's CC-candidate ring. Uses `try_lock` so a
/// decoder thread mid-batch simply causes this round's tick to be skipped
/// rather than blocking — the re-entrant guard against overlapping ticks.
fn run_watchdog_thread(
    state: Arc<Mutex<DecoderState>>,
    gates: PolicyGates,
    mut retune_tx: RetuneSender,
    started: Instant,
    exit: Arc<AtomicBool>,
) {
    while !exit.load(Ordering::Relaxed) {
        thread::sleep(WATCHDOG_TICK);
        let Ok(mut guard) = state.try_lock() else { continue };
        let now = started.elapsed();
        if let Some(cmd) = guard.tsm.handle_event(SmEvent::Tick, now, &gates) {
            retune_tx.send(cmd);
        }
        if guard.tsm.state() == State::Hunting {
            if let Some(freq) = guard.channel_plan.candidates.pop_next() {
                guard.tsm.enter_on_cc(freq);
                retune_tx.send(RetuneCommand::ToControl { freq_hz: freq });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderOptionsLayer;

    fn test_options(input: InputSource, path: Option<&str>) -> DecoderOptions {
        let mut opts = DecoderOptionsLayer::resolve(&[]);
        opts.input_source = input;
        opts.input_path = path.map(|p| p.to_string());
        opts.dsp_rate_hz = 48_000;
        opts.sample_rate_hz = 48_000;
        opts
    }

    #[test]
    fn samples_per_symbol_matches_4800_baud_at_48khz() {
        assert_eq!(samples_per_symbol_for(48_000), 10);
    }

    #[test]
    fn samples_per_symbol_is_clamped() {
        assert_eq!(samples_per_symbol_for(1_000), 2);
    }

    #[test]
    fn null_input_runs_and_shuts_down_cleanly() {
        let options = test_options(InputSource::Null, None);
        let runtime = Runtime::spawn(options, None).unwrap();
        thread::sleep(Duration::from_millis(50));
        let snapshot = runtime.state();
        assert!(snapshot.lock().unwrap().symbols.len() <= 4800);
        runtime.shutdown();
    }

    #[test]
    fn ui_commands_reach_the_decoder_thread() {
        let options = test_options(InputSource::Null, None);
        let runtime = Runtime::spawn(options, None).unwrap();
        let mut ui = runtime.ui_commands();
        assert!(ui.send(UiCommand::SetTgHold(4321)));
        thread::sleep(Duration::from_millis(50));
        {
            let state = runtime.state();
            let guard = state.lock().unwrap();
            let _ = guard; // tg_hold is private to Tsm; presence of the lock not poisoning is the assertion here.
        }
        runtime.shutdown();
    }

    #[test]
    fn symbol_capture_input_feeds_the_symbol_buffer() {
        let path = std::env::temp_dir().join(format!("dsd-neo-core-runtime-test-{}.bin", std::process::id()));
        std::fs::write(&path, [0u8, 1, 2, 3, 0, 1, 2, 3]).unwrap();
        let options = test_options(InputSource::SymbolCaptureFile, Some(path.to_str().unwrap()));
        let runtime = Runtime::spawn(options, None).unwrap();
        thread::sleep(Duration::from_millis(100));
        {
            let state = runtime.state();
            let guard = state.lock().unwrap();
            assert!(guard.symbols.len() > 0);
        }
        runtime.shutdown();
        std::fs::remove_file(&path).ok();
    }
}
