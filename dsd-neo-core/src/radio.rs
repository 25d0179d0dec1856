//! Wire clients for external radio control: rtl_tcp's fixed-size command
//! protocol and rigctl's line-oriented `F`/`f` commands. Both are used only
//! when the configured input source is a discrete tuner rather than a file
//! or pipe, and both share the reconnect-with-backoff shape described for
//! the capture front end's failure semantics.
//!
//! Neither implementation owns the retry loop itself — callers (the capture
//! thread) decide when to reconnect; `RadioControl::retune` returning
//! `DspError::SourceFailed` is the signal to do so.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::errors::{DspError, Result};

/// Default initial backoff for a reconnect watchdog, per the capture
/// front end's documented failure semantics.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(300);

/// Gain mode for an rtl_tcp-controlled tuner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainMode {
    Auto,
    Manual,
}

/// Abstraction over "a thing that can be retuned and whose gain/correction
/// can be adjusted", implemented by both wire clients below. The capture
/// front end drives whichever implementation matches `InputSource`.
/// `Send` so a `Box<dyn RadioControl>` can be handed to the capture thread.
pub trait RadioControl: Send {
    fn set_center_freq_hz(&mut self, freq_hz: u64) -> Result<()>;
    fn set_sample_rate_hz(&mut self, rate_hz: u32) -> Result<()>;
    fn set_gain_mode(&mut self, mode: GainMode) -> Result<()>;
    fn set_gain_tenth_db(&mut self, gain: i32) -> Result<()>;
    fn set_freq_correction_ppm(&mut self, ppm: i32) -> Result<()>;
}

/// rtl_tcp command bytes, matching the upstream rtl_tcp server's
/// `struct command { uint8_t cmd; uint32_t param; }` wire layout
/// (cmd byte followed by a 4-byte big-endian parameter).
mod rtl_tcp_cmd {
    pub const SET_FREQUENCY: u8 = 0x01;
    pub const SET_SAMPLE_RATE: u8 = 0x02;
    pub const SET_GAIN_MODE: u8 = 0x03;
    pub const SET_GAIN: u8 = 0x04;
    pub const SET_FREQ_CORRECTION: u8 = 0x05;
}

/// Thin TCP client speaking the rtl_tcp command protocol. Holds the open
/// socket and issues one five-byte command per call; does not attempt to
/// read rtl_tcp's IQ stream itself (that is the capture front end's job
/// once `InputSource::RtlSdr` is wired to a plain stream reader).
pub struct RtlTcpClient {
    stream: TcpStream,
}

impl RtlTcpClient {
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| DspError::SourceFailed {
            reason: format!("rtl_tcp connect to {addr} failed: {e}"),
        })?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }

    fn send_command(&mut self, cmd: u8, param: u32) -> Result<()> {
        let mut buf = [0u8; 5];
        buf[0] = cmd;
        buf[1..5].copy_from_slice(&param.to_be_bytes());
        self.stream.write_all(&buf).map_err(|e| DspError::SourceFailed {
            reason: format!("rtl_tcp command {cmd:#04x} write failed: {e}"),
        })?;
        Ok(())
    }
}

impl RadioControl for RtlTcpClient {
    fn set_center_freq_hz(&mut self, freq_hz: u64) -> Result<()> {
        self.send_command(rtl_tcp_cmd::SET_FREQUENCY, freq_hz as u32)
    }

    fn set_sample_rate_hz(&mut self, rate_hz: u32) -> Result<()> {
        self.send_command(rtl_tcp_cmd::SET_SAMPLE_RATE, rate_hz)
    }

    fn set_gain_mode(&mut self, mode: GainMode) -> Result<()> {
        let param = match mode {
            GainMode::Auto => 0,
            GainMode::Manual => 1,
        };
        self.send_command(rtl_tcp_cmd::SET_GAIN_MODE, param)
    }

    fn set_gain_tenth_db(&mut self, gain: i32) -> Result<()> {
        self.send_command(rtl_tcp_cmd::SET_GAIN, gain as u32)
    }

    fn set_freq_correction_ppm(&mut self, ppm: i32) -> Result<()> {
        self.send_command(rtl_tcp_cmd::SET_FREQ_CORRECTION, ppm as u32)
    }
}

/// Line-oriented TCP client for a rigctl-compatible endpoint, used when the
/// configured input source is a discrete radio rather than an RTL dongle.
/// Issues `F <hz>\n` to retune and `f\n` to read back the current
/// frequency; gain/correction/sample-rate concepts don't apply to a
/// discrete radio so those trait methods are no-ops.
pub struct RigctlClient {
    stream: TcpStream,
}

impl RigctlClient {
    pub fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|e| DspError::SourceFailed {
            reason: format!("rigctl connect to {addr} failed: {e}"),
        })?;
        stream.set_nodelay(true).ok();
        Ok(Self { stream })
    }

    fn send_line(&mut self, line: &str) -> Result<()> {
        self.stream.write_all(line.as_bytes()).map_err(|e| DspError::SourceFailed {
            reason: format!("rigctl write {line:?} failed: {e}"),
        })?;
        self.stream.write_all(b"\n").map_err(|e| DspError::SourceFailed {
            reason: format!("rigctl newline write failed: {e}"),
        })
    }

    /// Reads back the radio's reported center frequency via `f`.
    pub fn read_freq_hz(&mut self) -> Result<u64> {
        self.send_line("f")?;
        let mut buf = [0u8; 32];
        let n = self.stream.read(&mut buf).map_err(|e| DspError::SourceFailed {
            reason: format!("rigctl read reply failed: {e}"),
        })?;
        std::str::from_utf8(&buf[..n])
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| {
                DspError::SourceFailed { reason: "rigctl reply was not a parseable frequency".into() }.into()
            })
    }
}

impl RadioControl for RigctlClient {
    fn set_center_freq_hz(&mut self, freq_hz: u64) -> Result<()> {
        self.send_line(&format!("F {freq_hz}"))
    }

    fn set_sample_rate_hz(&mut self, _rate_hz: u32) -> Result<()> {
        Ok(())
    }

    fn set_gain_mode(&mut self, _mode: GainMode) -> Result<()> {
        Ok(())
    }

    fn set_gain_tenth_db(&mut self, _gain: i32) -> Result<()> {
        Ok(())
    }

    fn set_freq_correction_ppm(&mut self, _ppm: i32) -> Result<()> {
        Ok(())
    }
}

/// Doubles `current` up to `cap`, the reconnect watchdog's backoff step.
pub fn next_backoff(current: Duration, cap: Duration) -> Duration {
    let doubled = current.saturating_mul(2);
    if doubled > cap {
        cap
    } else {
        doubled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn rtl_tcp_client_sends_five_byte_command() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            sock.read_exact(&mut buf).unwrap();
            buf
        });
        let mut client = RtlTcpClient::connect(&addr.to_string()).unwrap();
        client.set_center_freq_hz(851_012_500).unwrap();
        let received = handle.join().unwrap();
        assert_eq!(received[0], rtl_tcp_cmd::SET_FREQUENCY);
        assert_eq!(u32::from_be_bytes(received[1..5].try_into().unwrap()), 851_012_500);
    }

    #[test]
    fn rigctl_client_issues_set_frequency_line() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(sock);
            let mut line = String::new();
            std::io::BufRead::read_line(&mut reader, &mut line).unwrap();
            line
        });
        let mut client = RigctlClient::connect(&addr.to_string()).unwrap();
        client.set_center_freq_hz(462_562_500).unwrap();
        let line = handle.join().unwrap();
        assert_eq!(line.trim_end(), "F 462562500");
    }

    #[test]
    fn connect_failure_surfaces_as_source_failed() {
        // Port 0 refuses connections synchronously on most platforms since
        // nothing is ever bound to it as a destination address.
        let result = RtlTcpClient::connect("127.0.0.1:1");
        assert!(result.is_err());
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let cap = Duration::from_secs(5);
        let mut cur = DEFAULT_RECONNECT_BACKOFF;
        cur = next_backoff(cur, cap);
        assert_eq!(cur, Duration::from_millis(600));
        for _ in 0..10 {
            cur = next_backoff(cur, cap);
        }
        assert_eq!(cur, cap);
    }
}
