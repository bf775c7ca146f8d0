//! Network start gate.
//!
//! Frame processing stays off until a controller on the local network says
//! it is ready. The gate connects over TCP, sends one request line and waits
//! for any response line containing `OK`. Faults abandon the current
//! connection and the next attempt starts; after `max_attempts` failures the
//! gate gives up and detection stays off for the session.

use anyhow::{anyhow, Context, Result};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Request sent on every connection.
pub const REQUEST_LINE: &str = "GET /R\r\n";

/// Substring that marks the ready response.
pub const READY_TOKEN: &str = "OK";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

pub const DEFAULT_GATE_ADDR: &str = "169.254.0.100:80";

/// Shared "detection may start" flag. Goes from closed to open at most once.
#[derive(Clone, Debug, Default)]
pub struct StartFlag {
    open: Arc<AtomicBool>,
}

impl StartFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Open the flag. Returns false if it was already open.
    pub fn open(&self) -> bool {
        !self.open.swap(true, Ordering::SeqCst)
    }
}

/// Produces one stream per gate attempt.
pub trait GateConnector: Send {
    type Stream: Read + Write;

    fn connect(&mut self) -> io::Result<Self::Stream>;

    /// Human readable target for logs.
    fn describe(&self) -> String;
}

/// TCP connector for the real controller.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    addr: SocketAddr,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    pub fn parse(addr: &str, timeout: Duration) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid gate address '{}'", addr))?;
        Ok(Self::new(addr, timeout))
    }
}

impl GateConnector for TcpConnector {
    type Stream = TcpStream;

    /// Reads and writes on the stream time out after the connect timeout.
    fn connect(&mut self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        self.addr.to_string()
    }
}

/// Result of a gate run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// Ready signal seen on attempt `attempt` after `lines_read` lines.
    Opened { attempt: u32, lines_read: usize },
    /// Every attempt failed; the flag stays closed.
    Exhausted { attempts: u32 },
}

pub struct StartGate<C: GateConnector> {
    connector: C,
    flag: StartFlag,
    max_attempts: u32,
}

impl<C: GateConnector> StartGate<C> {
    pub fn new(connector: C, flag: StartFlag) -> Self {
        Self {
            connector,
            flag,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn flag(&self) -> &StartFlag {
        &self.flag
    }

    /// Run the handshake to completion. Never fails; faults are logged.
    pub fn run(&mut self) -> GateOutcome {
        let target = self.connector.describe();
        for attempt in 1..=self.max_attempts {
            match self.attempt() {
                Ok(lines_read) => {
                    self.flag.open();
                    log::info!(
                        "start gate open: ready from {} on attempt {} after {} line(s)",
                        target,
                        attempt,
                        lines_read
                    );
                    return GateOutcome::Opened {
                        attempt,
                        lines_read,
                    };
                }
                Err(e) => {
                    log::warn!(
                        "start gate attempt {}/{} to {} failed: {:#}",
                        attempt,
                        self.max_attempts,
                        target,
                        e
                    );
                }
            }
        }
        log::warn!(
            "start gate gave up after {} attempts; detection stays disabled",
            self.max_attempts
        );
        GateOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }

    /// One connection. Returns the number of lines read up to and including
    /// the ready line. The stream is closed when this returns.
    fn attempt(&mut self) -> Result<usize> {
        let mut stream = self.connector.connect().context("connect")?;
        stream
            .write_all(REQUEST_LINE.as_bytes())
            .context("send request")?;
        stream.flush().context("send request")?;

        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut lines_read = 0;
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .context("read response")?;
            if n == 0 {
                return Err(anyhow!("connection closed before ready signal"));
            }
            lines_read += 1;
            // Non-UTF-8 lines are discarded like any other non-matching line.
            let line = String::from_utf8_lossy(&buf);
            if line.contains(READY_TOKEN) {
                return Ok(lines_read);
            }
            log::debug!("start gate ignoring line: {}", line.trim_end());
        }
    }
}

impl<C: GateConnector + 'static> StartGate<C> {
    /// Run the gate on its own thread.
    pub fn spawn(mut self) -> Result<JoinHandle<GateOutcome>> {
        std::thread::Builder::new()
            .name("start-gate".to_string())
            .spawn(move || self.run())
            .context("failed to spawn start gate thread")
    }
}
