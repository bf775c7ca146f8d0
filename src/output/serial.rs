use anyhow::{anyhow, Context, Result};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 9600;
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Serial line settings. Framing is always 8 data bits, no parity, one stop
/// bit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM6`.
    pub device: String,
    pub baud_rate: u32,
    pub write_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Opens a byte sink for one message. Dropping the sink closes the link.
pub trait SerialConnector: Send {
    fn open(&mut self) -> Result<Box<dyn Write + Send>>;

    /// Human readable target for logs.
    fn describe(&self) -> String;
}

/// Real serial port via the `serialport` crate.
#[derive(Clone, Debug)]
pub struct SerialPortConnector {
    settings: SerialSettings,
}

impl SerialPortConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl SerialConnector for SerialPortConnector {
    fn open(&mut self) -> Result<Box<dyn Write + Send>> {
        let port = serialport::new(&self.settings.device, self.settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.settings.write_timeout)
            .open()
            .with_context(|| format!("failed to open serial device {}", self.settings.device))?;
        Ok(Box::new(PortWriter { port }))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.settings.device, self.settings.baud_rate)
    }
}

struct PortWriter {
    port: Box<dyn serialport::SerialPort>,
}

impl Write for PortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

/// In-memory connector. Each opened link becomes one recorded message once
/// it is closed.
#[derive(Clone, Debug, Default)]
pub struct MemoryConnector {
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
    write_calls: Arc<Mutex<Vec<usize>>>,
    fail_open: bool,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector whose every `open` fails, for fault-path tests.
    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Completed messages, oldest first.
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Length of every `write` call seen so far.
    pub fn write_sizes(&self) -> Vec<usize> {
        self.write_calls
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl SerialConnector for MemoryConnector {
    fn open(&mut self) -> Result<Box<dyn Write + Send>> {
        if self.fail_open {
            return Err(anyhow!("failed to open serial device memory: link unavailable"));
        }
        Ok(Box::new(MemoryLink {
            buf: Vec::new(),
            messages: self.messages.clone(),
            write_calls: self.write_calls.clone(),
        }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryLink {
    buf: Vec<u8>,
    messages: Arc<Mutex<Vec<Vec<u8>>>>,
    write_calls: Arc<Mutex<Vec<usize>>>,
}

impl Write for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut calls) = self.write_calls.lock() {
            calls.push(buf.len());
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(std::mem::take(&mut self.buf));
        }
    }
}
