use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::serial::SerialConnector;
use crate::glyph::{Glyph, GRID_SIZE};

/// Bytes written ahead of every row.
pub const FRAME_PREAMBLE: [u8; 2] = [0, 0];

/// Bytes per glyph message.
pub const MESSAGE_LEN: usize = GRID_SIZE * (FRAME_PREAMBLE.len() + GRID_SIZE);

/// Lay out a glyph in wire order.
pub fn encode_glyph(glyph: &Glyph) -> [u8; MESSAGE_LEN] {
    let mut out = [0u8; MESSAGE_LEN];
    let mut pos = 0;
    for row in (0..GRID_SIZE).rev() {
        for byte in FRAME_PREAMBLE {
            out[pos] = byte;
            pos += 1;
        }
        for cell in glyph.row(row) {
            out[pos] = *cell;
            pos += 1;
        }
    }
    out
}

/// Synchronous glyph sender. Blocks for the whole message.
pub struct OutputChannel<C: SerialConnector> {
    connector: C,
    sent: u64,
}

impl<C: SerialConnector> OutputChannel<C> {
    pub fn new(connector: C) -> Self {
        Self { connector, sent: 0 }
    }

    /// Open the link, write the message one byte at a time, close the link.
    pub fn send(&mut self, glyph: &Glyph) -> Result<()> {
        let target = self.connector.describe();
        let mut link = self.connector.open()?;
        for (i, byte) in encode_glyph(glyph).iter().enumerate() {
            link.write_all(std::slice::from_ref(byte))
                .with_context(|| format!("serial write {} to {} failed", i, target))?;
        }
        link.flush()
            .with_context(|| format!("serial flush to {} failed", target))?;
        drop(link);
        self.sent += 1;
        log::info!("glyph {} sent to {}", glyph.to_row_string(), target);
        Ok(())
    }

    /// Messages completed on this channel.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

/// Runs an `OutputChannel` on its own thread so a slow or stuck serial
/// device cannot hold up frame processing.
///
/// At most one glyph waits while another is being written; anything
/// dispatched beyond that is dropped and counted.
pub struct OutputDispatcher {
    tx: Option<SyncSender<Glyph>>,
    join: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl OutputDispatcher {
    pub fn spawn<C: SerialConnector + 'static>(mut channel: OutputChannel<C>) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel::<Glyph>(1);
        let failed = Arc::new(AtomicU64::new(0));
        let worker_failed = failed.clone();
        let join = std::thread::Builder::new()
            .name("glyph-output".to_string())
            .spawn(move || {
                for glyph in rx {
                    if let Err(e) = channel.send(&glyph) {
                        worker_failed.fetch_add(1, Ordering::SeqCst);
                        log::error!("serial output failed: {:#}", e);
                    }
                }
            })
            .context("failed to spawn output thread")?;
        Ok(Self {
            tx: Some(tx),
            join: Some(join),
            dropped: Arc::new(AtomicU64::new(0)),
            failed,
        })
    }

    /// Queue a glyph for sending. Returns false if it was dropped.
    pub fn dispatch(&self, glyph: Glyph) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        match tx.try_send(glyph) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                log::warn!("serial output busy, glyph {} dropped", glyph.to_row_string());
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                log::error!("serial output thread gone, glyph dropped");
                false
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    /// Finish queued sends and stop the worker.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn stop(&mut self) -> Result<()> {
        self.tx.take();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("output thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for OutputDispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("{}", e);
        }
    }
}
