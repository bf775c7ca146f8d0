//! glyph_relayd - glyph relay daemon
//!
//! This daemon:
//! 1. Loads configuration (`GLYPH_RELAY_CONFIG` plus env overrides)
//! 2. Runs the network start gate in the background, or opens the start
//!    flag immediately when the gate is disabled
//! 3. Feeds frames from the synthetic source through the detection pipeline
//! 4. Logs accepted glyphs and, when enabled, writes them to the serial link

use anyhow::Result;
use std::sync::mpsc::{self, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glyph_relay::{
    config::RelayConfig,
    output::{OutputChannel, OutputDispatcher, SerialPortConnector},
    DetectionPipeline, Glyph, GlyphReading, LogRenderer, MonotonicClock, StartFlag, StartGate,
    StubVision, SyntheticConfig, SyntheticSource, TcpConnector,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const DEMO_GLYPH: &str = "10101,01110,11011,01110,10101";
const DEMO_CONFIDENCE: f32 = 0.9;
const DEMO_NOISE: f64 = 0.05;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = RelayConfig::load()?;

    let start = StartFlag::new();
    let gate_handle = if cfg.gate.enabled {
        let connector = TcpConnector::new(cfg.gate.socket_addr()?, cfg.gate.connect_timeout);
        let gate = StartGate::new(connector, start.clone()).with_max_attempts(cfg.gate.max_attempts);
        log::info!(
            "start gate waiting on {} ({} attempts)",
            cfg.gate.addr,
            cfg.gate.max_attempts
        );
        Some(gate.spawn()?)
    } else {
        start.open();
        log::info!("start gate disabled; detection enabled at startup");
        None
    };

    let mut source = SyntheticSource::new(SyntheticConfig {
        width: cfg.source.width,
        height: cfg.source.height,
        target_fps: cfg.source.target_fps,
        blank_every: 50,
        paced: true,
    })?;
    source.connect()?;

    let side = cfg.source.width.min(cfg.source.height) as i32 / 2;
    let demo: Glyph = DEMO_GLYPH.parse()?;
    let vision = StubVision::new(GlyphReading::new(demo, DEMO_CONFIDENCE))
        .with_square(
            (cfg.source.width as i32 - side) / 2,
            (cfg.source.height as i32 - side) / 2,
            side,
        )
        .with_noise(DEMO_NOISE);

    let mut pipeline = DetectionPipeline::new(
        vision,
        LogRenderer,
        cfg.detection.clone(),
        start.clone(),
        Arc::new(MonotonicClock::new()),
    );
    if cfg.output_enabled {
        let channel = OutputChannel::new(SerialPortConnector::new(cfg.serial.clone()));
        pipeline = pipeline.with_output(OutputDispatcher::spawn(channel)?);
        log::info!(
            "serial output to {} @ {} baud",
            cfg.serial.device,
            cfg.serial.baud_rate
        );
    }
    pipeline.reset();

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("glyph_relayd running at {} fps", cfg.source.target_fps);
    let mut last_health_log = Instant::now();

    loop {
        match rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let frame = source.next_frame()?;
        pipeline.process_frame(&frame);

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = pipeline.stats();
            let source_stats = source.stats();
            log::info!(
                "health: gate_open={} locked={} source_frames={} frames={} gated={} squares={} decodes={} low_conf={} accepts={} outputs={} faults={}",
                start.is_open(),
                pipeline.cooldown().is_locked(),
                source_stats.frames_captured,
                stats.frames,
                stats.frames_gated,
                stats.squares,
                stats.decodes,
                stats.low_confidence,
                stats.accepts,
                stats.outputs_dispatched,
                stats.faults
            );
            last_health_log = Instant::now();
        }
    }

    log::info!("shutdown signal received, draining serial output...");
    pipeline.shutdown()?;
    if let Some(handle) = gate_handle {
        if handle.is_finished() {
            if let Ok(outcome) = handle.join() {
                log::info!("start gate finished: {:?}", outcome);
            }
        }
    }
    Ok(())
}
