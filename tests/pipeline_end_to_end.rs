use std::sync::Arc;
use std::time::Duration;

use glyph_relay::{
    output::{encode_glyph, MemoryConnector, OutputChannel, OutputDispatcher, MESSAGE_LEN},
    DetectionPipeline, Frame, Glyph, GlyphReading, ManualClock, PipelineSettings,
    RecordingRenderer, StartFlag, StubVision, SyntheticConfig, SyntheticSource,
};

fn marker() -> Glyph {
    "11111,10001,10101,10001,11111".parse().unwrap()
}

fn other() -> Glyph {
    "00100,01110,11111,01110,00100".parse().unwrap()
}

fn lit(seq: u64) -> Frame {
    Frame::filled(32, 32, seq, 200)
}

struct Rig {
    pipeline: DetectionPipeline<StubVision, RecordingRenderer>,
    renderer: RecordingRenderer,
    clock: Arc<ManualClock>,
    connector: MemoryConnector,
    start: StartFlag,
}

fn rig(vision: StubVision) -> Rig {
    let clock = Arc::new(ManualClock::new());
    let renderer = RecordingRenderer::new();
    let connector = MemoryConnector::new();
    let start = StartFlag::new();
    let dispatcher = OutputDispatcher::spawn(OutputChannel::new(connector.clone())).unwrap();
    let pipeline = DetectionPipeline::new(
        vision,
        renderer.clone(),
        PipelineSettings::default(),
        start.clone(),
        clock.clone(),
    )
    .with_output(dispatcher);
    Rig {
        pipeline,
        renderer,
        clock,
        connector,
        start,
    }
}

#[test]
fn nothing_happens_until_the_gate_opens() {
    let mut rig = rig(StubVision::new(GlyphReading::new(marker(), 0.9)).with_square(0, 0, 300));

    for seq in 0..3 {
        assert!(rig.pipeline.process_frame(&lit(seq)).gated);
    }
    assert_eq!(rig.pipeline.stats().frames_gated, 3);

    rig.start.open();
    rig.pipeline.process_frame(&lit(3));
    let report = rig.pipeline.process_frame(&lit(4));
    assert_eq!(report.accepted, Some(marker()));
    rig.pipeline.shutdown().unwrap();
    assert_eq!(rig.connector.messages().len(), 1);
}

#[test]
fn accept_locks_for_cooldown_then_relays_again() {
    let mut rig = rig(StubVision::new(GlyphReading::new(marker(), 0.9)).with_square(0, 0, 300));
    rig.start.open();

    let accepts: Vec<u64> = (0..5)
        .filter_map(|seq| {
            rig.clock.advance(Duration::from_millis(100));
            rig.pipeline.process_frame(&lit(seq)).accepted.map(|_| seq)
        })
        .collect();
    assert_eq!(accepts, vec![1]);
    assert!(rig.pipeline.detection_state().is_locked());

    // Accepted at t=0.2s; still locked just before t=3.2s.
    rig.clock.advance(Duration::from_millis(2650));
    let report = rig.pipeline.process_frame(&lit(5));
    assert_eq!(report.decodes, 0);
    assert!(report.accepted.is_none());

    rig.clock.advance(Duration::from_millis(100));
    let report = rig.pipeline.process_frame(&lit(6));
    assert_eq!(report.decodes, 1);
    assert_eq!(report.accepted, Some(marker()));

    rig.pipeline.shutdown().unwrap();
    let messages = rig.connector.messages();
    assert_eq!(messages.len(), 2);
    for message in &messages {
        assert_eq!(message.len(), MESSAGE_LEN);
        assert_eq!(message, &encode_glyph(&marker()).to_vec());
    }

    let log = rig.renderer.snapshot();
    assert_eq!(log.patterns, vec![marker(), marker()]);
    // Every frame outlined its one square, locked or not.
    assert_eq!(log.outlines.len(), 7);
    assert_eq!(rig.pipeline.stats().accepts, 2);
    assert_eq!(rig.pipeline.stats().outputs_dispatched, 2);
}

#[test]
fn cooldown_reports_unlocked_between_frames() {
    let mut rig = rig(StubVision::new(GlyphReading::new(marker(), 0.9)).with_square(0, 0, 300));
    rig.start.open();
    rig.pipeline.process_frame(&lit(0));
    rig.pipeline.process_frame(&lit(1));
    assert!(rig.pipeline.cooldown().is_locked());

    // No frame arrives after the cooldown ends; the timer still reports it.
    rig.clock.advance(Duration::from_secs(3));
    let cooldown = rig.pipeline.cooldown();
    assert!(!cooldown.is_locked());
    assert!(!rig.pipeline.detection_state().is_locked());
    rig.pipeline.shutdown().unwrap();
}

#[test]
fn a_stray_decode_delays_the_next_acceptance() {
    let vision = StubVision::new(GlyphReading::new(marker(), 0.9)).with_square(0, 0, 300);
    vision.push_reading(GlyphReading::new(marker(), 0.9));
    vision.push_reading(GlyphReading::new(marker(), 0.9));
    vision.push_reading(GlyphReading::new(other(), 0.9));
    let mut rig = rig(vision);
    rig.start.open();

    rig.pipeline.process_frame(&lit(0));
    assert_eq!(rig.pipeline.process_frame(&lit(1)).accepted, Some(marker()));
    rig.clock.advance(Duration::from_secs(3));

    // The stray lands at index 2 and has to slide out of the five-entry
    // window before the marker is stable again.
    let mut accepted = None;
    for seq in 2..12 {
        if let Some(glyph) = rig.pipeline.process_frame(&lit(seq)).accepted {
            accepted = Some((seq, glyph));
            break;
        }
    }
    assert_eq!(accepted, Some((7, marker())));
    // Frame 0 counts too: a lone entry is never stable.
    assert_eq!(rig.pipeline.stats().unstable, 6);
    rig.pipeline.shutdown().unwrap();
}

#[test]
fn low_confidence_never_reaches_output() {
    let mut rig = rig(StubVision::new(GlyphReading::new(marker(), 0.4)).with_square(0, 0, 300));
    rig.start.open();
    for seq in 0..10 {
        let report = rig.pipeline.process_frame(&lit(seq));
        assert_eq!(report.decodes, 1);
        assert_eq!(report.recorded, 0);
    }
    rig.pipeline.shutdown().unwrap();
    assert!(rig.connector.messages().is_empty());
    assert_eq!(rig.pipeline.stats().low_confidence, 10);
}

#[test]
fn synthetic_source_drives_the_pipeline() {
    let mut source = SyntheticSource::new(SyntheticConfig {
        width: 640,
        height: 480,
        blank_every: 4,
        paced: false,
        ..SyntheticConfig::default()
    })
    .unwrap();
    source.connect().unwrap();

    let mut rig = rig(StubVision::new(GlyphReading::new(marker(), 0.9)).with_square(200, 120, 240));
    rig.start.open();

    let mut blanks = 0;
    for _ in 0..8 {
        let frame = source.next_frame().unwrap();
        let report = rig.pipeline.process_frame(&frame);
        if report.candidates == 0 {
            blanks += 1;
        }
    }
    assert_eq!(blanks, 2);
    assert_eq!(source.stats().blank_frames, 2);
    assert_eq!(rig.pipeline.stats().accepts, 1);
    rig.pipeline.shutdown().unwrap();
}
