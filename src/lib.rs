//! Glyph relay
//!
//! Watches a camera feed for square fiducial markers carrying a 5×5 binary
//! glyph, debounces the decoded glyph across consecutive frames, and hands
//! each accepted glyph to a display and, optionally, to a serial device.
//!
//! # Flow
//!
//! 1. A network start gate must see a ready reply before any frame is
//!    processed.
//! 2. Every frame runs through the detection pipeline: candidate squares
//!    are rectified and decoded, and a glyph is accepted once it is stable
//!    over the recent decodes.
//! 3. An accepted glyph locks detection for a cooldown and may be written to
//!    the serial link in a fixed row-framed layout.
//!
//! # Module Structure
//!
//! - `gate`: start flag and TCP handshake
//! - `detect`: vision primitives, debounce history, cooldown, pipeline
//! - `output`: serial framing and background dispatch
//! - `geometry`, `glyph`, `frame`: shared value types
//! - `ingest`: synthetic frame source
//! - `config`: daemon configuration

pub mod clock;
pub mod config;
pub mod detect;
pub mod frame;
pub mod gate;
pub mod geometry;
pub mod glyph;
pub mod ingest;
pub mod output;
pub mod render;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::RelayConfig;
pub use detect::{
    DetectionPipeline, FrameReport, PipelineSettings, PipelineStats, StubVision, VisionPrimitives,
};
pub use frame::Frame;
pub use gate::{GateOutcome, StartFlag, StartGate, TcpConnector};
pub use geometry::{canonicalize_corners, CanonicalCorners, CornerSet, Point};
pub use glyph::{Glyph, GlyphReading, GRID_SIZE, MIN_CONFIDENCE};
pub use ingest::{SyntheticConfig, SyntheticSource};
pub use output::{encode_glyph, OutputChannel, OutputDispatcher, SerialPortConnector};
pub use render::{LogRenderer, RecordingRenderer, Renderer};
