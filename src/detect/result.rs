use crate::glyph::Glyph;

/// What happened to one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Frame skipped because the start gate has not opened.
    pub gated: bool,
    /// Candidate regions returned by blob extraction.
    pub candidates: usize,
    /// Candidates that classified as squares (and were outlined).
    pub squares: usize,
    /// Decode attempts made on this frame.
    pub decodes: usize,
    /// Decodes that cleared the confidence bar and entered history.
    pub recorded: usize,
    /// Glyph accepted on this frame, if any.
    pub accepted: Option<Glyph>,
    /// Candidates skipped because a primitive failed on them.
    pub faults: usize,
}

impl FrameReport {
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }
}

/// Running totals since the pipeline was created.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub frames_gated: u64,
    pub squares: u64,
    pub decodes: u64,
    pub low_confidence: u64,
    pub unstable: u64,
    pub accepts: u64,
    pub outputs_dispatched: u64,
    pub faults: u64,
}
