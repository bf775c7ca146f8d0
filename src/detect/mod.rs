mod backend;
mod backends;
mod cooldown;
mod history;
mod pipeline;
mod result;

pub use backend::{Blob, PolygonClass, VisionPrimitives};
pub use backends::StubVision;
pub use cooldown::{CooldownTimer, DetectionState, COOLDOWN};
pub use history::{DebounceHistory, STABLE_WINDOW};
pub use pipeline::{DetectionPipeline, PipelineSettings};
pub use result::{FrameReport, PipelineStats};
