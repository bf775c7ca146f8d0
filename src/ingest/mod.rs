//! Frame sources.
//!
//! Camera capture is a collaborator outside this crate; the daemon and the
//! tests drive the pipeline from the synthetic source here.

pub mod synthetic;

pub use synthetic::{SourceStats, SyntheticConfig, SyntheticSource};
