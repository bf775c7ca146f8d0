pub mod stub;

pub use stub::StubVision;
