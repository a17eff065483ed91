pub mod camera;
pub mod capture;

pub use camera::{CaptureDevice, CommandCamera};
pub use capture::CaptureStage;
