pub mod transcode;
pub mod transcoder;

pub use transcode::{TranscodeChannels, TranscodeStage, TranscodeStats};
pub use transcoder::{FfmpegTranscoder, Transcoder};
