//! Test doubles for the capture device and the transcoder.
pub mod mocks;
