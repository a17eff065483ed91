// src/lib.rs
pub mod app;
pub mod config;
pub mod core;
pub mod io;
pub mod processors;
pub mod producers;
pub mod storage;
pub mod testing;
pub mod types;
pub mod web;

// Re-export die wichtigsten Typen
pub use app::client::run_client;
pub use app::server::{ServerPipeline, ServerReport};
pub use crate::core::{ClosableChannel, ComponentLogger, LogContext, ShutdownSignal};
pub use crate::core::timestamp::utc_ns_now;
pub use types::{ClientItem, ControlToken, Segment, SegmentKind};
