// src/core/logging.rs
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::timestamp::utc_ns_now;

// Globale Sequenznummer für Korrelation
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LogContext {
    pub component: String,
    pub instance_id: String,
    pub segment: Option<u64>,
    pub sequence: u64,
    pub timestamp_ns: u64,
}

impl LogContext {
    pub fn new(component: &str, instance_id: &str) -> Self {
        Self {
            component: component.to_string(),
            instance_id: instance_id.to_string(),
            segment: None,
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            timestamp_ns: utc_ns_now(),
        }
    }

    pub fn with_segment(mut self, index: u64) -> Self {
        self.segment = Some(index);
        self
    }

    pub fn format(&self, message: &str) -> String {
        let segment_info = match self.segment {
            Some(index) => format!(" segment={}", index),
            None => String::new(),
        };

        format!(
            "[{}:{}][seq={:06}{}] {}",
            self.component, self.instance_id, self.sequence, segment_info, message
        )
    }
}

/// Uniform, component-prefixed logging for pipeline stages.
pub trait ComponentLogger {
    fn log_context(&self) -> LogContext;

    fn debug(&self, message: &str) {
        log::debug!("{}", self.log_context().format(message));
    }

    fn info(&self, message: &str) {
        log::info!("{}", self.log_context().format(message));
    }

    fn warn(&self, message: &str) {
        log::warn!("{}", self.log_context().format(message));
    }

    fn error(&self, message: &str) {
        log::error!("{}", self.log_context().format(message));
    }

    fn info_segment(&self, index: u64, message: &str) {
        log::info!("{}", self.log_context().with_segment(index).format(message));
    }
}
