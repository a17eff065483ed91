// src/storage/retention.rs
use std::collections::VecDeque;

use crate::types::Segment;

/// Bounded, oldest-first window of retained fragments.
#[derive(Debug)]
pub struct RetentionWindow {
    capacity: usize,
    entries: VecDeque<Segment>,
}

impl RetentionWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "retention window must hold at least one fragment");
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity + 1),
        }
    }

    /// Appends `fragment`; returns the evicted oldest entry once the window
    /// is over capacity.
    pub fn push(&mut self, fragment: Segment) -> Option<Segment> {
        self.entries.push_back(fragment);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.entries.iter()
    }
}
