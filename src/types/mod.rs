//! Data model shared by the client and server pipelines.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::timestamp::utc_ns_now;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Raw,
    Fragment,
}

impl SegmentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            SegmentKind::Raw => "raw_",
            SegmentKind::Fragment => "segment_",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SegmentKind::Raw => "h264",
            SegmentKind::Fragment => "mp4",
        }
    }

    /// `raw_3.h264`, `segment_17.mp4`
    pub fn file_name(self, index: u64) -> String {
        format!("{}{}.{}", self.prefix(), index, self.extension())
    }

    /// Inverse of [`SegmentKind::file_name`]; anything else is `None`.
    pub fn parse_file_name(name: &str) -> Option<(SegmentKind, u64)> {
        [SegmentKind::Raw, SegmentKind::Fragment]
            .into_iter()
            .find_map(|kind| {
                let rest = name.strip_prefix(kind.prefix())?;
                let digits = rest.strip_suffix(kind.extension())?.strip_suffix('.')?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse::<u64>().ok().map(|index| (kind, index))
            })
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentKind::Raw => write!(f, "raw"),
            SegmentKind::Fragment => write!(f, "fragment"),
        }
    }
}

/// One media file travelling through the pipeline. `index` is the
/// monotonically increasing capture order, independent of the (possibly
/// wrapped) number in the file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub index: u64,
    pub kind: SegmentKind,
    pub path: PathBuf,
    pub size: Option<u64>,
    pub utc_ns: u64,
}

impl Segment {
    pub fn new(index: u64, kind: SegmentKind, path: PathBuf) -> Self {
        Self {
            index,
            kind,
            path,
            size: None,
            utc_ns: utc_ns_now(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Handshake sentinels of the client pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlToken {
    ConnectionEstablished,
    CameraInitialized,
}

/// Item type of the client channel: tokens and segments never mix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientItem {
    Token(ControlToken),
    Segment(Segment),
}

/// Cycles `0..modulus`, used for slot file names.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    modulus: u64,
    next: u64,
}

impl SlotAllocator {
    pub fn new(modulus: u64) -> Self {
        assert!(modulus > 0, "slot modulus must be > 0");
        Self { modulus, next: 0 }
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn next(&mut self) -> u64 {
        let slot = self.next;
        self.next = (self.next + 1) % self.modulus;
        slot
    }

    /// Path of the next slot file of `kind` inside `dir`.
    pub fn next_path(&mut self, dir: &Path, kind: SegmentKind) -> PathBuf {
        dir.join(kind.file_name(self.next()))
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FragmentReady {
    pub segment_path: String,
}
