//! Snapshot sources for the frame cadence.
//!
//! A capture source is pull-based: the session loop asks for a snapshot on
//! each cadence tick and forwards whatever comes back. `None` means the
//! camera is not ready for that tick and is never an error.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

pub trait CaptureSource {
    /// Take a snapshot now, returning transmittable image bytes or nothing.
    fn snapshot(&mut self) -> Option<Vec<u8>>;
}

/// Pulls snapshots from a capture source on behalf of the session loop.
pub struct FrameEmitter {
    source: Box<dyn CaptureSource>,
}

impl FrameEmitter {
    pub fn new(source: Box<dyn CaptureSource>) -> Self {
        Self { source }
    }

    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.source.snapshot()
    }
}

/// Cycles through the image files of a directory, one per tick. This is the
/// terminal stand-in for a webcam: point it at a directory of JPEG frames.
pub struct DirectoryCapture {
    frames: Vec<PathBuf>,
    cursor: usize,
}

impl DirectoryCapture {
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        let mut frames: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png")
                )
            })
            .collect();
        frames.sort();
        Ok(Self { frames, cursor: 0 })
    }
}

impl CaptureSource for DirectoryCapture {
    fn snapshot(&mut self) -> Option<Vec<u8>> {
        if self.frames.is_empty() {
            return None;
        }
        let path = &self.frames[self.cursor % self.frames.len()];
        self.cursor += 1;
        match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                debug!("skipping unreadable frame {path:?}: {err}");
                None
            }
        }
    }
}

/// Emits a tiny counter-stamped payload per tick; used when no frame
/// directory is configured so the wire path stays exercised.
#[derive(Default)]
pub struct SyntheticCapture {
    counter: u64,
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureSource for SyntheticCapture {
    fn snapshot(&mut self) -> Option<Vec<u8>> {
        self.counter += 1;
        let mut bytes = b"invigil-frame:".to_vec();
        bytes.extend_from_slice(&self.counter.to_be_bytes());
        Some(bytes)
    }
}

/// Capture source that is never ready. Every tick is skipped silently.
pub struct NoCapture;

impl CaptureSource for NoCapture {
    fn snapshot(&mut self) -> Option<Vec<u8>> {
        None
    }
}
