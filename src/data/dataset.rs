use std::sync::Arc;

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::data::loader::{load_color_frame, VideoCatalog};
use crate::domain::clip::Clip;
use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::Resolution;
use crate::domain::traits::ClipSource;

/// Where one training clip lives: video number + first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub video: usize,
    pub start: usize,
}

/// Clip windows over a catalog of frame directories. Windows are cheap
/// descriptors; pixels are decoded only in `load_clip`.
pub struct ClipDataset {
    catalog: Arc<VideoCatalog>,
    windows: Vec<ClipWindow>,
    clip_len: usize,
    resolution: Resolution,
}

impl ClipDataset {
    /// Enumerate every window of `clip_len` frames, advancing by `stride`.
    /// Videos shorter than one clip contribute nothing.
    pub fn from_catalog(catalog: Arc<VideoCatalog>, clip_len: usize, stride: usize, resolution: Resolution) -> Self {
        let stride = stride.max(1);
        let mut windows = Vec::new();
        for (video, entry) in catalog.videos.iter().enumerate() {
            if entry.frames.len() < clip_len {
                tracing::warn!(
                    "Video '{}' has {} frames, fewer than clip length {} — skipped",
                    entry.id, entry.frames.len(), clip_len
                );
                continue;
            }
            windows.extend(
                (0..=entry.frames.len() - clip_len)
                    .step_by(stride)
                    .map(|start| ClipWindow { video, start }),
            );
        }
        Self { catalog, windows, clip_len, resolution }
    }

    pub fn windows(&self) -> &[ClipWindow] {
        &self.windows
    }
}

impl Dataset<ClipWindow> for ClipDataset {
    fn get(&self, index: usize) -> Option<ClipWindow> {
        self.windows.get(index).copied()
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

impl ClipSource for ClipDataset {
    fn clip_count(&self) -> usize {
        self.windows.len()
    }

    fn load_clip(&self, index: usize) -> ColorizeResult<Clip> {
        let window = self.get(index).ok_or_else(|| {
            ColorizeError::clip_integrity(format!("window#{index}"), "window index out of range")
        })?;
        let entry = &self.catalog.videos[window.video];
        let id = format!("{}@{}", entry.id, window.start);

        let paths = entry.frames.iter().enumerate().skip(window.start).take(self.clip_len);
        let frames = paths
            .map(|(i, path)| load_color_frame(path, i, self.resolution))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| ColorizeError::clip_integrity(&id, reason))?;

        Ok(Clip::new(id, frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::VideoEntry;
    use std::path::PathBuf;

    fn catalog(lengths: &[usize]) -> Arc<VideoCatalog> {
        let videos = lengths
            .iter()
            .enumerate()
            .map(|(i, &n)| VideoEntry {
                id: format!("v{i}"),
                frames: (0..n).map(|f| PathBuf::from(format!("v{i}/{f:04}.png"))).collect(),
            })
            .collect();
        Arc::new(VideoCatalog { videos })
    }

    #[test]
    fn test_windows_respect_clip_length_and_stride() {
        let ds = ClipDataset::from_catalog(catalog(&[10, 3, 5]), 4, 2, Resolution::new(8, 8));
        // video 0: starts 0,2,4,6 — video 1 too short — video 2: start 0
        assert_eq!(ds.len(), 5);
        assert_eq!(ds.get(4), Some(ClipWindow { video: 2, start: 0 }));
        assert!(ds.windows().iter().all(|w| w.video != 1));
    }

    #[test]
    fn test_undecodable_clip_is_an_integrity_error() {
        let ds = ClipDataset::from_catalog(catalog(&[4]), 4, 1, Resolution::new(8, 8));
        let err = ds.load_clip(0).unwrap_err();
        assert!(matches!(err, ColorizeError::ClipIntegrity { .. }));
    }
}
