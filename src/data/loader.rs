// ============================================================
// Layer 4 — Frame Loader
// ============================================================
// Reads decoded video frames stored as image sequences.
//
// Expected layout (same as the dataset extraction step produces):
//
//   data/dataset/
//     ├── video_a/ frame_0001.png, frame_0002.png, ...
//     └── video_b/ 000001.jpg, 000002.jpg, ...
//
// Frames are ordered by file name. Every frame is resized to the
// model resolution on load, so the network always sees the size
// it was trained at.

use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbImage;

use crate::data::color_space::{luma_from_rgb, split_rgb};
use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::{Frame, LumaFrame, Resolution};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// All frames of one source video, in playback order.
#[derive(Debug, Clone)]
pub struct VideoEntry {
    pub id: String,
    pub frames: Vec<PathBuf>,
}

/// Every video found under a dataset root.
#[derive(Debug, Clone, Default)]
pub struct VideoCatalog {
    pub videos: Vec<VideoEntry>,
}

impl VideoCatalog {
    /// Scan `root`: each sub-directory holding frame files is a video.
    /// A root that holds frame files directly is treated as one video.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();

        // Missing data directory is not fatal — the caller can fall
        // back to synthetic clips.
        if !root.exists() {
            tracing::warn!("Dataset directory '{}' does not exist — empty catalog", root.display());
            return Ok(Self::default());
        }

        let mut dirs: Vec<PathBuf> = fs::read_dir(root)
            .with_context(|| format!("Cannot read directory '{}'", root.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();

        let mut videos = Vec::new();
        for dir in dirs {
            let frames = list_frame_files(&dir)?;
            if frames.is_empty() {
                tracing::debug!("Skipping '{}': no frame files", dir.display());
                continue;
            }
            let id = dir.file_name().and_then(|n| n.to_str()).unwrap_or("video").to_string();
            videos.push(VideoEntry { id, frames });
        }

        if videos.is_empty() {
            let frames = list_frame_files(root)?;
            if !frames.is_empty() {
                let id = root.file_name().and_then(|n| n.to_str()).unwrap_or("video").to_string();
                videos.push(VideoEntry { id, frames });
            }
        }

        tracing::info!(
            "Found {} videos ({} frames) under '{}'",
            videos.len(),
            videos.iter().map(|v| v.frames.len()).sum::<usize>(),
            root.display()
        );
        Ok(Self { videos })
    }
}

/// Frame files directly inside `dir`, sorted by name.
pub fn list_frame_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn read_resized(path: &Path, resolution: Resolution) -> Result<RgbImage, String> {
    let image = image::open(path)
        .map_err(|e| format!("cannot decode '{}': {e}", path.display()))?
        .to_rgb8();
    let (w, h) = (resolution.width as u32, resolution.height as u32);
    if image.dimensions() == (w, h) {
        Ok(image)
    } else {
        Ok(image::imageops::resize(&image, w, h, FilterType::Triangle))
    }
}

/// Load a colour frame as luma + ground-truth chroma.
pub fn load_color_frame(path: &Path, index: usize, resolution: Resolution) -> Result<Frame, String> {
    read_resized(path, resolution).map(|img| split_rgb(&img, index))
}

/// Load a frame as luminance only.
pub fn load_luma_frame(path: &Path, index: usize, resolution: Resolution) -> Result<LumaFrame, String> {
    read_resized(path, resolution).map(|img| luma_from_rgb(&img, index))
}

// ─── FrameDirectorySource ─────────────────────────────────────────────────────
/// Lazy grayscale frame sequence over one directory. Frames are decoded
/// one at a time as the consumer pulls them; nothing is cached.
pub struct FrameDirectorySource {
    files: std::vec::IntoIter<PathBuf>,
    resolution: Resolution,
    next_index: usize,
}

impl FrameDirectorySource {
    pub fn open(dir: impl AsRef<Path>, resolution: Resolution) -> Result<Self> {
        let files = list_frame_files(dir.as_ref())?;
        tracing::info!("Opened '{}' ({} frames)", dir.as_ref().display(), files.len());
        Ok(Self { files: files.into_iter(), resolution, next_index: 0 })
    }

    /// Frames of an already scanned video.
    pub fn from_entry(entry: &VideoEntry, resolution: Resolution) -> Self {
        Self { files: entry.frames.clone().into_iter(), resolution, next_index: 0 }
    }
}

impl Iterator for FrameDirectorySource {
    type Item = ColorizeResult<LumaFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.next()?;
        let index = self.next_index;
        self.next_index += 1;
        Some(
            load_luma_frame(&path, index, self.resolution)
                .map_err(|reason| ColorizeError::InferenceFrameFailure { index, reason }),
        )
    }
}
