// ============================================================
// Layer 6 — PNG Frame Sink
// ============================================================
// Writes colorized frames as a numbered PNG sequence:
//
//   output/<video>/frame_000000.png, frame_000001.png, ...
//
// File names use the source frame index, so a frame that failed
// leaves a gap instead of shifting every later frame. Muxing the
// sequence back into a container is left to external tools.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};

use crate::data::color_space::merge_to_rgb;
use crate::domain::frame::Frame;
use crate::domain::traits::FrameSink;

pub struct PngSequenceSink {
    dir:     PathBuf,
    written: usize,
}

impl PngSequenceSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir, written: 0 })
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for PngSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let path = self.frame_path(frame.index());
        merge_to_rgb(frame)
            .save(&path)
            .with_context(|| format!("Cannot write frame '{}'", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        tracing::debug!("Wrote {} frames to '{}'", self.written, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::list_frame_files;
    use crate::data::synthetic::SyntheticVideo;
    use crate::domain::frame::Resolution;

    #[test]
    fn test_frames_are_named_by_source_index() {
        let dir = std::env::temp_dir().join(format!("vc-sink-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let video = SyntheticVideo::still(Resolution::new(6, 5), 2);

        let mut sink = PngSequenceSink::create(&dir).unwrap();
        sink.write_frame(&video.frame(0)).unwrap();
        sink.write_frame(&video.frame(2)).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.written(), 2);
        let files = list_frame_files(&dir).unwrap();
        assert_eq!(files, vec![sink.frame_path(0), sink.frame_path(2)]);
        let img = image::open(&files[1]).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (5, 6));
        let _ = fs::remove_dir_all(&dir);
    }
}
