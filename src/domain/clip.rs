// ============================================================
// Layer 3 — Clip
// ============================================================
// A clip is a short run of contiguous frames from one video,
// each carrying ground-truth chroma. It is the unit the trainer
// unrolls: frame t+1 is conditioned on what frame t produced,
// so order inside a clip is load-bearing.

use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::{Frame, Resolution};

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// Identifier of the source video plus start frame, for error reports
    pub id: String,
    pub frames: Vec<Frame>,
}

impl Clip {
    pub fn new(id: impl Into<String>, frames: Vec<Frame>) -> Self {
        Self { id: id.into(), frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Check everything the trainer relies on:
    ///   - exactly `expected_len` frames
    ///   - strictly consecutive source indices
    ///   - ground-truth chroma on every frame
    ///   - every plane at the model resolution, luminance finite
    pub fn validate(&self, expected_len: usize, resolution: Resolution) -> ColorizeResult<()> {
        if self.frames.len() != expected_len {
            return Err(ColorizeError::clip_integrity(
                &self.id,
                format!("expected {expected_len} frames, found {}", self.frames.len()),
            ));
        }

        for pair in self.frames.windows(2) {
            let (prev, next) = (pair[0].index(), pair[1].index());
            if next != prev + 1 {
                return Err(ColorizeError::clip_integrity(
                    &self.id,
                    format!("frames out of order: {prev} followed by {next}"),
                ));
            }
        }

        for frame in &self.frames {
            let chroma = frame.chroma.as_ref().ok_or_else(|| {
                ColorizeError::clip_integrity(
                    &self.id,
                    format!("frame {} has no ground-truth chroma", frame.index()),
                )
            })?;
            if chroma.resolution() != resolution {
                return Err(ColorizeError::clip_integrity(
                    &self.id,
                    format!("frame {} chroma is {}, expected {resolution}",
                        frame.index(), chroma.resolution()),
                ));
            }
            frame.luma.validate(resolution)?;
        }

        Ok(())
    }
}
