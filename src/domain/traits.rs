// ============================================================
// Layer 3 — Boundary Traits
// ============================================================
// Clip sampling and video reassembly are external collaborators.
// The core only needs these two contracts:
//
//   ClipSource → random access to decoded training clips
//   FrameSink  → somewhere to put colorized frames
//
// The inference input side needs no trait of its own: any
// `Iterator<Item = ColorizeResult<LumaFrame>>` is a frame source.

use anyhow::Result;

use crate::domain::clip::Clip;
use crate::domain::error::ColorizeResult;
use crate::domain::frame::Frame;

// ─── ClipSource ───────────────────────────────────────────────────────────────
/// Anything that can hand out fixed-length training clips by index.
///
/// Implementations:
///   - ClipDataset     → clip windows over frame directories on disk
///   - SyntheticVideos → generated moving-gradient videos
pub trait ClipSource: Send + Sync {
    /// Number of clips available.
    fn clip_count(&self) -> usize;

    /// Decode clip `index`. Decoding problems come back as
    /// `ClipIntegrity` so the sampler can skip to the next clip.
    fn load_clip(&self, index: usize) -> ColorizeResult<Clip>;
}

// ─── FrameSink ────────────────────────────────────────────────────────────────
/// Receives colorized frames in output order.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Called once after the last frame. Default: nothing to flush.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
