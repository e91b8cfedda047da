// ============================================================
// Layer 4 — Synthetic Videos
// ============================================================
// Deterministic stand-in videos: a smoothed random texture that
// translates by a fixed integer velocity each frame, with chroma
// painted in world coordinates so colour moves with the content.
//
// Used by the test-suite and by `train --synthetic N` when no
// extracted dataset is available.

use ndarray::{Array2, Array3};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::domain::clip::Clip;
use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::{ChromaFrame, Frame, LumaFrame, Resolution};
use crate::domain::traits::ClipSource;

/// One generated video of unbounded length.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    resolution: Resolution,
    velocity: (i64, i64),
    texture: Array2<f32>,
    hue: (f32, f32),
    margin: usize,
}

impl SyntheticVideo {
    /// `max_frames` bounds how far the texture can scroll before it wraps.
    pub fn new(resolution: Resolution, velocity: (i64, i64), max_frames: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let reach = velocity.0.unsigned_abs().max(velocity.1.unsigned_abs()) as usize;
        let margin = reach * max_frames + 2;
        let (h, w) = (resolution.height + 2 * margin, resolution.width + 2 * margin);

        let noise = Array2::from_shape_fn((h, w), |_| rng.gen::<f32>());
        // 3×3 box blur keeps texture blocky enough to match yet unique
        let texture = Array2::from_shape_fn((h, w), |(y, x)| {
            let mut acc = 0.0;
            let mut n = 0.0;
            for yy in y.saturating_sub(1)..(y + 2).min(h) {
                for xx in x.saturating_sub(1)..(x + 2).min(w) {
                    acc += noise[[yy, xx]];
                    n += 1.0;
                }
            }
            0.1 + 0.8 * acc / n
        });

        let hue = (rng.gen_range(0.05..0.3), rng.gen_range(0.05..0.3));
        Self { resolution, velocity, texture, hue, margin }
    }

    /// A video that never moves.
    pub fn still(resolution: Resolution, seed: u64) -> Self {
        Self::new(resolution, (0, 0), 0, seed)
    }

    fn origin(&self, t: usize) -> (usize, usize) {
        let (th, tw) = self.texture.dim();
        let span_y = (th - self.resolution.height) as i64;
        let span_x = (tw - self.resolution.width) as i64;
        let oy = (self.margin as i64 + self.velocity.0 * t as i64).rem_euclid(span_y.max(1));
        let ox = (self.margin as i64 + self.velocity.1 * t as i64).rem_euclid(span_x.max(1));
        (oy as usize, ox as usize)
    }

    /// Frame `t` with ground-truth chroma.
    pub fn frame(&self, t: usize) -> Frame {
        let (oy, ox) = self.origin(t);
        let (h, w) = (self.resolution.height, self.resolution.width);
        let luma = Array2::from_shape_fn((h, w), |(y, x)| self.texture[[oy + y, ox + x]]);
        let chroma = Array3::from_shape_fn((2, h, w), |(c, y, x)| {
            let (wy, wx) = ((oy + y) as f32, (ox + x) as f32);
            let v = self.texture[[oy + y, ox + x]];
            if c == 0 {
                0.6 * (wx * self.hue.0).sin() * v
            } else {
                0.6 * (wy * self.hue.1).cos() * (1.0 - v)
            }
        });
        Frame::with_chroma(LumaFrame::new(t, luma), ChromaFrame::new(chroma))
    }

    /// Frame `t` as grayscale inference input.
    pub fn luma(&self, t: usize) -> LumaFrame {
        self.frame(t).into_luma()
    }

    /// Contiguous clip starting at frame `start`.
    pub fn clip(&self, id: impl Into<String>, start: usize, len: usize) -> Clip {
        Clip::new(id, (start..start + len).map(|t| self.frame(t)).collect())
    }
}

// ─── SyntheticVideos ──────────────────────────────────────────────────────────
/// A fixed set of synthetic videos exposed as a clip source.
pub struct SyntheticVideos {
    videos: Vec<SyntheticVideo>,
    clip_len: usize,
    clips_per_video: usize,
}

impl SyntheticVideos {
    pub fn new(count: usize, resolution: Resolution, clip_len: usize, clips_per_video: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let max_frames = clip_len * clips_per_video;
        let videos = (0..count)
            .map(|_| {
                let velocity = (rng.gen_range(-2..=2), rng.gen_range(-2..=2));
                SyntheticVideo::new(resolution, velocity, max_frames, rng.gen())
            })
            .collect();
        tracing::info!("Generated {count} synthetic videos at {resolution}");
        Self { videos, clip_len, clips_per_video }
    }
}

impl ClipSource for SyntheticVideos {
    fn clip_count(&self) -> usize {
        self.videos.len() * self.clips_per_video
    }

    fn load_clip(&self, index: usize) -> ColorizeResult<Clip> {
        let video = index / self.clips_per_video.max(1);
        let start = (index % self.clips_per_video.max(1)) * self.clip_len;
        let source = self.videos.get(video).ok_or_else(|| {
            ColorizeError::clip_integrity(format!("synthetic#{index}"), "clip index out of range")
        })?;
        Ok(source.clip(format!("synthetic{video}@{start}"), start, self.clip_len))
    }
}

/// Uniform noise frame, unrelated to anything else. Handy for cuts.
pub fn noise_frame(index: usize, resolution: Resolution, seed: u64) -> LumaFrame {
    let mut rng = StdRng::seed_from_u64(seed);
    LumaFrame::new(
        index,
        Array2::from_shape_fn((resolution.height, resolution.width), |_| rng.gen::<f32>()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_shift_by_velocity() {
        let res = Resolution::new(8, 8);
        let video = SyntheticVideo::new(res, (1, 2), 10, 7);
        let a = video.luma(3);
        let b = video.luma(4);
        // content at (y, x) in frame 4 was at (y + 1, x + 2) in frame 3
        for y in 0..6 {
            for x in 0..6 {
                assert_eq!(b.data()[[y, x]], a.data()[[y + 1, x + 2]]);
            }
        }
    }

    #[test]
    fn test_same_seed_same_video() {
        let res = Resolution::new(6, 6);
        assert_eq!(SyntheticVideo::new(res, (1, 0), 4, 3).frame(2), SyntheticVideo::new(res, (1, 0), 4, 3).frame(2));
    }

    #[test]
    fn test_clip_source_produces_valid_clips() {
        let res = Resolution::new(8, 8);
        let source = SyntheticVideos::new(2, res, 4, 3, 11);
        assert_eq!(source.clip_count(), 6);
        for i in 0..source.clip_count() {
            let clip = source.load_clip(i).unwrap();
            clip.validate(4, res).unwrap();
        }
        assert!(source.load_clip(6).is_err());
    }
}
