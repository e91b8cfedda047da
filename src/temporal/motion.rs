// ============================================================
// Layer 5a — Motion Estimation
// ============================================================
// Dense motion on luminance, estimated backwards: for every block
// of frame t find (dy, dx) such that next[y, x] ≈ prev[y+dy, x+dx].
// That is exactly the lookup the warper needs to pull colour from
// frame t-1 onto frame t.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::frame::Resolution;

/// How motion between consecutive frames is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionMethod {
    /// Assume nothing moves. Residuals are still measured, so a cut
    /// or a large motion still shows up as low confidence.
    Static,
    /// Exhaustive block search within a square radius.
    BlockMatching,
}

/// Per-block backward displacement and match residual.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionField {
    block_size: usize,
    resolution: Resolution,
    vectors: Array2<(i32, i32)>,
    residuals: Array2<f32>,
}

impl MotionField {
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn grid(&self) -> (usize, usize) {
        self.vectors.dim()
    }

    /// Displacement for the pixel at (y, x).
    pub fn vector_at(&self, y: usize, x: usize) -> (i32, i32) {
        self.vectors[[y / self.block_size, x / self.block_size]]
    }

    /// Mean absolute luminance difference of the block containing (y, x).
    pub fn residual_at(&self, y: usize, x: usize) -> f32 {
        self.residuals[[y / self.block_size, x / self.block_size]]
    }
}

#[derive(Debug, Clone)]
pub struct MotionEstimator {
    block_size: usize,
    /// Candidate displacements, smallest first so ties favour less motion
    candidates: Vec<(i32, i32)>,
}

impl MotionEstimator {
    pub fn new(method: MotionMethod, block_size: usize, search_radius: usize) -> Self {
        let r = match method {
            MotionMethod::Static => 0,
            MotionMethod::BlockMatching => search_radius as i32,
        };
        let mut candidates: Vec<(i32, i32)> =
            (-r..=r).flat_map(|dy| (-r..=r).map(move |dx| (dy, dx))).collect();
        candidates.sort_by_key(|&(dy, dx)| (dy * dy + dx * dx, dy, dx));

        Self { block_size: block_size.max(1), candidates }
    }

    /// Estimate motion from `prev` to `next`. Both planes must share a shape.
    pub fn estimate(&self, prev: &Array2<f32>, next: &Array2<f32>) -> MotionField {
        let (h, w) = next.dim();
        let bs = self.block_size;
        let (rows, cols) = (h.div_ceil(bs), w.div_ceil(bs));

        let matches: Vec<((i32, i32), f32)> = (0..rows * cols)
            .into_par_iter()
            .map(|i| self.match_block(prev, next, (i / cols) * bs, (i % cols) * bs))
            .collect();

        MotionField {
            block_size: bs,
            resolution: Resolution::new(h, w),
            vectors: Array2::from_shape_fn((rows, cols), |(r, c)| matches[r * cols + c].0),
            residuals: Array2::from_shape_fn((rows, cols), |(r, c)| matches[r * cols + c].1),
        }
    }

    fn match_block(&self, prev: &Array2<f32>, next: &Array2<f32>, y0: usize, x0: usize) -> ((i32, i32), f32) {
        let (h, w) = next.dim();
        let y1 = (y0 + self.block_size).min(h);
        let x1 = (x0 + self.block_size).min(w);
        let count = ((y1 - y0) * (x1 - x0)) as f32;

        let mut best = ((0, 0), f32::INFINITY);
        for &(dy, dx) in &self.candidates {
            let in_bounds = y0 as i32 + dy >= 0
                && x0 as i32 + dx >= 0
                && y1 as i32 + dy <= h as i32
                && x1 as i32 + dx <= w as i32;
            if !in_bounds {
                continue;
            }

            let mut sad = 0.0f32;
            for y in y0..y1 {
                let py = (y as i32 + dy) as usize;
                for x in x0..x1 {
                    let px = (x as i32 + dx) as usize;
                    sad += (next[[y, x]] - prev[[py, px]]).abs();
                }
            }
            let mad = sad / count;
            if mad + 1e-7 < best.1 {
                best = ((dy, dx), mad);
            }
        }
        best
    }
}
