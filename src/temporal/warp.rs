// ============================================================
// Layer 5a — Chroma Warping
// ============================================================
// Backward warp of a chroma field along a MotionField.

use ndarray::{Array2, Array3};

use crate::temporal::motion::MotionField;

/// Pull `prev_chroma` ([2, H, W]) onto the pixel grid of the next frame.
///
/// Returns the warped chroma and a validity plane: 1 where the source
/// pixel exists, 0 where it falls outside the previous frame (those
/// pixels get zero chroma).
pub fn warp_chroma(prev_chroma: &Array3<f32>, field: &MotionField) -> (Array3<f32>, Array2<f32>) {
    let (_, h, w) = prev_chroma.dim();
    let mut warped = Array3::zeros((2, h, w));
    let mut valid = Array2::zeros((h, w));

    for y in 0..h {
        for x in 0..w {
            let (dy, dx) = field.vector_at(y, x);
            let (sy, sx) = (y as i64 + dy as i64, x as i64 + dx as i64);
            if sy < 0 || sx < 0 || sy >= h as i64 || sx >= w as i64 {
                continue;
            }
            let (sy, sx) = (sy as usize, sx as usize);
            warped[[0, y, x]] = prev_chroma[[0, sy, sx]];
            warped[[1, y, x]] = prev_chroma[[1, sy, sx]];
            valid[[y, x]] = 1.0;
        }
    }

    (warped, valid)
}
