// ============================================================
// Layer 5a — Temporal Propagator
// ============================================================
// Carries the previous frame's colour forward. For frame t:
//
//   1. estimate motion t-1 → t on luminance
//   2. warp frame t-1's chroma along it
//   3. build a per-pixel confidence mask
//   4. hand warped chroma + mask to the network (conditioning)
//      and to the loss (consistency target)
//
// Low confidence (occlusion, fast motion) lives only in the mask,
// never in branches of the loss. A scene cut zeroes both the mask
// and the warped chroma, so the frame looks like a first frame.

use std::mem::size_of;

use ndarray::{Array2, Array3, Zip};
use serde::{Deserialize, Serialize};

use crate::domain::error::ColorizeError;
use crate::domain::frame::{ChromaFrame, LumaFrame, Resolution};
use crate::temporal::motion::{MotionEstimator, MotionMethod};
use crate::temporal::warp::warp_chroma;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatorConfig {
    pub method: MotionMethod,
    /// Side of the square blocks used for matching, in pixels
    pub block_size: usize,
    /// Largest displacement searched per axis, in pixels
    pub search_radius: usize,
    /// Block residual at which confidence has dropped to 1/e
    pub photometric_sigma: f32,
    /// Motion magnitude (px) up to which confidence is not reduced
    pub fast_motion: f32,
    /// Motion magnitude (px) at which confidence reaches zero
    pub max_motion: f32,
    /// Mean confidence below which the transition counts as a cut
    pub cut_threshold: f32,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            method: MotionMethod::BlockMatching,
            block_size: 8,
            search_radius: 4,
            photometric_sigma: 0.05,
            fast_motion: 3.0,
            max_motion: 6.0,
            cut_threshold: 0.2,
        }
    }
}

// ─── TemporalState ────────────────────────────────────────────────────────────
/// What one frame leaves behind for the next.
///
/// Owned by exactly one pipeline iterating one clip or video. It is
/// consumed and replaced by [`TemporalState::advance`] after each frame,
/// never edited in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TemporalState {
    /// No predecessor: first frame, or right after a reset.
    #[default]
    Empty,
    Carried {
        index: usize,
        luma: Array2<f32>,
        chroma: Array3<f32>,
    },
}

impl TemporalState {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Replace this state with the one frame `luma` + `chroma` leaves.
    pub fn advance(self, luma: &LumaFrame, chroma: &ChromaFrame) -> Self {
        Self::Carried {
            index: luma.index(),
            luma: luma.data().clone(),
            chroma: chroma.data().clone(),
        }
    }

    /// Bytes of pixel data held.
    pub fn retained_bytes(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Carried { luma, chroma, .. } => (luma.len() + chroma.len()) * size_of::<f32>(),
        }
    }
}

// ─── Conditioning ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionQuality {
    /// No predecessor, conditioning is all zeros.
    Neutral,
    Reliable { mean_confidence: f32 },
    /// Correspondence failed across the frame; mask forced to zero.
    SceneCut { mean_confidence: f32 },
}

/// Per-frame output of the propagator.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditioning {
    /// Previous chroma aligned to this frame, [2, H, W]
    pub warped: Array3<f32>,
    /// Confidence in [0, 1], [H, W]
    pub mask: Array2<f32>,
    pub quality: MotionQuality,
    /// Frame the colour was carried from, if any
    pub from: Option<usize>,
    /// Frame being conditioned
    pub to: usize,
}

impl Conditioning {
    pub fn neutral(resolution: Resolution, to: usize) -> Self {
        Self {
            warped: Array3::zeros((2, resolution.height, resolution.width)),
            mask: Array2::zeros((resolution.height, resolution.width)),
            quality: MotionQuality::Neutral,
            from: None,
            to,
        }
    }

    pub fn mean_confidence(&self) -> f32 {
        self.mask.mean().unwrap_or(0.0)
    }

    /// The non-fatal error a scene cut stands for.
    pub fn failure(&self) -> Option<ColorizeError> {
        match (self.quality, self.from) {
            (MotionQuality::SceneCut { mean_confidence }, Some(from)) => {
                Some(ColorizeError::MotionEstimationFailure { from, to: self.to, mean_confidence })
            }
            _ => None,
        }
    }
}

// ─── TemporalPropagator ───────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TemporalPropagator {
    config: PropagatorConfig,
    estimator: MotionEstimator,
}

impl TemporalPropagator {
    pub fn new(config: PropagatorConfig) -> Self {
        let estimator = MotionEstimator::new(config.method, config.block_size, config.search_radius);
        Self { config, estimator }
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    /// Conditioning for `luma` given what the previous frame left behind.
    pub fn condition(&self, state: &TemporalState, luma: &LumaFrame) -> Conditioning {
        let resolution = luma.resolution();
        let (from, prev_luma, prev_chroma) = match state {
            TemporalState::Empty => return Conditioning::neutral(resolution, luma.index()),
            TemporalState::Carried { index, luma, chroma } => (*index, luma, chroma),
        };

        if prev_luma.dim() != luma.data().dim() {
            tracing::warn!(
                "Carried state is {:?} but frame {} is {resolution} — using neutral conditioning",
                prev_luma.dim(), luma.index()
            );
            return Conditioning::neutral(resolution, luma.index());
        }

        let field = self.estimator.estimate(prev_luma, luma.data());
        let (mut warped, valid) = warp_chroma(prev_chroma, &field);

        let mut mask = Array2::zeros(valid.dim());
        Zip::indexed(&mut mask).and(&valid).for_each(|(y, x), m, &v| {
            let residual = field.residual_at(y, x) / self.config.photometric_sigma;
            let (dy, dx) = field.vector_at(y, x);
            let magnitude = ((dy * dy + dx * dx) as f32).sqrt();
            *m = v * (-residual * residual).exp() * self.motion_weight(magnitude);
        });

        let mean_confidence = mask.mean().unwrap_or(0.0);
        let quality = if mean_confidence < self.config.cut_threshold {
            // Nothing from the previous shot may reach the network.
            mask.fill(0.0);
            warped.fill(0.0);
            tracing::debug!(
                "Scene cut between frames {from} and {} (mean confidence {mean_confidence:.3})",
                luma.index()
            );
            MotionQuality::SceneCut { mean_confidence }
        } else {
            MotionQuality::Reliable { mean_confidence }
        };

        Conditioning { warped, mask, quality, from: Some(from), to: luma.index() }
    }

    fn motion_weight(&self, magnitude: f32) -> f32 {
        let (fast, max) = (self.config.fast_motion, self.config.max_motion);
        if magnitude <= fast {
            1.0
        } else if max <= fast {
            0.0
        } else {
            (1.0 - (magnitude - fast) / (max - fast)).clamp(0.0, 1.0)
        }
    }

    /// Host-side consistency penalty: mean(mask · |prediction − warped|),
    /// the same quantity the training loss minimises.
    pub fn consistency_penalty(prediction: &ChromaFrame, conditioning: &Conditioning) -> f32 {
        let pred = prediction.data();
        let total: f32 = Zip::indexed(pred)
            .and(&conditioning.warped)
            .fold(0.0, |acc, (_, y, x), &p, &w| acc + conditioning.mask[[y, x]] * (p - w).abs());
        total / pred.len().max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{noise_frame, SyntheticVideo};

    fn propagator() -> TemporalPropagator {
        TemporalPropagator::new(PropagatorConfig { block_size: 4, search_radius: 3, ..Default::default() })
    }

    #[test]
    fn test_first_frame_is_neutral() {
        let video = SyntheticVideo::still(Resolution::new(8, 8), 1);
        let cond = propagator().condition(&TemporalState::Empty, &video.luma(0));
        assert_eq!(cond.quality, MotionQuality::Neutral);
        assert!(cond.mask.iter().all(|&m| m == 0.0));
        assert!(cond.warped.iter().all(|&w| w == 0.0));
        assert!(cond.failure().is_none());
    }

    #[test]
    fn test_static_scene_is_fully_confident() {
        let video = SyntheticVideo::still(Resolution::new(16, 16), 3);
        let f0 = video.frame(0);
        let state = TemporalState::Empty.advance(&f0.luma, f0.chroma.as_ref().unwrap());
        let cond = propagator().condition(&state, &video.luma(1));
        assert_eq!(cond.quality, MotionQuality::Reliable { mean_confidence: 1.0 });
        assert_eq!(&cond.warped, f0.chroma.as_ref().unwrap().data());
    }

    #[test]
    fn test_translation_warps_colour_onto_next_frame() {
        let video = SyntheticVideo::new(Resolution::new(24, 24), (-1, 1), 4, 8);
        let (f0, f1) = (video.frame(0), video.frame(1));
        let state = TemporalState::Empty.advance(&f0.luma, f0.chroma.as_ref().unwrap());
        let cond = propagator().condition(&state, &f1.luma);

        assert!(matches!(cond.quality, MotionQuality::Reliable { .. }));
        let truth = f1.chroma.as_ref().unwrap().data();
        for y in 4..20 {
            for x in 4..20 {
                assert_eq!(cond.warped[[0, y, x]], truth[[0, y, x]]);
                assert!(cond.mask[[y, x]] > 0.99);
            }
        }
    }

    #[test]
    fn test_scene_cut_zeroes_confidence_everywhere() {
        let res = Resolution::new(16, 16);
        let before = noise_frame(0, res, 100);
        let after = noise_frame(1, res, 200);
        let chroma = ChromaFrame::new(Array3::from_elem((2, 16, 16), 0.7));
        let state = TemporalState::Empty.advance(&before, &chroma);

        let cond = propagator().condition(&state, &after);
        assert!(matches!(cond.quality, MotionQuality::SceneCut { .. }));
        assert!(cond.mask.iter().all(|&m| m == 0.0));
        assert!(cond.warped.iter().all(|&w| w == 0.0));

        // a completely different colour on the far side of the cut costs nothing
        let recoloured = ChromaFrame::new(Array3::from_elem((2, 16, 16), -0.7));
        assert_eq!(TemporalPropagator::consistency_penalty(&recoloured, &cond), 0.0);
        assert!(matches!(
            cond.failure(),
            Some(ColorizeError::MotionEstimationFailure { from: 0, to: 1, .. })
        ));
    }

    #[test]
    fn test_resolution_change_degrades_to_neutral() {
        let small = SyntheticVideo::still(Resolution::new(8, 8), 1).frame(0);
        let state = TemporalState::Empty.advance(&small.luma, small.chroma.as_ref().unwrap());
        let big = SyntheticVideo::still(Resolution::new(16, 16), 1).luma(1);
        assert_eq!(propagator().condition(&state, &big).quality, MotionQuality::Neutral);
    }

    #[test]
    fn test_advance_replaces_state_and_reports_size() {
        let f = SyntheticVideo::still(Resolution::new(4, 5), 2).frame(0);
        let state = TemporalState::default();
        assert!(state.is_empty());
        assert_eq!(state.retained_bytes(), 0);
        let state = state.advance(&f.luma, f.chroma.as_ref().unwrap());
        assert_eq!(state.retained_bytes(), 3 * 20 * 4);
    }

    #[test]
    fn test_fast_motion_is_down_weighted() {
        let p = TemporalPropagator::new(PropagatorConfig::default());
        assert_eq!(p.motion_weight(2.0), 1.0);
        assert!((p.motion_weight(4.5) - 0.5).abs() < 1e-6);
        assert_eq!(p.motion_weight(9.0), 0.0);
    }
}
