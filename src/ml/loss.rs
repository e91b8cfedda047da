// ============================================================
// Layer 5b — Composite Loss
// ============================================================
// total = reconstruction
//       + w_t(step) · temporal consistency
//       + w_g       · gradient structure
//
//   reconstruction — L1 between predicted and true chroma
//   temporal       — mean(mask · |pred − warped previous chroma|)
//                    A scene cut or first frame has mask = 0, so
//                    there is no branch: the term simply vanishes.
//   gradient       — L1 between finite differences, keeps edges
//                    of colour regions aligned with the target
//
// w_t follows a TemporalWeightSchedule so the network can first
// learn per-frame colour and only later be pushed toward stability.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

// ─── Schedule ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemporalWeightSchedule {
    Constant { weight: f64 },
    /// 0 at step 0, `target` from `warmup_steps` on.
    LinearRamp { target: f64, warmup_steps: usize },
    /// 0 before `start_step`, `target` after.
    Delayed { target: f64, start_step: usize },
}

impl Default for TemporalWeightSchedule {
    fn default() -> Self {
        Self::LinearRamp { target: 0.5, warmup_steps: 500 }
    }
}

impl TemporalWeightSchedule {
    pub fn weight_at(&self, step: usize) -> f64 {
        match *self {
            Self::Constant { weight } => weight,
            Self::LinearRamp { target, warmup_steps } => {
                if warmup_steps == 0 {
                    target
                } else {
                    target * (step as f64 / warmup_steps as f64).min(1.0)
                }
            }
            Self::Delayed { target, start_step } => {
                if step >= start_step { target } else { 0.0 }
            }
        }
    }
}

/// Which chroma the propagator warps forward while training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditioningSource {
    /// Previous ground-truth chroma
    #[default]
    GroundTruth,
    /// Previous prediction, detached, as at inference time
    Prediction,
}

// ─── Terms ────────────────────────────────────────────────────────────────────
pub fn reconstruction_loss<B: Backend>(prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    (prediction - target).abs().mean()
}

/// `mask` is [N, 1, H, W] and broadcast over both chroma channels.
pub fn temporal_consistency_loss<B: Backend>(
    prediction: Tensor<B, 4>,
    warped:     Tensor<B, 4>,
    mask:       Tensor<B, 4>,
) -> Tensor<B, 1> {
    let mask = Tensor::cat(vec![mask.clone(), mask], 1);
    ((prediction - warped).abs() * mask).mean()
}

pub fn gradient_loss<B: Backend>(prediction: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    let [n, c, h, w] = prediction.dims();
    let device = prediction.device();
    let mut total = Tensor::<B, 1>::zeros([1], &device);

    if w > 1 {
        let dx = |t: Tensor<B, 4>| {
            t.clone().slice([0..n, 0..c, 0..h, 1..w]) - t.slice([0..n, 0..c, 0..h, 0..w - 1])
        };
        total = total + (dx(prediction.clone()) - dx(target.clone())).abs().mean();
    }
    if h > 1 {
        let dy = |t: Tensor<B, 4>| {
            t.clone().slice([0..n, 0..c, 1..h, 0..w]) - t.slice([0..n, 0..c, 0..h - 1, 0..w])
        };
        total = total + (dy(prediction) - dy(target)).abs().mean();
    }
    total
}

// ─── LossRecord ───────────────────────────────────────────────────────────────
/// Scalar breakdown of one training (or validation) step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossRecord {
    pub step:            usize,
    pub reconstruction:  f64,
    pub temporal:        f64,
    pub gradient:        f64,
    pub total:           f64,
    pub temporal_weight: f64,
    /// Frames that contributed (clips × clip length)
    pub frames:          usize,
    /// Transitions whose mask was zeroed by cut detection
    pub scene_cuts:      usize,
}

impl LossRecord {
    pub fn is_finite(&self) -> bool {
        self.total.is_finite()
    }
}

/// Running average of LossRecords, one per batch.
#[derive(Debug, Clone, Default)]
pub struct LossAccumulator {
    sum:        LossRecord,
    batches:    usize,
}

impl LossAccumulator {
    pub fn add(&mut self, record: &LossRecord) {
        self.sum.reconstruction  += record.reconstruction;
        self.sum.temporal        += record.temporal;
        self.sum.gradient        += record.gradient;
        self.sum.total           += record.total;
        self.sum.temporal_weight  = record.temporal_weight;
        self.sum.step             = record.step;
        self.sum.frames          += record.frames;
        self.sum.scene_cuts      += record.scene_cuts;
        self.batches             += 1;
    }

    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Per-batch means; NaN losses when nothing was added.
    pub fn mean(&self) -> LossRecord {
        let n = if self.batches > 0 { self.batches as f64 } else { f64::NAN };
        LossRecord {
            reconstruction: self.sum.reconstruction / n,
            temporal:       self.sum.temporal / n,
            gradient:       self.sum.gradient / n,
            total:          self.sum.total / n,
            ..self.sum.clone()
        }
    }
}
