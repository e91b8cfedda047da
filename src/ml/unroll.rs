// ============================================================
// Layer 5b — Clip Unrolling
// ============================================================
// Drives the network over a batch of equal-length clips.
//
//   for t in 0..clip_len:                 (strictly in order)
//     conditions[i] = propagate(state[i], frame[i][t])   (rayon)
//     prediction    = network(luma_t, conditioning_t)    (one pass,
//                                                       all clips)
//     losses       += terms(prediction, truth_t, conditioning_t)
//     state[i]      = state[i].advance(frame[i][t], chroma)
//
// Each clip owns its own TemporalState; clips never see each other's
// colour. Cancellation is checked between time steps only.

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::data::batcher::{chroma_frames, FrameBatcher};
use crate::domain::clip::Clip;
use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::Frame;
use crate::ml::loss::{gradient_loss, reconstruction_loss, temporal_consistency_loss, ConditioningSource, LossRecord};
use crate::ml::model::ColorizationNetwork;
use crate::temporal::propagator::{Conditioning, MotionQuality, TemporalPropagator, TemporalState};

/// Unweighted loss terms for one clip batch, still attached to the graph.
pub struct ClipLosses<B: Backend> {
    pub reconstruction: Tensor<B, 1>,
    pub temporal:       Tensor<B, 1>,
    pub gradient:       Tensor<B, 1>,
    pub frames:         usize,
    pub scene_cuts:     usize,
}

impl<B: Backend> ClipLosses<B> {
    pub fn total(&self, temporal_weight: f64, gradient_weight: f64) -> Tensor<B, 1> {
        self.reconstruction.clone()
            + self.temporal.clone().mul_scalar(temporal_weight)
            + self.gradient.clone().mul_scalar(gradient_weight)
    }

    pub fn record(&self, step: usize, temporal_weight: f64, gradient_weight: f64) -> LossRecord {
        let value = |t: &Tensor<B, 1>| t.clone().into_scalar().elem::<f64>();
        LossRecord {
            step,
            reconstruction: value(&self.reconstruction),
            temporal:       value(&self.temporal),
            gradient:       value(&self.gradient),
            total:          value(&self.total(temporal_weight, gradient_weight)),
            temporal_weight,
            frames:         self.frames,
            scene_cuts:     self.scene_cuts,
        }
    }
}

/// Run `model` across `clips`. Clips must already be validated to share
/// one length and resolution, and to carry ground-truth chroma.
pub fn unroll_clips<B: Backend>(
    model:      &ColorizationNetwork<B>,
    clips:      &[Clip],
    propagator: &TemporalPropagator,
    source:     ConditioningSource,
    batcher:    &FrameBatcher<B>,
    cancel:     &CancellationToken,
) -> ColorizeResult<ClipLosses<B>> {
    let clip_len = clips
        .first()
        .map(Clip::len)
        .filter(|&len| len > 0)
        .ok_or_else(|| ColorizeError::clip_integrity("batch", "no frames to unroll"))?;

    let mut states = vec![TemporalState::Empty; clips.len()];
    let mut reconstruction = Vec::with_capacity(clip_len);
    let mut temporal       = Vec::with_capacity(clip_len);
    let mut gradient       = Vec::with_capacity(clip_len);
    let mut scene_cuts     = 0usize;

    for t in 0..clip_len {
        if cancel.is_cancelled() {
            return Err(ColorizeError::Cancelled);
        }

        let frames: Vec<&Frame> = clips.iter().map(|clip| &clip.frames[t]).collect();
        let conditions: Vec<Conditioning> = states
            .par_iter()
            .zip(frames.par_iter())
            .map(|(state, frame)| propagator.condition(state, &frame.luma))
            .collect();

        for (clip, cond) in clips.iter().zip(&conditions) {
            if let Some(err) = cond.failure() {
                scene_cuts += 1;
                tracing::debug!("Clip '{}': {err}", clip.id);
            }
        }

        let batch  = batcher.batch(frames.clone(), &batcher.device);
        let target = batch.chroma.ok_or_else(|| {
            ColorizeError::clip_integrity(clips[0].id.clone(), format!("frame {t} has no ground-truth chroma"))
        })?;
        let cond   = batcher.conditioning(&conditions);
        let [n, _, h, w] = cond.dims();
        let warped = cond.clone().slice([0..n, 0..2, 0..h, 0..w]);
        let mask   = cond.clone().slice([0..n, 2..3, 0..h, 0..w]);

        let prediction = model.forward(batch.luma, cond);

        reconstruction.push(reconstruction_loss(prediction.clone(), target.clone()));
        gradient.push(gradient_loss(prediction.clone(), target));
        // Frames without a predecessor have nothing to be consistent with.
        if conditions.iter().any(|c| c.quality != MotionQuality::Neutral) {
            temporal.push(temporal_consistency_loss(prediction.clone(), warped, mask));
        }

        states = match source {
            ConditioningSource::GroundTruth => states
                .into_iter()
                .zip(&frames)
                .map(|(state, frame)| match frame.chroma.as_ref() {
                    Some(chroma) => state.advance(&frame.luma, chroma),
                    None => TemporalState::Empty,
                })
                .collect(),
            ConditioningSource::Prediction => {
                let predicted = chroma_frames(prediction.detach())
                    .map_err(|reason| ColorizeError::clip_integrity(clips[0].id.clone(), reason))?;
                states
                    .into_iter()
                    .zip(frames.iter().zip(&predicted))
                    .map(|(state, (frame, chroma))| state.advance(&frame.luma, chroma))
                    .collect()
            }
        };
    }

    let device = batcher.device.clone();
    let mean = |terms: Vec<Tensor<B, 1>>| {
        if terms.is_empty() {
            Tensor::<B, 1>::zeros([1], &device)
        } else {
            Tensor::cat(terms, 0).mean()
        }
    };

    Ok(ClipLosses {
        reconstruction: mean(reconstruction),
        temporal:       mean(temporal),
        gradient:       mean(gradient),
        frames:         clip_len * clips.len(),
        scene_cuts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{noise_frame, SyntheticVideo};
    use crate::domain::frame::{ChromaFrame, Resolution};
    use crate::ml::model::{tests::{tiny_config, TestBackend}, Architecture};
    use crate::temporal::propagator::PropagatorConfig;
    use ndarray::Array3;

    fn propagator() -> TemporalPropagator {
        TemporalPropagator::new(PropagatorConfig { block_size: 4, search_radius: 2, ..Default::default() })
    }

    #[test]
    fn test_single_frame_clip_has_no_temporal_loss() {
        let device = Default::default();
        let res = Resolution::new(8, 8);
        let model = tiny_config(Architecture::UNet, 8, 8).init::<TestBackend>(&device);
        let clip = SyntheticVideo::still(res, 1).clip("still", 0, 1);
        let losses = unroll_clips(
            &model, &[clip], &propagator(), ConditioningSource::GroundTruth,
            &FrameBatcher::new(device), &CancellationToken::new(),
        ).unwrap();
        let record = losses.record(0, 1.0, 0.0);
        assert_eq!(record.temporal, 0.0);
        assert!(record.reconstruction > 0.0);
        assert_eq!(record.frames, 1);
    }

    #[test]
    fn test_scene_cut_is_counted_and_not_penalised() {
        let device = Default::default();
        let res = Resolution::new(8, 8);
        let model = tiny_config(Architecture::UNet, 8, 8).init::<TestBackend>(&device);
        let chroma = |v: f32| ChromaFrame::new(Array3::from_elem((2, 8, 8), v));
        let clip = Clip::new("cut", vec![
            Frame::with_chroma(noise_frame(0, res, 1), chroma(0.8)),
            Frame::with_chroma(noise_frame(1, res, 2), chroma(-0.8)),
        ]);
        let losses = unroll_clips(
            &model, &[clip], &propagator(), ConditioningSource::GroundTruth,
            &FrameBatcher::new(device), &CancellationToken::new(),
        ).unwrap();
        let record = losses.record(0, 1.0, 0.0);
        assert_eq!(record.scene_cuts, 1);
        assert_eq!(record.temporal, 0.0);
    }

    #[test]
    fn test_cancelled_unroll_stops_before_first_frame() {
        let device = Default::default();
        let model = tiny_config(Architecture::UNet, 8, 8).init::<TestBackend>(&device);
        let clip = SyntheticVideo::still(Resolution::new(8, 8), 1).clip("c", 0, 3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = unroll_clips(
            &model, &[clip], &propagator(), ConditioningSource::Prediction,
            &FrameBatcher::new(device), &cancel,
        );
        assert!(matches!(result, Err(ColorizeError::Cancelled)));
    }

    #[test]
    fn test_prediction_source_unrolls_a_moving_batch() {
        let device = Default::default();
        let res = Resolution::new(8, 8);
        let model = tiny_config(Architecture::Attention, 8, 8).init::<TestBackend>(&device);
        let clips = vec![
            SyntheticVideo::new(res, (1, 0), 8, 3).clip("a", 0, 3),
            SyntheticVideo::new(res, (0, -1), 8, 4).clip("b", 2, 3),
        ];
        let losses = unroll_clips(
            &model, &clips, &propagator(), ConditioningSource::Prediction,
            &FrameBatcher::new(device), &CancellationToken::new(),
        ).unwrap();
        let record = losses.record(7, 0.5, 0.1);
        assert_eq!(record.frames, 6);
        assert_eq!(record.step, 7);
        assert!(record.is_finite());
    }
}
