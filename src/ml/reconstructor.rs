// ============================================================
// Layer 5b — Inference Reconstructor
// ============================================================
// Applies a trained network to a video of any length, one frame at
// a time, in order:
//
//   Empty ──first good frame──► Warm ──next frame──► Warm ...
//     ▲                           │
//     └──── corrupt frame ────────┘   (report it, drop carried colour)
//
// Only the TemporalState of the previous output is kept, so memory
// does not depend on how many frames have gone by.
//
// The reconstructor is a single-pass Iterator: it consumes its frame
// source and cannot be restarted.

use std::iter::FusedIterator;

use burn::prelude::*;
use ndarray::Zip;
use tokio_util::sync::CancellationToken;

use crate::data::batcher::FrameBatcher;
use crate::domain::error::{ColorizeError, ColorizeResult};
use crate::domain::frame::{ChromaFrame, Frame, LumaFrame, Resolution};
use crate::ml::model::ColorizationNetwork;
use crate::temporal::propagator::{Conditioning, MotionQuality, TemporalPropagator, TemporalState};

/// Lifecycle of one reconstruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Empty,
    Warm,
    Finished,
}

/// A colorized frame plus how its conditioning was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedFrame {
    pub frame:        Frame,
    pub conditioning: MotionQuality,
}

pub struct InferenceReconstructor<B, S>
where
    B: Backend,
    S: Iterator<Item = ColorizeResult<LumaFrame>>,
{
    model:      ColorizationNetwork<B>,
    propagator: TemporalPropagator,
    batcher:    FrameBatcher<B>,
    resolution: Resolution,
    /// 0 = raw network output, 1 = trust warped colour fully where confident
    blend:      f32,
    source:     S,
    state:      TemporalState,
    finished:   bool,
    cancel:     CancellationToken,
}

impl<B, S> InferenceReconstructor<B, S>
where
    B: Backend,
    S: Iterator<Item = ColorizeResult<LumaFrame>>,
{
    pub fn new(
        model:      ColorizationNetwork<B>,
        propagator: TemporalPropagator,
        resolution: Resolution,
        source:     S,
        device:     B::Device,
    ) -> Self {
        Self {
            model,
            propagator,
            batcher: FrameBatcher::new(device),
            resolution,
            blend: 0.0,
            source,
            state: TemporalState::Empty,
            finished: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_temporal_blend(mut self, blend: f32) -> Self {
        self.blend = blend.clamp(0.0, 1.0);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn phase(&self) -> Phase {
        if self.finished {
            Phase::Finished
        } else if self.state.is_empty() {
            Phase::Empty
        } else {
            Phase::Warm
        }
    }

    /// Bytes of pixel data carried between frames.
    pub fn retained_bytes(&self) -> usize {
        self.state.retained_bytes()
    }

    fn finish(&mut self) {
        self.finished = true;
        self.state = TemporalState::Empty;
    }

    fn colorize(&self, luma: &LumaFrame) -> ColorizeResult<(ChromaFrame, Conditioning)> {
        luma.validate(self.resolution)?;
        let conditioning = self.propagator.condition(&self.state, luma);
        if let Some(failure) = conditioning.failure() {
            tracing::debug!("{failure}");
        }

        let predicted = self.model.predict_frame(luma, &conditioning, self.resolution, &self.batcher)?;
        Ok((self.blended(predicted, &conditioning), conditioning))
    }

    /// pred + blend · mask · (warped − pred)
    fn blended(&self, predicted: ChromaFrame, conditioning: &Conditioning) -> ChromaFrame {
        if self.blend == 0.0 {
            return predicted;
        }
        let mut data = predicted.into_data();
        let blend = self.blend;
        Zip::indexed(&mut data)
            .and(&conditioning.warped)
            .for_each(|(_, y, x), p, &w| *p += blend * conditioning.mask[[y, x]] * (w - *p));
        ChromaFrame::new(data)
    }
}

impl<B, S> Iterator for InferenceReconstructor<B, S>
where
    B: Backend,
    S: Iterator<Item = ColorizeResult<LumaFrame>>,
{
    type Item = ColorizeResult<ReconstructedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finish();
            return Some(Err(ColorizeError::Cancelled));
        }

        let luma = match self.source.next() {
            None => {
                self.finish();
                return None;
            }
            Some(Ok(luma)) => luma,
            Some(Err(err)) => {
                tracing::warn!("{err}; next frame restarts from neutral conditioning");
                self.state = TemporalState::Empty;
                return Some(Err(err));
            }
        };

        match self.colorize(&luma) {
            Ok((chroma, conditioning)) => {
                let state = std::mem::take(&mut self.state);
                self.state = state.advance(&luma, &chroma);
                Some(Ok(ReconstructedFrame {
                    frame:        Frame::grayscale(luma).colorize(chroma),
                    conditioning: conditioning.quality,
                }))
            }
            Err(err) => {
                tracing::warn!("{err}; next frame restarts from neutral conditioning");
                self.state = TemporalState::Empty;
                Some(Err(err))
            }
        }
    }
}

impl<B, S> FusedIterator for InferenceReconstructor<B, S>
where
    B: Backend,
    S: Iterator<Item = ColorizeResult<LumaFrame>>,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::SyntheticVideo;
    use crate::ml::model::{tests::{tiny_config, with_live_conditioning, TestBackend}, Architecture};
    use crate::temporal::propagator::PropagatorConfig;
    use ndarray::Array2;

    const RES: Resolution = Resolution { height: 8, width: 8 };

    fn reconstructor<S>(source: S, blend: f32) -> InferenceReconstructor<TestBackend, S>
    where
        S: Iterator<Item = ColorizeResult<LumaFrame>>,
    {
        let model = tiny_config(Architecture::UNet, 8, 8).init::<TestBackend>(&Default::default());
        reconstructor_with(model, source, blend)
    }

    fn reconstructor_with<S>(model: ColorizationNetwork<TestBackend>, source: S, blend: f32) -> InferenceReconstructor<TestBackend, S>
    where
        S: Iterator<Item = ColorizeResult<LumaFrame>>,
    {
        let propagator = TemporalPropagator::new(PropagatorConfig { block_size: 4, search_radius: 1, ..Default::default() });
        InferenceReconstructor::new(model, propagator, RES, source, Default::default()).with_temporal_blend(blend)
    }

    #[test]
    fn test_state_machine_and_termination() {
        let video = SyntheticVideo::still(RES, 2);
        let mut rec = reconstructor((0..3).map(move |t| Ok(video.luma(t))), 0.5);
        assert_eq!(rec.phase(), Phase::Empty);

        let first = rec.next().unwrap().unwrap();
        assert_eq!(first.conditioning, MotionQuality::Neutral);
        assert_eq!(rec.phase(), Phase::Warm);

        let second = rec.next().unwrap().unwrap();
        assert!(matches!(second.conditioning, MotionQuality::Reliable { .. }));
        rec.next().unwrap().unwrap();

        assert!(rec.next().is_none());
        assert_eq!(rec.phase(), Phase::Finished);
        assert_eq!(rec.retained_bytes(), 0);
        assert!(rec.next().is_none());
    }

    #[test]
    fn test_long_video_keeps_memory_bounded() {
        let video = SyntheticVideo::new(RES, (0, 1), 16, 5);
        let mut rec = reconstructor((0..10_000).map(move |t| Ok(video.luma(t % 16))), 0.5);
        let one_frame = RES.pixels() * 3 * std::mem::size_of::<f32>();

        let mut produced = 0usize;
        while let Some(out) = rec.next() {
            out.unwrap();
            produced += 1;
            assert!(rec.retained_bytes() <= one_frame);
        }
        assert_eq!(produced, 10_000);
    }

    #[test]
    fn test_corrupt_frame_resets_conditioning() {
        let video = SyntheticVideo::still(RES, 3);
        let k = 4;
        let source = (0..8).map(move |t| {
            if t == k {
                Err(ColorizeError::InferenceFrameFailure { index: t, reason: "truncated file".into() })
            } else {
                Ok(video.luma(t))
            }
        });
        let outputs: Vec<_> = reconstructor(source, 0.5).collect();
        assert_eq!(outputs.len(), 8);

        assert!(outputs[k - 1].is_ok());
        assert!(matches!(outputs[k], Err(ColorizeError::InferenceFrameFailure { index, .. }) if index == k));
        let after = outputs[k + 1].as_ref().unwrap();
        assert_eq!(after.conditioning, MotionQuality::Neutral);
        assert!(matches!(outputs[k + 2].as_ref().unwrap().conditioning, MotionQuality::Reliable { .. }));
    }

    #[test]
    fn test_nan_frame_is_reported_as_malformed() {
        let video = SyntheticVideo::still(RES, 3);
        let mut bad = Array2::from_elem((8, 8), 0.3);
        bad[[0, 0]] = f32::INFINITY;
        let frames = vec![Ok(video.luma(0)), Ok(LumaFrame::new(1, bad)), Ok(video.luma(2))];
        let outputs: Vec<_> = reconstructor(frames.into_iter(), 0.0).collect();
        assert!(matches!(outputs[1], Err(ColorizeError::MalformedInput { frame: 1, .. })));
        assert_eq!(outputs[2].as_ref().unwrap().conditioning, MotionQuality::Neutral);
    }

    #[test]
    fn test_static_scene_output_converges() {
        let video = SyntheticVideo::still(RES, 8);
        let model = with_live_conditioning(tiny_config(Architecture::UNet, 8, 8).init::<TestBackend>(&Default::default()), 0.01);
        let outputs: Vec<ChromaFrame> = reconstructor_with(model, (0..30).map(move |t| Ok(video.luma(t))), 0.5)
            .map(|r| r.unwrap().frame.chroma.unwrap())
            .collect();

        let change = |a: &ChromaFrame, b: &ChromaFrame| {
            a.data().iter().zip(b.data().iter()).map(|(x, y)| (x - y).abs()).fold(0.0f32, f32::max)
        };
        // frame 1 is the first to see carried colour, so it does move
        let first = change(&outputs[0], &outputs[1]);
        let last = change(&outputs[28], &outputs[29]);
        assert!(first > 0.0);
        assert!(last < 1e-4, "still moving by {last} after 30 frames");
        assert!(last < first);
    }

    #[test]
    fn test_luminance_passes_through_untouched() {
        let video = SyntheticVideo::new(RES, (1, 0), 4, 12);
        let inputs: Vec<LumaFrame> = (0..4).map(|t| video.luma(t)).collect();
        let expected = inputs.clone();
        let outputs: Vec<_> = reconstructor(inputs.into_iter().map(Ok), 0.5)
            .map(|r| r.unwrap().frame.into_luma())
            .collect();
        assert_eq!(outputs, expected);
    }

    #[test]
    fn test_cancellation_stops_between_frames() {
        let video = SyntheticVideo::still(RES, 1);
        let cancel = CancellationToken::new();
        let mut rec = reconstructor((0..100).map(move |t| Ok(video.luma(t))), 0.5)
            .with_cancellation(cancel.clone());
        rec.next().unwrap().unwrap();
        cancel.cancel();
        assert!(matches!(rec.next(), Some(Err(ColorizeError::Cancelled))));
        assert!(rec.next().is_none());
        assert_eq!(rec.retained_bytes(), 0);
    }
}
