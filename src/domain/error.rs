// ============================================================
// Layer 3 — Error Kinds
// ============================================================
// Typed errors for the colorization core, built with `thiserror`.
// Application and CLI code wrap these in `anyhow::Result`.
//
// Local, per-frame problems (MotionEstimationFailure,
// InferenceFrameFailure) are recovered where they happen.
// TrainingDivergence is always fatal for the caller.

/// Every error the colorization core can report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColorizeError {
    /// Non-finite or wrong-resolution luminance. Rejected before the network.
    #[error("malformed input at frame {frame}: {reason}")]
    MalformedInput { frame: usize, reason: String },

    /// No reliable correspondence between two frames. Never fatal: the
    /// propagator zeroes its confidence mask instead.
    #[error(
        "motion estimation failed between frames {from} and {to} \
         (mean confidence {mean_confidence:.3})"
    )]
    MotionEstimationFailure {
        from: usize,
        to: usize,
        mean_confidence: f32,
    },

    /// Clip shorter than configured, out of order, or missing ground truth.
    #[error("clip '{clip}' failed integrity check: {reason}")]
    ClipIntegrity { clip: String, reason: String },

    /// Loss became non-finite. The update was not applied.
    #[error("training diverged at step {step} (loss = {loss}) on clips {clips:?}")]
    TrainingDivergence {
        step: usize,
        loss: f64,
        clips: Vec<String>,
    },

    /// A single inference frame could not be decoded or colorized.
    #[error("frame {index} could not be colorized: {reason}")]
    InferenceFrameFailure { index: usize, reason: String },

    /// Cooperative cancellation observed at a frame boundary.
    #[error("cancelled at a frame boundary")]
    Cancelled,
}

impl ColorizeError {
    pub fn malformed(frame: usize, reason: impl Into<String>) -> Self {
        Self::MalformedInput { frame, reason: reason.into() }
    }

    pub fn clip_integrity(clip: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ClipIntegrity { clip: clip.into(), reason: reason.into() }
    }

    /// Errors after which training must stop instead of moving on to
    /// the next batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TrainingDivergence { .. } | Self::Cancelled)
    }

    /// Frame a per-frame error refers to, if any.
    pub fn frame_index(&self) -> Option<usize> {
        match self {
            Self::MalformedInput { frame, .. } => Some(*frame),
            Self::InferenceFrameFailure { index, .. } => Some(*index),
            Self::MotionEstimationFailure { to, .. } => Some(*to),
            _ => None,
        }
    }
}

pub type ColorizeResult<T> = Result<T, ColorizeError>;
