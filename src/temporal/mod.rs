// ============================================================
// Layer 5a — Temporal Propagation
// ============================================================
// Host-side (ndarray) machinery that links frame t-1 to frame t.
// Nothing here needs gradients: during training the colour being
// carried is ground truth, during inference it is a finished
// prediction.
//
//   motion.rs     — block-matching motion estimation on luminance
//   warp.rs       — pull previous chroma along the motion field
//   propagator.rs — confidence mask, scene-cut detection,
//                   TemporalState and per-frame Conditioning

pub mod motion;

pub mod warp;

pub mod propagator;
