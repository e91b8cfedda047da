// ============================================================
// Layer 5b — ML / Model Layer (Burn)
// ============================================================
// Everything that builds or runs the network lives here. The
// only other Burn user is the tensor batcher in `data`.
//
//   model.rs         — ColorizationNetwork: U-Net or attention
//                      variant behind one forward()
//
//   loss.rs          — reconstruction, masked temporal and
//                      gradient terms; weight schedules;
//                      LossRecord
//
//   unroll.rs        — runs the network over a clip batch in
//                      time order, threading TemporalState
//
//   trainer.rs       — TrainingOrchestrator (one step per clip
//                      batch) and the epoch loop
//
//   reconstructor.rs — frame-by-frame inference over a video of
//                      any length with bounded state
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)

/// Colorization network architectures
pub mod model;

/// Composite loss and weight schedules
pub mod loss;

/// Sequential unroll over clip batches
pub mod unroll;

/// Training orchestrator and epoch loop
pub mod trainer;

/// Streaming inference over whole videos
pub mod reconstructor;
