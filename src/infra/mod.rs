// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence the core relies on but does not define:
//
//   checkpoint.rs  — Saving and loading network weights
//                    (Burn CompactRecorder), the latest.json
//                    pointer and TrainConfig as JSON so inference
//                    can rebuild the same network.
//
//   metrics.rs     — Per-epoch loss breakdown to CSV.
//
//   frame_sink.rs  — Colorized frames to a PNG sequence.
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// PNG sequence output
pub mod frame_sink;
