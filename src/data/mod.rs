// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between image files on disk and tensors:
//
//   frame files (png / jpg)
//       │
//       ▼
//   loader         → decode, resize to model resolution
//       │
//       ▼
//   color_space    → sRGB → L*a*b*, split luma / chroma
//       │
//       ▼
//   dataset        → clip windows (Burn Dataset) + ClipSource
//       │
//       ▼
//   prefetch       → bounded producer thread (backpressure)
//       │
//       ▼
//   batcher        → stack frame t of every clip into tensors
//
// synthetic.rs generates stand-in videos for tests and demos.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// sRGB ↔ CIE Lab codec and luma / chroma split
pub mod color_space;

/// Frame directory scanning and lazy grayscale frame source
pub mod loader;

/// Clip windows over a video catalog
pub mod dataset;

/// Host frames ↔ Burn tensors
pub mod batcher;

/// Bounded prefetch queue
pub mod prefetch;

/// Seeded train/validation split
pub mod splitter;

/// Generated moving-texture videos
pub mod synthetic;
