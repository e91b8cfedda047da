// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing frames, clips and the errors the
// colorization core can raise.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Host-side pixel storage is `ndarray`, nothing else
//
// Normalised ranges (shared by training and inference):
//   luminance   : CIE L* / 100        → [0, 1]
//   chrominance : CIE a*, b* / 128    → [-1, 1]

/// Luminance / chrominance frame types
pub mod frame;

/// Fixed-length training clips and their integrity rules
pub mod clip;

/// Typed error kinds of the colorization core
pub mod error;

/// Boundary abstractions (clip sources, frame sinks)
pub mod traits;
