// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: these use cases tell the data, ml
// and infra layers what to do in which order.
//
// Rules for this layer:
//   - No tensor or colour-space math here
//   - No printing here (that's Layer 1)
//   - No clap types here; the CLI converts its arguments first
//
// Reference: Clean Architecture pattern

// The training workflow
pub mod train_use_case;

// The inference / reconstruction workflow
pub mod colorize_use_case;
