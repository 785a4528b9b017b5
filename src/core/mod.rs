//! Device Core
//!
//! The GPU context (device, queue, surface, frame pacing, timestamps) and
//! the per-slot upload-buffer ring.

pub mod context;
pub mod frame;

pub use context::{GpuTimings, RenderContext, TimestampQueries};
pub use frame::FrameSlots;
