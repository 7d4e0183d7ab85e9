//! Folding streamed fragments into assistant turns.

pub mod accumulator;
pub mod reasoning;

pub use accumulator::{accumulate_stream, DeltaAccumulator, LiveDelta};
pub use reasoning::consolidate_reasoning_details;
