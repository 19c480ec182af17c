//! Core engine: link → track → score → publish, driven by the scheduler.

pub mod linker;
pub mod pipeline;
pub mod scheduler;
pub mod tracker;
