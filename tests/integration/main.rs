//! End-to-end tests against a scripted acquisition backend.
//!
//! Everything above the `Launcher` seam is the real crate: fetcher,
//! embedded-JSON extractor, linker, tracker, scoring, store, scheduler.

mod fixtures;
mod mock_source;

mod acquisition;
mod pipeline;
mod scheduler;
