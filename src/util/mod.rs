//! Shared helpers: clocks, pacing and process resources

pub mod pacing;
pub mod resource;
pub mod time;
