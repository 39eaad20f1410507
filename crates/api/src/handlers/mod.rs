//! HTTP handlers, grouped by resource.

pub mod assets;
pub mod jobs;
