//! Crate-level tests
//!
//! `driver` runs the pipeline against scripted components; `e2e` runs real
//! conversions through FFmpeg and reads the results back.

pub mod fixtures;

mod driver;
