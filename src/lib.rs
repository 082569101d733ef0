//! voyager_transits - Transit and ephemeris timelines
//!
//! Turns a (subject, date range) pair into a day-by-day series of
//! positions and aspects, calling a slow external calculation oracle as
//! little as possible. It is designed to be consumed by:
//! - The CLI binary (src/bin/vt.rs)
//! - Any async host that renders timelines progressively
//!
//! # Architecture
//!
//! This crate follows the "Library-First" pattern:
//! - **lib.rs** (this file): Re-exports, no CLI concerns
//! - **core/**: Pipeline components, leaves first
//! - **bin/vt.rs**: Thin wrapper that calls the library
//!
//! ```text
//! FetchOrchestrator → RangeFetcher / EphemerisFetcher → cache (read)
//!                   → CalculationClient (on miss) → cache (write)
//!                   → TimelineState (incremental)  → AspectScorer (display)
//! ```

pub mod core;

pub use crate::core::{
    AspectScorer, CachePolicy, CalculationClient, CalculationOptions, DateWindow, EphemerisCache,
    EphemerisFetcher, FetchHandle, FetchOrchestrator, GenerationOutcome, MonthCache, MonthKey,
    ObservatoryConfig, Phase, RangeFetcher, Result, Subject, TimelineState, TransitDayData,
    TransitError,
};

#[cfg(feature = "http")]
pub use crate::core::HttpCalculationClient;

/// Crate version, as reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the version of the voyager_transits library
pub fn version() -> &'static str {
    VERSION
}
