//! Core module for the transit pipeline
//!
//! # Architecture
//!
//! - `models`: Plain values (Subject, TransitDayData, Aspect, EphemerisDay)
//! - `error`: Error types using thiserror
//! - `calendar`: Date windows and month decomposition
//! - `config`: JSON config file plus environment overrides
//! - `client`: CalculationClient trait + HTTP oracle client
//! - `cache`: Injected cache stores and the month/ephemeris facades
//! - `fetch`: Range and ephemeris fetchers
//! - `scoring`: Aspect significance scoring and selection
//! - `orchestrator`: Generation-tagged request coordination

pub mod cache;
pub mod calendar;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod scoring;

// Re-export commonly used types
pub use cache::{
    CachePolicy, CacheStore, DiskCache, EphemerisCache, MemoryCache, MonthCache, NoopCache,
    CACHE_SCHEMA_VERSION,
};
pub use calendar::{parse_day, DateWindow, MonthKey};
pub use client::CalculationClient;
#[cfg(feature = "http")]
pub use client::HttpCalculationClient;
pub use config::{CacheSettings, ObservatoryConfig, CONFIG_FILE_NAME};
pub use error::{Result, ResultExt, TransitError};
pub use fetch::{EphemerisFetcher, MonthFetch, MonthSource, RangeFetcher, RangeProgress};
pub use models::{
    day_instant, Aspect, AspectMovement, CalculationOptions, DistributionMethod, EnrichedSubject,
    EphemerisDay, HouseComparison, HouseProjection, PointPosition, Progress, Subject,
    TransitDayData,
};
pub use orchestrator::{
    EphemerisRequest, FetchHandle, FetchOrchestrator, GenerationOutcome, Phase, TimelineState,
    TransitRequest,
};
pub use scoring::{rank_by_orb, score_aspect, tightest, AspectScorer, PointTier, ScoreBreakdown};
