//! Timeline Fetchers
//!
//! Turn a date window into a day-by-day series by driving the
//! [`CalculationClient`](super::client::CalculationClient) one instant at a
//! time, with a cache in front.
//!
//! - [`RangeFetcher`]: transits to a reference subject, cached per calendar month
//! - [`EphemerisFetcher`]: raw-sky positions, cached per exact window
//!
//! Both are best-effort: a failed day is logged and skipped, never retried.
//! Calls within one fetch are strictly sequential. Separate fetchers (or
//! separate calls on the same fetcher) do not serialize against each other.

pub mod ephemeris;
pub mod range;

pub use ephemeris::{validate_ephemeris, EphemerisFetcher, EphemerisProgressFn};
pub use range::{MonthFetch, MonthSource, RangeFetcher, RangeProgress, RangeProgressFn};
