//! Range Fetcher
//!
//! Decomposes a window into calendar months. Each month is served from the
//! [`MonthCache`] when possible; otherwise the part of the month inside the
//! window is fetched one day at a time.
//!
//! # Caching rule
//!
//! A month is written back only when the fetch window covered the whole
//! month, every day succeeded and the fetch was not cancelled. Clipped
//! months are recomputed on every request until a request covers them
//! fully.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::cache::MonthCache;
use crate::core::calendar::{DateWindow, MonthKey};
use crate::core::client::CalculationClient;
use crate::core::models::{day_instant, CalculationOptions, Subject, TransitDayData};

/// Progress event, emitted after every day and after every cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeProgress {
    pub month: MonthKey,
    /// Days of this month's fetch window processed so far (including failures)
    pub days_processed: usize,
    /// Days in this month's fetch window
    pub days_in_window: usize,
    /// Whether the month is done
    pub month_done: bool,
}

/// Progress sink for range fetches
pub type RangeProgressFn<'a> = dyn Fn(RangeProgress) + Send + Sync + 'a;

/// Where a month's days came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthSource {
    Cache,
    Oracle,
}

/// Outcome of one month.
#[derive(Debug, Clone)]
pub struct MonthFetch {
    pub month: MonthKey,
    /// Part of the month inside the requested window
    pub window: DateWindow,
    /// Days resolved, in chronological order (may extend past `window` on a cache hit)
    pub days: Vec<TransitDayData>,
    pub source: MonthSource,
    /// Days whose oracle call failed
    pub failed_days: Vec<NaiveDate>,
    /// Stopped early because the token was cancelled
    pub cancelled: bool,
}

impl MonthFetch {
    /// Whether this result may be written to the month cache
    pub fn is_cacheable(&self) -> bool {
        self.source == MonthSource::Oracle
            && self.window == self.month.bounds()
            && self.failed_days.is_empty()
            && !self.cancelled
    }
}

/// Month-by-month transit fetcher
#[derive(Clone)]
pub struct RangeFetcher {
    client: Arc<dyn CalculationClient>,
    cache: MonthCache,
    pacing: Duration,
}

impl RangeFetcher {
    pub fn new(client: Arc<dyn CalculationClient>, cache: MonthCache) -> Self {
        Self {
            client,
            cache,
            pacing: Duration::from_millis(crate::core::config::DEFAULT_PACING_MS),
        }
    }

    /// Delay between successive oracle calls (zero disables it)
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn cache(&self) -> &MonthCache {
        &self.cache
    }

    /// Fetch every day of `window`, best-effort.
    ///
    /// The result is chronological and contains only days inside `window`.
    /// Failed days are absent; nothing here returns an error.
    pub async fn fetch_range(
        &self,
        subject: &Subject,
        reference: &Subject,
        window: &DateWindow,
        options: &CalculationOptions,
        progress: Option<&RangeProgressFn<'_>>,
    ) -> Vec<TransitDayData> {
        let cancel = CancellationToken::new();
        self.fetch_range_until(subject, reference, window, options, progress, &cancel)
            .await
    }

    /// [`fetch_range`](Self::fetch_range), stopping early once `cancel` fires.
    pub async fn fetch_range_until(
        &self,
        subject: &Subject,
        reference: &Subject,
        window: &DateWindow,
        options: &CalculationOptions,
        progress: Option<&RangeProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Vec<TransitDayData> {
        let mut days = Vec::with_capacity(window.day_count());
        for month in window.months() {
            if cancel.is_cancelled() {
                debug!(%window, "range fetch cancelled");
                break;
            }
            let fetched = self
                .fetch_month(subject, reference, month, window, options, progress, cancel)
                .await;
            days.extend(fetched.days);
        }
        window.retain(days, TransitDayData::day)
    }

    /// Resolve one month of `window`.
    #[allow(clippy::too_many_arguments)]
    pub async fn fetch_month(
        &self,
        subject: &Subject,
        reference: &Subject,
        month: MonthKey,
        window: &DateWindow,
        options: &CalculationOptions,
        progress: Option<&RangeProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> MonthFetch {
        let bounds = month.bounds();
        let fetch_window = window.intersect(&bounds).unwrap_or(bounds);

        if let Some(days) = self.cache.get(&reference.id, month).await {
            if let Some(report) = progress {
                report(RangeProgress {
                    month,
                    days_processed: fetch_window.day_count(),
                    days_in_window: fetch_window.day_count(),
                    month_done: true,
                });
            }
            return MonthFetch {
                month,
                window: fetch_window,
                days,
                source: MonthSource::Cache,
                failed_days: Vec::new(),
                cancelled: false,
            };
        }

        let mut fetched = MonthFetch {
            month,
            window: fetch_window,
            days: Vec::with_capacity(fetch_window.day_count()),
            source: MonthSource::Oracle,
            failed_days: Vec::new(),
            cancelled: false,
        };

        for (index, day) in fetch_window.days().enumerate() {
            if cancel.is_cancelled() {
                fetched.cancelled = true;
                break;
            }
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            match self
                .client
                .transit_day(subject, reference, day_instant(day), options)
                .await
            {
                Ok(record) => fetched.days.push(record),
                Err(e) => {
                    warn!(%day, subject = %reference.id, error = %e, "skipping failed day");
                    fetched.failed_days.push(day);
                }
            }

            if let Some(report) = progress {
                report(RangeProgress {
                    month,
                    days_processed: index + 1,
                    days_in_window: fetch_window.day_count(),
                    month_done: index + 1 == fetch_window.day_count(),
                });
            }
        }

        if fetched.is_cacheable() {
            self.cache.set(&reference.id, month, fetched.days.clone()).await;
        }
        info!(
            %month,
            subject = %reference.id,
            resolved = fetched.days.len(),
            failed = fetched.failed_days.len(),
            cached = fetched.is_cacheable(),
            "month fetched"
        );
        fetched
    }
}
