//! Ephemeris Fetcher
//!
//! Single-subject analogue of the range fetcher, for raw-sky timelines. The
//! subject is a fixed observer, so the cache is keyed by the window alone.
//!
//! Unlike transit ranges, an assembled ephemeris is all-or-nothing: it is
//! validated before it is cached or returned, and a validation failure is
//! an error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::cache::EphemerisCache;
use crate::core::calendar::DateWindow;
use crate::core::client::CalculationClient;
use crate::core::config::{DEFAULT_EPHEMERIS_BATCH_DELAY_MS, DEFAULT_EPHEMERIS_BATCH_SIZE};
use crate::core::error::{Result, TransitError};
use crate::core::models::{day_instant, CalculationOptions, EphemerisDay, Progress, Subject};

/// Progress sink for ephemeris fetches: newly available days plus day counts
pub type EphemerisProgressFn<'a> = dyn Fn(&[EphemerisDay], Progress) + Send + Sync + 'a;

/// Day-by-day raw-sky fetcher
#[derive(Clone)]
pub struct EphemerisFetcher {
    client: Arc<dyn CalculationClient>,
    cache: EphemerisCache,
    observer: Subject,
    batch_size: usize,
    batch_delay: Duration,
}

impl EphemerisFetcher {
    pub fn new(
        client: Arc<dyn CalculationClient>,
        cache: EphemerisCache,
        observer: Subject,
    ) -> Self {
        Self {
            client,
            cache,
            observer,
            batch_size: DEFAULT_EPHEMERIS_BATCH_SIZE,
            batch_delay: Duration::from_millis(DEFAULT_EPHEMERIS_BATCH_DELAY_MS),
        }
    }

    /// How cache hits are streamed to the progress sink
    pub fn with_batching(mut self, batch_size: usize, batch_delay: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_delay = batch_delay;
        self
    }

    pub fn observer(&self) -> &Subject {
        &self.observer
    }

    pub fn cache(&self) -> &EphemerisCache {
        &self.cache
    }

    pub async fn fetch_ephemeris(
        &self,
        window: &DateWindow,
        options: &CalculationOptions,
        progress: Option<&EphemerisProgressFn<'_>>,
    ) -> Result<Vec<EphemerisDay>> {
        self.fetch_ephemeris_until(window, options, progress, &CancellationToken::new())
            .await
    }

    /// Fetch one record per day of `window`.
    ///
    /// A cancelled fetch returns what it has without validating or caching it.
    pub async fn fetch_ephemeris_until(
        &self,
        window: &DateWindow,
        options: &CalculationOptions,
        progress: Option<&EphemerisProgressFn<'_>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<EphemerisDay>> {
        if let Some(days) = self.cache.get(window).await {
            self.stream_hit(&days, progress, cancel).await;
            return Ok(days);
        }

        let total = window.day_count();
        let mut days = Vec::with_capacity(total);
        for (index, day) in window.days().enumerate() {
            if cancel.is_cancelled() {
                debug!(%window, "ephemeris fetch cancelled");
                return Ok(days);
            }
            match self
                .client
                .ephemeris_day(&self.observer, day_instant(day), options)
                .await
            {
                Ok(record) => {
                    if let Some(report) = progress {
                        report(
                            std::slice::from_ref(&record),
                            Progress { loaded: index + 1, total },
                        );
                    }
                    days.push(record);
                }
                Err(e) => {
                    warn!(%day, error = %e, "skipping failed ephemeris day");
                    if let Some(report) = progress {
                        report(&[], Progress { loaded: index + 1, total });
                    }
                }
            }
        }

        validate_ephemeris(window, &days)?;
        if days.len() == total {
            self.cache.set(window, days.clone()).await;
        }
        info!(%window, resolved = days.len(), total, "ephemeris fetched");
        Ok(days)
    }

    /// Replay a cache hit in fixed-size batches.
    async fn stream_hit(
        &self,
        days: &[EphemerisDay],
        progress: Option<&EphemerisProgressFn<'_>>,
        cancel: &CancellationToken,
    ) {
        let Some(report) = progress else {
            return;
        };
        let total = days.len();
        let mut loaded = 0;
        for (index, batch) in days.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                return;
            }
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            loaded += batch.len();
            report(batch, Progress { loaded, total });
        }
    }
}

/// Structural check of an assembled ephemeris.
///
/// Requires at least one day, strictly ascending dates inside `window`, and
/// every point at a finite longitude in `[0, 360)`.
pub fn validate_ephemeris(window: &DateWindow, days: &[EphemerisDay]) -> Result<()> {
    if days.is_empty() {
        return Err(TransitError::validation(format!("no days resolved for {window}")));
    }
    let mut previous = None;
    for record in days {
        let day = record.day();
        if !window.contains(day) {
            return Err(TransitError::validation(format!("{day} outside {window}")));
        }
        if previous.is_some_and(|p| p >= day) {
            return Err(TransitError::validation(format!("{day} out of order")));
        }
        previous = Some(day);

        for point in &record.subject.points {
            if !point.abs_pos.is_finite() || !(0.0..360.0).contains(&point.abs_pos) {
                return Err(TransitError::validation(format!(
                    "{} on {day} has longitude {}",
                    point.name, point.abs_pos
                )));
            }
        }
    }
    Ok(())
}
