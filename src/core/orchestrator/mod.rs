//! Fetch Orchestrator
//!
//! Coordinates timeline requests for one consumer (a view, a CLI run).
//! Exactly one request is current at a time; issuing a new one supersedes
//! whatever is in flight.
//!
//! # Architecture
//!
//! ```text
//! request_*() ─► generation N ─► spawned task ─► fetch month/day ─┐
//!      │                                                         │
//!      └─ reset state, cancel N-1                publish if N is current
//!                                                                ▼
//!                                             watch::Sender<TimelineState>
//! ```
//!
//! # Race safety
//!
//! - Generation ids are assigned under the state channel's lock.
//! - Every publication re-checks the generation under that same lock, so a
//!   stale task can never overwrite a newer request's state.
//! - Each generation owns a cancellation token (child of the orchestrator's
//!   root token). Cancellation is cooperative: in-flight oracle calls run
//!   to completion and their results are dropped.
//! - Detaching (or dropping) the orchestrator cancels the root token and
//!   blocks every later publication.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::calendar::DateWindow;
use super::fetch::{EphemerisFetcher, RangeFetcher};
use super::models::{CalculationOptions, EphemerisDay, Progress, Subject, TransitDayData};

// =============================================================================
// Published State
// =============================================================================

/// Lifecycle of the current request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Fetching,
    Settled,
    /// Nothing resolved, or the result failed validation. Retry by issuing a new request.
    Failed { message: String },
}

/// Everything a consumer renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineState {
    pub generation: u64,
    pub phase: Phase,
    /// Months for transit timelines, days for ephemeris timelines
    pub progress: Progress,
    pub transits: Vec<TransitDayData>,
    pub ephemeris: Vec<EphemerisDay>,
}

impl TimelineState {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Fetching
    }
}

/// How a generation ended, as seen by the caller that issued it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Settled { days: usize },
    /// A newer request (or a detach) took over; nothing more was published
    Superseded,
    Failed { message: String },
}

/// Handle to one issued request
#[derive(Debug)]
pub struct FetchHandle {
    generation: u64,
    task: JoinHandle<GenerationOutcome>,
}

impl FetchHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the generation to end
    pub async fn outcome(self) -> GenerationOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => GenerationOutcome::Failed {
                message: e.to_string(),
            },
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Transits of `subject` to `reference` over `window`
#[derive(Debug, Clone, PartialEq)]
pub struct TransitRequest {
    pub subject: Subject,
    pub reference: Subject,
    pub window: DateWindow,
    pub options: CalculationOptions,
}

/// Raw-sky ephemeris over `window`
#[derive(Debug, Clone, PartialEq)]
pub struct EphemerisRequest {
    pub window: DateWindow,
    pub options: CalculationOptions,
}

#[derive(Debug, Clone)]
enum LastRequest {
    Transits(TransitRequest),
    Ephemeris(EphemerisRequest),
}

// =============================================================================
// Orchestrator
// =============================================================================

struct Inner {
    state: watch::Sender<TimelineState>,
    /// Token of the current generation
    current: Mutex<CancellationToken>,
    last: Mutex<Option<LastRequest>>,
    /// Cancelled on detach; parent of every generation token
    mounted: CancellationToken,
}

impl Inner {
    /// Apply `update` only if `generation` is still current and we are attached.
    fn publish(&self, generation: u64, update: impl FnOnce(&mut TimelineState)) -> bool {
        let mounted = &self.mounted;
        self.state.send_if_modified(|state| {
            if state.generation != generation || mounted.is_cancelled() {
                return false;
            }
            update(state);
            true
        })
    }

    /// Start a new generation: cancel the old one, reset state.
    fn begin(&self, total: usize) -> (u64, CancellationToken) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.cancel();
        let token = self.mounted.child_token();
        *current = token.clone();

        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = state.generation + 1;
            *state = TimelineState {
                generation,
                phase: Phase::Fetching,
                progress: Progress::reset(total),
                transits: Vec::new(),
                ephemeris: Vec::new(),
            };
        });
        (generation, token)
    }
}

/// Top-level timeline controller
pub struct FetchOrchestrator {
    range: RangeFetcher,
    ephemeris: EphemerisFetcher,
    inner: Arc<Inner>,
}

impl FetchOrchestrator {
    pub fn new(range: RangeFetcher, ephemeris: EphemerisFetcher) -> Self {
        let (state, _) = watch::channel(TimelineState::default());
        Self {
            range,
            ephemeris,
            inner: Arc::new(Inner {
                state,
                current: Mutex::new(CancellationToken::new()),
                last: Mutex::new(None),
                mounted: CancellationToken::new(),
            }),
        }
    }

    /// Receiver for state changes
    pub fn subscribe(&self) -> watch::Receiver<TimelineState> {
        self.inner.state.subscribe()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> TimelineState {
        self.inner.state.borrow().clone()
    }

    pub fn is_detached(&self) -> bool {
        self.inner.mounted.is_cancelled()
    }

    /// Stop all work and never publish again.
    pub fn detach(&self) {
        if !self.inner.mounted.is_cancelled() {
            info!("orchestrator detached");
        }
        self.inner.mounted.cancel();
    }

    /// Issue a transit timeline request. Must be called inside a Tokio runtime.
    pub fn request_transits(&self, request: TransitRequest) -> FetchHandle {
        self.remember(LastRequest::Transits(request.clone()));
        if self.is_detached() {
            return Self::superseded();
        }

        let months = request.window.months();
        let (generation, token) = self.inner.begin(months.len());
        info!(
            generation,
            window = %request.window,
            months = months.len(),
            "transit request issued"
        );

        let range = self.range.clone();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let mut visible: Vec<TransitDayData> = Vec::new();
            for (index, month) in months.into_iter().enumerate() {
                if token.is_cancelled() {
                    return GenerationOutcome::Superseded;
                }
                let fetched = range
                    .fetch_month(
                        &request.subject,
                        &request.reference,
                        month,
                        &request.window,
                        &request.options,
                        None,
                        &token,
                    )
                    .await;
                if token.is_cancelled() {
                    debug!(generation, %month, "discarding month from superseded generation");
                    return GenerationOutcome::Superseded;
                }

                visible.extend(request.window.retain(fetched.days, TransitDayData::day));
                let published = inner.publish(generation, |state| {
                    state.transits = visible.clone();
                    state.progress.loaded = index + 1;
                });
                if !published {
                    return GenerationOutcome::Superseded;
                }
            }

            if visible.is_empty() {
                Self::fail(&inner, generation, format!("no days resolved for {}", request.window))
            } else {
                Self::settle(&inner, generation, visible.len())
            }
        });

        FetchHandle { generation, task }
    }

    /// Issue a raw-sky ephemeris request. Must be called inside a Tokio runtime.
    pub fn request_ephemeris(&self, request: EphemerisRequest) -> FetchHandle {
        self.remember(LastRequest::Ephemeris(request.clone()));
        if self.is_detached() {
            return Self::superseded();
        }

        let (generation, token) = self.inner.begin(request.window.day_count());
        info!(generation, window = %request.window, "ephemeris request issued");

        let fetcher = self.ephemeris.clone();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let sink = |batch: &[EphemerisDay], progress: Progress| {
                inner.publish(generation, |state| {
                    state.ephemeris.extend_from_slice(batch);
                    state.progress = progress;
                });
            };
            let result = fetcher
                .fetch_ephemeris_until(&request.window, &request.options, Some(&sink), &token)
                .await;
            if token.is_cancelled() {
                return GenerationOutcome::Superseded;
            }

            match result {
                Ok(days) => {
                    let count = days.len();
                    let published = inner.publish(generation, |state| {
                        state.ephemeris = days;
                        state.progress.loaded = state.progress.total;
                    });
                    if !published {
                        return GenerationOutcome::Superseded;
                    }
                    Self::settle(&inner, generation, count)
                }
                Err(e) => Self::fail(&inner, generation, e.to_string()),
            }
        });

        FetchHandle { generation, task }
    }

    /// Re-issue the most recent request, if any
    pub fn retry(&self) -> Option<FetchHandle> {
        let last = self
            .inner
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some(match last {
            LastRequest::Transits(request) => self.request_transits(request),
            LastRequest::Ephemeris(request) => self.request_ephemeris(request),
        })
    }

    fn remember(&self, request: LastRequest) {
        *self.inner.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(request);
    }

    fn superseded() -> FetchHandle {
        FetchHandle {
            generation: 0,
            task: tokio::spawn(async { GenerationOutcome::Superseded }),
        }
    }

    fn settle(inner: &Inner, generation: u64, days: usize) -> GenerationOutcome {
        if inner.publish(generation, |state| state.phase = Phase::Settled) {
            info!(generation, days, "generation settled");
            GenerationOutcome::Settled { days }
        } else {
            GenerationOutcome::Superseded
        }
    }

    fn fail(inner: &Inner, generation: u64, message: String) -> GenerationOutcome {
        let phase = Phase::Failed {
            message: message.clone(),
        };
        if inner.publish(generation, |state| state.phase = phase) {
            warn!(generation, %message, "generation failed");
            GenerationOutcome::Failed { message }
        } else {
            GenerationOutcome::Superseded
        }
    }
}

impl Drop for FetchOrchestrator {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{CachePolicy, EphemerisCache, MonthCache};
    use crate::core::client::MockCalculationClient;
    use crate::core::error::TransitError;
    use crate::core::models::EnrichedSubject;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn orchestrator(client: MockCalculationClient) -> FetchOrchestrator {
        let client = Arc::new(client);
        let range = RangeFetcher::new(client.clone(), MonthCache::in_memory(CachePolicy::default()))
            .with_pacing(Duration::ZERO);
        let ephemeris = EphemerisFetcher::new(
            client,
            EphemerisCache::in_memory(CachePolicy::default()),
            Subject::greenwich_observer(),
        );
        FetchOrchestrator::new(range, ephemeris)
    }

    fn transit_request(from: NaiveDate, to: NaiveDate) -> TransitRequest {
        TransitRequest {
            subject: Subject::greenwich_observer(),
            reference: Subject::greenwich_observer(),
            window: DateWindow::new(from, to).unwrap(),
            options: CalculationOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_transit_request_settles_with_progress() {
        let mut client = MockCalculationClient::new();
        client.expect_transit_day().returning(|_, _, instant, _| {
            Ok(TransitDayData {
                date: instant,
                transit_subject: EnrichedSubject::default(),
                aspects: Vec::new(),
                house_comparison: Default::default(),
            })
        });
        let orchestrator = orchestrator(client);

        let handle =
            orchestrator.request_transits(transit_request(day(2025, 1, 30), day(2025, 2, 2)));
        assert_eq!(handle.generation(), 1);
        assert_eq!(handle.outcome().await, GenerationOutcome::Settled { days: 4 });

        let state = orchestrator.state();
        assert_eq!(state.phase, Phase::Settled);
        assert_eq!(state.progress, Progress { loaded: 2, total: 2 });
        assert_eq!(state.transits.first().unwrap().day(), day(2025, 1, 30));
    }

    #[tokio::test]
    async fn test_all_days_failing_is_failed_phase() {
        let mut client = MockCalculationClient::new();
        client
            .expect_transit_day()
            .returning(|_, _, _, _| Err(TransitError::transport("refused")));
        let orchestrator = orchestrator(client);

        let outcome = orchestrator
            .request_transits(transit_request(day(2025, 1, 1), day(2025, 1, 3)))
            .outcome()
            .await;
        assert!(matches!(outcome, GenerationOutcome::Failed { .. }));
        assert!(matches!(orchestrator.state().phase, Phase::Failed { .. }));
        assert!(!orchestrator.state().is_loading());
    }

    #[tokio::test]
    async fn test_detached_orchestrator_ignores_requests() {
        let mut client = MockCalculationClient::new();
        client.expect_transit_day().times(0);
        let orchestrator = orchestrator(client);
        orchestrator.detach();

        let outcome = orchestrator
            .request_transits(transit_request(day(2025, 1, 1), day(2025, 1, 3)))
            .outcome()
            .await;
        assert_eq!(outcome, GenerationOutcome::Superseded);
        assert_eq!(orchestrator.state(), TimelineState::default());
    }

    #[tokio::test]
    async fn test_retry_without_request_is_none() {
        let orchestrator = orchestrator(MockCalculationClient::new());
        assert!(orchestrator.retry().is_none());
    }

    #[test]
    fn test_phase_serializes_tagged() {
        let json = serde_json::to_value(Phase::Failed { message: "x".to_string() }).unwrap();
        assert_eq!(json["phase"], "failed");
        assert_eq!(json["message"], "x");
    }
}
