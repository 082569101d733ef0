//! Shared fixtures for integration tests: a scripted calculation oracle.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use voyager_transits::core::{
    Aspect, CalculationClient, CalculationOptions, EnrichedSubject, EphemerisDay, PointPosition,
    Result, Subject, TransitDayData, TransitError,
};

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn natal(id: &str) -> Subject {
    Subject {
        id: id.to_string(),
        name: "Ada".to_string(),
        year: 1990,
        month: 6,
        day: 15,
        hour: 8,
        minute: 30,
        latitude: 41.9,
        longitude: 12.5,
        timezone: "Europe/Rome".to_string(),
        zodiac_type: Some("Tropic".to_string()),
        sidereal_mode: None,
        houses_system: Some("P".to_string()),
    }
}

/// Oracle with configurable failures and latency that records every call.
pub struct ScriptedClient {
    delay: Duration,
    failing: Mutex<HashSet<NaiveDate>>,
    invalid_longitude: bool,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requested: Mutex<Vec<NaiveDate>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            failing: Mutex::new(HashSet::new()),
            invalid_longitude: false,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(self, days: &[NaiveDate]) -> Self {
        self.failing.lock().unwrap().extend(days.iter().copied());
        self
    }

    /// Ephemeris days report an out-of-range longitude
    pub fn with_invalid_longitude(mut self) -> Self {
        self.invalid_longitude = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<NaiveDate> {
        self.requested.lock().unwrap().clone()
    }

    async fn call(&self, instant: DateTime<Utc>) -> Result<()> {
        let day = instant.date_naive();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(day);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(&day) {
            return Err(TransitError::Timeout { after_ms: 15_000 });
        }
        Ok(())
    }
}

fn positions(instant: DateTime<Utc>, abs_pos: f64) -> EnrichedSubject {
    EnrichedSubject {
        name: format!("sky {}", instant.date_naive()),
        points: vec![PointPosition {
            name: "Sun".to_string(),
            sign: "Cap".to_string(),
            position: abs_pos % 30.0,
            abs_pos,
            house: None,
            retrograde: Some(false),
        }],
    }
}

#[async_trait]
impl CalculationClient for ScriptedClient {
    async fn transit_day(
        &self,
        _subject: &Subject,
        _reference: &Subject,
        instant: DateTime<Utc>,
        _options: &CalculationOptions,
    ) -> Result<TransitDayData> {
        self.call(instant).await?;
        let ordinal = instant.ordinal() as f64;
        Ok(TransitDayData {
            date: instant,
            transit_subject: positions(instant, ordinal % 360.0),
            aspects: vec![
                Aspect::new("Sun", "Moon", "trine", ordinal % 7.0),
                Aspect::new("Jupiter", "Saturn", "square", 0.5),
            ],
            house_comparison: Default::default(),
        })
    }

    async fn ephemeris_day(
        &self,
        _subject: &Subject,
        instant: DateTime<Utc>,
        _options: &CalculationOptions,
    ) -> Result<EphemerisDay> {
        self.call(instant).await?;
        let abs_pos = if self.invalid_longitude {
            400.0
        } else {
            instant.ordinal() as f64 % 360.0
        };
        Ok(EphemerisDay {
            date: instant,
            subject: positions(instant, abs_pos),
        })
    }
}
