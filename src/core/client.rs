//! Calculation Client
//!
//! Thin wrapper around the external calculation oracle. One call computes
//! one instant. The oracle is slow and rate limited, so callers drive it
//! sequentially and treat every failure here as day-level.
//!
//! # Wire format
//!
//! Both endpoints accept a JSON body and answer with an envelope:
//!
//! ```text
//! { "status": "OK", "data": { ... } }
//! ```
//!
//! Anything other than `"OK"` is an [`TransitError::OracleStatus`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use super::error::{Result, TransitError};
use super::models::{
    Aspect, CalculationOptions, DistributionMethod, EnrichedSubject, EphemerisDay,
    HouseComparison, Subject, TransitDayData,
};

/// Path of the transit endpoint, relative to the oracle base URL
pub const TRANSIT_ENDPOINT: &str = "/api/v4/transit-aspects-data";

/// Path of the single-subject endpoint
pub const SUBJECT_ENDPOINT: &str = "/api/v4/subject-data";

/// Status value the oracle uses for success
pub const STATUS_OK: &str = "OK";

/// Per-instant calculation oracle
///
/// Implementations enforce their own per-call timeout. Every error they
/// return is expected to satisfy [`TransitError::is_day_level`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CalculationClient: Send + Sync {
    /// Positions of `subject` moved to `instant`, with aspects to `reference`
    async fn transit_day(
        &self,
        subject: &Subject,
        reference: &Subject,
        instant: DateTime<Utc>,
        options: &CalculationOptions,
    ) -> Result<TransitDayData>;

    /// Positions of `subject` moved to `instant`
    async fn ephemeris_day(
        &self,
        subject: &Subject,
        instant: DateTime<Utc>,
        options: &CalculationOptions,
    ) -> Result<EphemerisDay>;
}

// =============================================================================
// Wire Types
// =============================================================================

/// Request body for the transit endpoint
#[derive(Debug, Serialize)]
pub struct TransitQuery<'a> {
    pub first_subject: &'a Subject,
    pub transit_subject: Subject,
    #[serde(flatten)]
    pub options: OptionsPayload<'a>,
}

/// Request body for the single-subject endpoint
#[derive(Debug, Serialize)]
pub struct SubjectQuery<'a> {
    pub subject: Subject,
    #[serde(flatten)]
    pub options: OptionsPayload<'a>,
}

/// Options as the oracle expects them; empty lists are omitted
#[derive(Debug, Serialize)]
pub struct OptionsPayload<'a> {
    #[serde(skip_serializing_if = "is_empty_list")]
    pub active_points: &'a [String],
    #[serde(skip_serializing_if = "is_empty_list")]
    pub active_aspects: &'a [String],
    pub distribution_method: DistributionMethod,
    #[serde(skip_serializing_if = "is_empty_weights")]
    pub custom_distribution_weights: &'a BTreeMap<String, f64>,
}

fn is_empty_list(list: &&[String]) -> bool {
    list.is_empty()
}

fn is_empty_weights(weights: &&BTreeMap<String, f64>) -> bool {
    weights.is_empty()
}

impl<'a> From<&'a CalculationOptions> for OptionsPayload<'a> {
    fn from(options: &'a CalculationOptions) -> Self {
        Self {
            active_points: &options.active_points,
            active_aspects: &options.active_aspects,
            distribution_method: options.distribution_method,
            custom_distribution_weights: &options.custom_distribution_weights,
        }
    }
}

/// Response envelope shared by both endpoints
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Unwrap the payload, mapping a non-OK status to an error
    pub fn into_data(self) -> Result<T> {
        if self.status != STATUS_OK {
            return Err(TransitError::OracleStatus {
                status: self.status,
                message: self.message.unwrap_or_default(),
            });
        }
        self.data
            .ok_or_else(|| TransitError::transport("OK response without data"))
    }
}

/// Payload of a transit response
#[derive(Debug, Deserialize)]
pub struct TransitPayload {
    pub transit_subject: EnrichedSubject,
    #[serde(default)]
    pub aspects: Vec<Aspect>,
    #[serde(default)]
    pub house_comparison: Option<HouseComparison>,
}

/// Payload of a single-subject response
#[derive(Debug, Deserialize)]
pub struct SubjectPayload {
    pub subject: EnrichedSubject,
}

/// Decode a transit response body
pub fn decode_transit(body: &str, instant: DateTime<Utc>) -> Result<TransitDayData> {
    let payload = serde_json::from_str::<Envelope<TransitPayload>>(body)?.into_data()?;
    Ok(TransitDayData {
        date: instant,
        transit_subject: payload.transit_subject,
        aspects: payload.aspects,
        house_comparison: payload.house_comparison.unwrap_or_default(),
    })
}

/// Decode a single-subject response body
pub fn decode_subject(body: &str, instant: DateTime<Utc>) -> Result<EphemerisDay> {
    let payload = serde_json::from_str::<Envelope<SubjectPayload>>(body)?.into_data()?;
    Ok(EphemerisDay {
        date: instant,
        subject: payload.subject,
    })
}

// =============================================================================
// HTTP Client
// =============================================================================

#[cfg(feature = "http")]
pub use http::HttpCalculationClient;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use tracing::debug;

    use super::*;
    use crate::core::config::ObservatoryConfig;

    /// [`CalculationClient`] backed by the oracle's HTTP API
    #[derive(Debug, Clone)]
    pub struct HttpCalculationClient {
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    }

    impl HttpCalculationClient {
        pub fn new(config: &ObservatoryConfig) -> Result<Self> {
            let http = reqwest::Client::builder()
                .timeout(config.request_timeout())
                .build()
                .map_err(|e| TransitError::transport(e.to_string()))?;
            Ok(Self {
                http,
                base_url: config.oracle_url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                timeout: config.request_timeout(),
            })
        }

        fn map_error(&self, error: reqwest::Error) -> TransitError {
            if error.is_timeout() {
                TransitError::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                }
            } else {
                TransitError::transport(error.to_string())
            }
        }

        async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<String> {
            let url = format!("{}{}", self.base_url, path);
            debug!(%url, "oracle call");

            let mut request = self.http.post(&url).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request.send().await.map_err(|e| self.map_error(e))?;
            let status = response.status();
            let text = response.text().await.map_err(|e| self.map_error(e))?;
            if !status.is_success() {
                return Err(TransitError::OracleStatus {
                    status: status.as_u16().to_string(),
                    message: text.chars().take(200).collect(),
                });
            }
            Ok(text)
        }
    }

    #[async_trait]
    impl CalculationClient for HttpCalculationClient {
        async fn transit_day(
            &self,
            subject: &Subject,
            reference: &Subject,
            instant: DateTime<Utc>,
            options: &CalculationOptions,
        ) -> Result<TransitDayData> {
            let body = TransitQuery {
                first_subject: reference,
                transit_subject: subject.at_instant(instant),
                options: options.into(),
            };
            let text = self.post(TRANSIT_ENDPOINT, &body).await?;
            decode_transit(&text, instant)
        }

        async fn ephemeris_day(
            &self,
            subject: &Subject,
            instant: DateTime<Utc>,
            options: &CalculationOptions,
        ) -> Result<EphemerisDay> {
            let body = SubjectQuery {
                subject: subject.at_instant(instant),
                options: options.into(),
            };
            let text = self.post(SUBJECT_ENDPOINT, &body).await?;
            decode_subject(&text, instant)
        }
    }
}
