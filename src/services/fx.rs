//! Hourly exchange-rate fetch and the cached-rate table.
//!
//! Rates come from the provider as USD-based quotes. AFN gets a fixed
//! −2.5% adjustment before persisting; no other quote is touched. Rows an
//! operator set by hand (`is_manual`) are never overwritten by the fetch.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use failsafe::futures::CircuitBreaker;
use failsafe::{backoff, failure_policy, Config as FailsafeConfig, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;

/// Fixed market adjustment applied to AFN quotes.
pub const AFN_ADJUSTMENT: f64 = -0.025;

pub const BASE_CURRENCY: &str = "USD";

#[derive(Error, Debug)]
pub enum FxError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("rate provider error: {0}")]
    ProviderError(String),
    #[error("circuit breaker open - rate provider unavailable")]
    CircuitBreakerOpen,
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    rates: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FxRate {
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
    pub is_manual: bool,
}

/// Apply the AFN-only adjustment to a fetched quote.
pub fn adjusted_rate(quote: &str, rate: f64) -> f64 {
    if quote == "AFN" {
        rate * (1.0 + AFN_ADJUSTMENT)
    } else {
        rate
    }
}

pub struct RateProviderClient {
    client: Client,
    base_url: String,
    app_id: String,
    circuit_breaker:
        StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>,
}

impl RateProviderClient {
    pub fn new(base_url: String, app_id: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::exponential(Duration::from_secs(10), Duration::from_secs(300));
        let policy = failure_policy::consecutive_failures(5, backoff);
        let circuit_breaker = FailsafeConfig::new().failure_policy(policy).build();

        Self {
            client,
            base_url,
            app_id,
            circuit_breaker,
        }
    }

    /// USD-based quotes from the provider, unadjusted.
    pub async fn latest(&self) -> Result<HashMap<String, f64>, FxError> {
        let url = format!(
            "{}/latest.json?app_id={}",
            self.base_url.trim_end_matches('/'),
            self.app_id
        );
        let client = self.client.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).send().await?;
                if !response.status().is_success() {
                    return Err(FxError::ProviderError(format!(
                        "status {}",
                        response.status()
                    )));
                }
                let body = response.json::<LatestRatesResponse>().await?;
                Ok(body.rates)
            })
            .await;

        match result {
            Ok(rates) => Ok(rates),
            Err(FailsafeError::Rejected) => Err(FxError::CircuitBreakerOpen),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

impl Clone for RateProviderClient {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            app_id: self.app_id.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
        }
    }
}

/// Upsert fetched quotes into the main database's rate cache.
///
/// Manual rows keep their operator-set value. Returns the number of rows
/// written. A feed without AFN is suspicious but not fatal.
pub async fn store_rates(
    pool: &PgPool,
    rates: &HashMap<String, f64>,
) -> Result<u64, sqlx::Error> {
    if !rates.contains_key("AFN") {
        tracing::warn!("rate feed is missing AFN");
    }

    let mut written = 0;
    for (quote, rate) in rates {
        let adjusted = adjusted_rate(quote, *rate);
        let result = sqlx::query(
            "INSERT INTO fx_current_rates (base, quote, rate, fetched_at, is_manual)
             VALUES ($1, $2, $3, NOW(), false)
             ON CONFLICT (base, quote)
             DO UPDATE SET rate = $3, fetched_at = NOW()
             WHERE fx_current_rates.is_manual = false",
        )
        .bind(BASE_CURRENCY)
        .bind(quote)
        .bind(adjusted)
        .execute(pool)
        .await?;
        written += result.rows_affected();
    }
    Ok(written)
}

/// Current cached rates, for the public endpoint.
pub async fn latest_rates(pool: &PgPool) -> Result<Vec<FxRate>, sqlx::Error> {
    sqlx::query_as::<_, FxRate>(
        "SELECT base, quote, rate, fetched_at, is_manual
         FROM fx_current_rates
         WHERE base = $1
         ORDER BY quote",
    )
    .bind(BASE_CURRENCY)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_applies_to_afn_only() {
        assert!((adjusted_rate("AFN", 100.0) - 97.5).abs() < 1e-9);
        assert!((adjusted_rate("EUR", 0.86) - 0.86).abs() < 1e-12);
        assert!((adjusted_rate("PKR", 280.0) - 280.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn latest_parses_provider_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest.json?app_id=test-app")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"base": "USD", "rates": {"AFN": 68.5, "EUR": 0.86}}"#)
            .create_async()
            .await;

        let client = RateProviderClient::new(server.url(), "test-app".to_string());
        let rates = client.latest().await.unwrap();
        assert_eq!(rates.len(), 2);
        assert!((rates["AFN"] - 68.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn latest_surfaces_provider_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/latest.json?app_id=test-app")
            .with_status(401)
            .create_async()
            .await;

        let client = RateProviderClient::new(server.url(), "test-app".to_string());
        assert!(matches!(
            client.latest().await,
            Err(FxError::ProviderError(_))
        ));
    }
}
