/// Market metadata client (Gamma-style REST API)
///
/// Serves live liquidity lookups for the signal detector and market
/// discovery by event slug. Responses are JSON with numbers that
/// sometimes arrive as strings; decoding is tolerant of both.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::Sources;
use crate::datasources::{de_opt_f64_flexible, status_error, SourceError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaEvent {
    #[serde(default)]
    pub id: Option<String>,

    pub slug: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GammaMarket {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub question: Option<String>,

    #[serde(rename = "conditionId")]
    pub condition_id: String,

    pub slug: String,

    #[serde(default)]
    pub outcomes: Option<serde_json::Value>,

    #[serde(rename = "outcomePrices", default)]
    pub outcome_prices: Option<serde_json::Value>,

    #[serde(default, deserialize_with = "de_opt_f64_flexible")]
    pub volume: Option<f64>,

    #[serde(default, deserialize_with = "de_opt_f64_flexible")]
    pub liquidity: Option<f64>,

    #[serde(default)]
    pub active: Option<bool>,

    #[serde(default)]
    pub closed: Option<bool>,
}

pub struct GammaClient {
    http: reqwest::Client,
    base_url: String,
}

impl GammaClient {
    pub fn new(sources: &Sources) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(sources.http_timeout_secs))
            .build()
            .expect("failed to build market metadata HTTP client");

        Self {
            http,
            base_url: sources
                .market_metadata_base_url
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Fetch the event wrapping one or more markets by slug
    #[instrument(skip(self))]
    pub async fn get_event_by_slug(&self, slug: &str) -> Result<Option<GammaEvent>, SourceError> {
        let url = format!("{}/events/slug/{}", self.base_url, slug);
        let response = self.http.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }
        let event = response
            .json::<GammaEvent>()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(Some(event))
    }

    /// Live USD liquidity for one market, resolved through its event
    /// slug. None when the market cannot be found.
    #[instrument(skip(self))]
    pub async fn get_live_liquidity(
        &self,
        slug: &str,
        condition_id: &str,
    ) -> Result<Option<f64>, SourceError> {
        let Some(event) = self.get_event_by_slug(slug).await? else {
            return Ok(None);
        };

        let liquidity = event
            .markets
            .iter()
            .find(|market| market.condition_id == condition_id)
            .or_else(|| event.markets.first())
            .and_then(|market| market.liquidity);

        debug!(?liquidity, "live liquidity lookup");
        Ok(liquidity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_decoding_with_string_numbers() {
        let raw = r#"{
            "id": "123",
            "slug": "election-2026",
            "title": "Election 2026",
            "markets": [{
                "id": "m1",
                "question": "Will X win?",
                "conditionId": "0xcond",
                "slug": "will-x-win",
                "outcomes": "[\"Yes\",\"No\"]",
                "outcomePrices": "[\"0.03\",\"0.97\"]",
                "volume": "150000.5",
                "liquidity": 42000,
                "active": true,
                "closed": false
            }]
        }"#;
        let event: GammaEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.markets.len(), 1);
        let market = &event.markets[0];
        assert_eq!(market.volume, Some(150_000.5));
        assert_eq!(market.liquidity, Some(42_000.0));
        assert_eq!(market.condition_id, "0xcond");
    }

    #[test]
    fn test_event_with_missing_fields() {
        let raw = r#"{"slug": "x", "markets": [{"conditionId": "0xc", "slug": "x-m"}]}"#;
        let event: GammaEvent = serde_json::from_str(raw).unwrap();
        assert!(event.markets[0].liquidity.is_none());
        assert!(event.markets[0].active.is_none());
    }
}
