//! Price tape source used by the finalize cycle.
//!
//! The oracle is an external service. [`HttpPriceTape`] talks to it as
//!
//! ```text
//! GET {base}/tape?pair=ETH/USD&from=<start_block>&to=<end_block>
//! -> { "ticks": ["<decimal>", ...] }
//! ```

use alloy::primitives::U256;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum PriceTapeError {
    #[error("No price oracle configured")]
    NotConfigured,
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Oracle returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("Invalid tick '{0}'")]
    InvalidTick(String),
}

/// Produces the ordered tick sequence for an asset pair over a block range.
#[async_trait]
pub trait PriceTapeSource: Send + Sync {
    async fn build_tape(
        &self,
        asset_pair: &str,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<U256>, PriceTapeError>;
}

/// Source used when no oracle URL is configured. Always fails, which the
/// finalize cycle treats like any other best-effort tape failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledPriceTape;

#[async_trait]
impl PriceTapeSource for DisabledPriceTape {
    async fn build_tape(&self, _: &str, _: u64, _: u64) -> Result<Vec<U256>, PriceTapeError> {
        Err(PriceTapeError::NotConfigured)
    }
}

#[derive(Debug, Deserialize)]
struct TapeResponse {
    ticks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HttpPriceTape {
    client: Client,
    base_url: Url,
}

impl HttpPriceTape {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PriceTapeError> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder().use_rustls_tls().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl PriceTapeSource for HttpPriceTape {
    async fn build_tape(
        &self,
        asset_pair: &str,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<U256>, PriceTapeError> {
        let url = self.base_url.join("tape")?;
        let response = self
            .client
            .get(url)
            .query(&[
                ("pair", asset_pair.to_owned()),
                ("from", start_block.to_string()),
                ("to", end_block.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceTapeError::Status(status));
        }

        let body: TapeResponse = response.json().await?;
        let ticks = body
            .ticks
            .into_iter()
            .map(|tick| tick.parse::<U256>().map_err(|_| PriceTapeError::InvalidTick(tick)))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(target: "arena_keeper::price_tape", asset_pair, start_block, end_block, ticks = ticks.len(), "Built price tape");
        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock,
        MockServer,
        ResponseTemplate,
        matchers::{
            method,
            path,
            query_param,
        },
    };

    fn client(server: &MockServer) -> HttpPriceTape {
        HttpPriceTape::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_ticks_for_range() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tape"))
            .and(query_param("pair", "ETH/USD"))
            .and(query_param("from", "100"))
            .and(query_param("to", "200"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ticks": ["3000", "3001", "2999"] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tape = client(&server).build_tape("ETH/USD", 100, 200).await.unwrap();
        assert_eq!(tape, vec![U256::from(3000), U256::from(3001), U256::from(2999)]);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_empty_tape_is_returned_as_is() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ticks": [] })))
            .mount(&server)
            .await;

        assert!(client(&server).build_tape("ETH/USD", 1, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).build_tape("ETH/USD", 1, 2).await.unwrap_err();
        assert!(matches!(err, PriceTapeError::Status(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_bad_tick_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ticks": ["1", "oops"] })))
            .mount(&server)
            .await;

        let err = client(&server).build_tape("ETH/USD", 1, 2).await.unwrap_err();
        assert!(matches!(err, PriceTapeError::InvalidTick(t) if t == "oops"));
    }

    #[tokio::test]
    async fn test_disabled_source_fails() {
        assert!(matches!(
            DisabledPriceTape.build_tape("ETH/USD", 1, 2).await,
            Err(PriceTapeError::NotConfigured)
        ));
    }
}
