use anyhow::{Context, Result};
use lexicon::{flatten_records, PlayEvent, ProviderResponse};

use crate::period::DateRange;

/// HTTP client for the service that stores radio plays.
#[derive(Debug, Clone)]
pub struct PlayProvider {
    client: reqwest::Client,
    base_url: String,
}

impl PlayProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch every play inside `range`, flattened to one event per record.
    pub async fn fetch_plays(&self, range: &DateRange) -> Result<Vec<PlayEvent>> {
        let (start, end) = range.query_bounds();
        let url = format!("{}/api/artist-plays", self.base_url);

        tracing::info!("fetching plays for {}", range);
        let response = self
            .client
            .get(&url)
            .query(&[("start", start.as_str()), ("end", end.as_str())])
            .send()
            .await
            .context("failed to reach play provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("play provider returned {}: {}", status, body);
        }

        let envelope: ProviderResponse = response
            .json()
            .await
            .context("failed to decode play provider response")?;
        let records = envelope
            .into_result()
            .map_err(|e| anyhow::anyhow!("play provider error: {}", e))?;

        let events = flatten_records(records);
        tracing::info!("received {} play events for {}", events.len(), range);
        Ok(events)
    }
}
