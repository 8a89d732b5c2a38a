use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::models::{Deal, DealId, DealStatus};
use super::provider::StatusProvider;
use crate::error::{AppResult, StatusError};
use crate::jobs::ContentAddress;

/// Response body of `GET /status/{cid}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct W3sStatus {
    #[serde(default)]
    deals: Vec<W3sDeal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct W3sDeal {
    deal_id: u64,
    #[serde(default)]
    data_model_selector: String,
    status: String,
    #[serde(default)]
    activation: Option<DateTime<Utc>>,
}

impl From<W3sDeal> for Deal {
    fn from(raw: W3sDeal) -> Self {
        Deal {
            deal_id: DealId(raw.deal_id),
            selector_path: raw.data_model_selector,
            status: DealStatus::parse(&raw.status),
            activation: raw.activation,
        }
    }
}

/// web3.storage status API client
pub struct W3sStatusProvider {
    base_url: String,
    token: String,
    client: Client,
}

impl W3sStatusProvider {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }
}

#[async_trait]
impl StatusProvider for W3sStatusProvider {
    fn name(&self) -> &'static str {
        "web3.storage"
    }

    async fn deal_status(&self, content_address: &ContentAddress) -> AppResult<Vec<Deal>> {
        let cid = content_address.to_cid_string()?;
        let url = format!("{}/status/{}", self.base_url, cid);
        debug!("Fetching deal status: {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| StatusError::Transport {
                cid: cid.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::HttpStatus {
                cid,
                status: status.as_u16(),
            }
            .into());
        }

        let body = response.text().await.map_err(|source| StatusError::Transport {
            cid: cid.clone(),
            source,
        })?;

        let parsed: W3sStatus = serde_json::from_str(&body).map_err(|e| StatusError::Decode {
            cid: cid.clone(),
            message: e.to_string(),
        })?;

        let deals: Vec<Deal> = parsed.deals.into_iter().map(Deal::from).collect();
        info!("📦 {} deal(s) reported for {}", deals.len(), cid);
        Ok(deals)
    }
}
