//! HTTP implementation of the [`Upstream`] capability.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::{
    sync::Semaphore,
    time::{self, Instant},
};
use tracing::debug;

use crate::{attempt::Upstream, config::UpstreamConfig, errors::AttemptError};

/// Fetches one URL with a client shared by every race in the process.
///
/// reqwest does not cap the total number of connections, so in-flight
/// requests are bounded by a semaphore; waiting for a permit counts against
/// the attempt's timeout and running out of time there is a pool timeout.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
    url: String,
    permits: Arc<Semaphore>,
}

impl HttpUpstream {
    pub fn new(cfg: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .pool_max_idle_per_host(cfg.max_keepalive)
            .connect_timeout(cfg.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            url: cfg.url.clone(),
            permits: Arc::new(Semaphore::new(cfg.max_connections)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn fetch(&self, timeout: Duration) -> Result<Value, AttemptError> {
        let start = Instant::now();

        let _permit = match time::timeout(timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            // The semaphore is never closed; treat it like an exhausted pool.
            Ok(Err(_)) | Err(_) => return Err(AttemptError::PoolTimeout),
        };

        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return Err(AttemptError::PoolTimeout);
        }

        let response = self
            .client
            .get(&self.url)
            .timeout(remaining)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            debug!(%status, "incorrect status code from upstream");
            return Err(AttemptError::BadStatus(status.as_u16()));
        }

        response.json::<Value>().await.map_err(classify)
    }
}

fn classify(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        if e.is_connect() {
            AttemptError::ConnectTimeout
        } else {
            AttemptError::ReadTimeout
        }
    } else if e.is_connect() {
        AttemptError::Connect(e.to_string())
    } else if e.is_decode() {
        AttemptError::Decode(e.to_string())
    } else {
        AttemptError::Connect(e.to_string())
    }
}
