//! HTTP fill source for a broker executions API.

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{FillSource, FillSourceError, RawFill};

/// Fill source backed by a broker's REST executions endpoint.
///
/// Constructed per process (or per run) and passed by reference into the
/// pipeline; holds no global state.
#[derive(Debug, Clone)]
pub struct HttpFillSource {
    client: Client,
    base_url: String,
}

impl HttpFillSource {
    /// Create a new HTTP fill source against the given API base URL.
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn get_executions(
        &self,
        account_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawFill>, FillSourceError> {
        let url = format!("{}/accounts/{}/executions", self.base_url, account_id);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("start_time", start_ms.to_string()),
                    ("end_time", end_ms.to_string()),
                ])
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(FillSourceError::Network(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(FillSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(FillSourceError::Http {
                    status: status.as_u16(),
                    message: "server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(FillSourceError::Http {
                    status: status.as_u16(),
                    message: "client error".to_string(),
                }));
            }

            response
                .json::<Vec<RawFill>>()
                .await
                .map_err(|e| backoff::Error::permanent(FillSourceError::Parse(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl FillSource for HttpFillSource {
    async fn fetch_fills(
        &self,
        account_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawFill>, FillSourceError> {
        debug!(
            account = account_id,
            start_ms, end_ms, "fetching executions from broker"
        );
        let fills = self.get_executions(account_id, start_ms, end_ms).await?;
        debug!(account = account_id, count = fills.len(), "fetched executions");
        Ok(fills)
    }
}
