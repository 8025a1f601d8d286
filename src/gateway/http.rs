// src/gateway/http.rs

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::GatewaySection;
use crate::errors::{FleetError, Result};
use crate::types::Params;

use super::{ErrorDescriptor, FetchOutcome, GatewayClient, TRANSPORT_FAILURE};

/// `GET {base_url}{endpoint}?k=v...` against the controller gateway.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(cfg: &GatewaySection) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| FleetError::GatewayError(format!("building HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    async fn get(
        &self,
        endpoint: &str,
        params: &Params,
    ) -> std::result::Result<FetchOutcome, reqwest::Error> {
        let query: Vec<(&str, String)> = params
            .iter()
            .map(|(k, v)| (k.as_str(), query_value(v)))
            .collect();

        let response = self
            .client
            .get(self.url(endpoint))
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!(endpoint, status = status.as_u16(), "gateway answered non-success");
            return Ok(FetchOutcome::Error(ErrorDescriptor::new(i64::from(
                status.as_u16(),
            ))));
        }

        let body: Value = response.json().await?;
        Ok(FetchOutcome::from_json(body))
    }
}

/// Strings go out bare, everything else as its JSON text (`1`, `true`).
fn query_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl GatewayClient for HttpGateway {
    fn fetch<'a>(&'a self, endpoint: &'a str, params: &'a Params) -> BoxFuture<'a, FetchOutcome> {
        Box::pin(async move {
            match self.get(endpoint, params).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(endpoint, error = %err, "gateway request failed");
                    FetchOutcome::Error(ErrorDescriptor::new(TRANSPORT_FAILURE))
                }
            }
        })
    }
}
