//! HTTP transport for batch delivery.
//!
//! One pooled client per engine instance; timeouts here are the only bound
//! on an in-flight send. A non-2xx status or an unparseable body is a
//! transport failure, never a crash.

use std::time::Duration;

use log::debug;
use reqwest::Client;

use crate::error::{Result, WaylogError};
use crate::payload::{BatchPayload, ServerResponse};
use crate::sync::Transport;

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| WaylogError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn deliver(
        &self,
        url: &str,
        payload: &BatchPayload,
    ) -> std::result::Result<ServerResponse, String> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| format!("body download error: {}", e))?;

        debug!("[HttpTransport] Received {} byte response", bytes.len());

        serde_json::from_slice(&bytes).map_err(|e| format!("malformed response: {}", e))
    }
}
