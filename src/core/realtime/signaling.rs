//! HTTP signaling for the WebRTC session setup.
//!
//! The client POSTs the raw SDP offer to a single configured endpoint; the
//! endpoint performs the provider-specific session setup (credentials stay
//! server-side) and returns the raw SDP answer with status 200. Any other
//! status carries a plain-text error body.

use std::time::Duration;

use tracing::{debug, info};

use super::base::{RealtimeError, RealtimeResult};

/// Content type of both request and response bodies.
const SDP_CONTENT_TYPE: &str = "application/sdp";

/// One-shot SDP offer/answer exchange client.
pub struct SignalingClient {
    http: reqwest::Client,
    url: String,
}

impl SignalingClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> RealtimeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RealtimeError::ConnectionFailed(error.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// POST the offer SDP and return the answer SDP.
    pub async fn exchange(&self, offer_sdp: &str) -> RealtimeResult<String> {
        debug!(url = %self.url, offer_len = offer_sdp.len(), "posting sdp offer");
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|error| RealtimeError::ConnectionFailed(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| RealtimeError::ConnectionFailed(error.to_string()))?;

        if !status.is_success() {
            return Err(RealtimeError::SignalingFailed {
                status: status.as_u16(),
                body,
            });
        }
        info!(answer_len = body.len(), "sdp answer received");
        Ok(body)
    }
}
