// WhatsApp gateway client
//
// Wraps every outbound call to the WhatsApp bridge service behind two
// operations: a liveness check and the actual send. The client persists
// nothing; attaching domain context to the outcome is the caller's job.

use crate::config::GatewayConfig;
use crate::errors::GatewayError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Outbound messaging operations as consumed by the scheduler engine
#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// True only if the gateway reports an active session; transport errors
    /// are reported as "not connected", never as an error
    async fn check_connection(&self) -> bool;

    /// Send a message, returning the gateway-assigned message id
    async fn send_message(&self, destination: &str, message: &str) -> Result<String, GatewayError>;
}

/// HTTP client for the Baileys-based WhatsApp bridge
pub struct WhatsAppClient {
    client: reqwest::Client,
    base_url: String,
}

impl WhatsAppClient {
    /// Build a client with fixed connect/read timeouts from configuration
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let timeout = Duration::from_secs(config.timeout_seconds);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// URL of the QR pairing page, surfaced in connectivity errors
    fn qr_url(&self) -> String {
        format!("{}/qr", self.base_url)
    }

    /// Pull the message id out of the send response, falling back to a
    /// locally generated id when the field is absent
    fn extract_external_id(body: &serde_json::Value) -> String {
        match body.get("timestamp") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => format!("SUCCESS-{}", Utc::now().timestamp_millis()),
        }
    }
}

#[async_trait]
impl MessageGateway for WhatsAppClient {
    #[instrument(skip(self))]
    async fn check_connection(&self) -> bool {
        let url = format!("{}/status", self.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Gateway status check failed");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Gateway status check returned non-success");
            return false;
        }

        let body: serde_json::Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Gateway status response was not valid JSON");
                return false;
            }
        };

        let connected = body
            .get("connected")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if !connected {
            warn!(qr_url = %self.qr_url(), "WhatsApp session not paired");
        }

        connected
    }

    #[instrument(skip(self, message), fields(destination = %destination))]
    async fn send_message(&self, destination: &str, message: &str) -> Result<String, GatewayError> {
        // Fail fast before touching the send endpoint
        if !self.check_connection().await {
            return Err(GatewayError::NotConnected {
                qr_url: self.qr_url(),
            });
        }

        let url = format!("{}/enviar-mensaje", self.base_url);
        let payload = json!({
            "numero": destination,
            "mensaje": message,
        });

        let response = self.client.post(&url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "no details".to_string());
            return Err(GatewayError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let external_id = Self::extract_external_id(&body);
        debug!(external_id = %external_id, "Gateway accepted message");

        Ok(external_id)
    }
}
