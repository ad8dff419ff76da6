//! Signed webhook delivery.
//!
//! The body is JSON; when the endpoint has a secret, the raw body is signed
//! with HMAC-SHA256 and sent as `X-Webhook-Signature: sha256=<hex>`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::redirect::Policy;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

use crate::checker::{UrlGuard, UrlRejection};
use crate::http_client::USER_AGENT;
use crate::models::{Alert, Backlink};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Webhook requests give up after this long.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Rejected(#[from] UrlRejection),
    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Webhook endpoint returned HTTP {0}")]
    Status(u16),
    #[error("Failed to encode webhook payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid webhook secret")]
    InvalidSecret,
}

#[derive(Debug, Serialize)]
struct AlertSection<'a> {
    #[serde(rename = "type")]
    alert_type: &'a str,
    severity: &'a str,
    title: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct BacklinkSection<'a> {
    source_url: &'a str,
    target_url: &'a str,
    anchor_text: Option<&'a str>,
    status: &'a str,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    timestamp: String,
    alert: AlertSection<'a>,
    backlink: BacklinkSection<'a>,
}

/// A webhook POST ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub url: String,
    pub body: Vec<u8>,
    /// Header value, e.g. `sha256=ab12...`. Absent without a secret.
    pub signature: Option<String>,
}

impl WebhookRequest {
    /// Build and sign the payload for an alert.
    pub fn for_alert(
        url: &str,
        secret: Option<&str>,
        alert: &Alert,
        backlink: &Backlink,
    ) -> Result<Self, WebhookError> {
        let payload = WebhookPayload {
            event: alert.alert_type.as_str(),
            timestamp: Utc::now().to_rfc3339(),
            alert: AlertSection {
                alert_type: alert.alert_type.as_str(),
                severity: alert.severity.as_str(),
                title: &alert.title,
                message: &alert.message,
            },
            backlink: BacklinkSection {
                source_url: &backlink.source_url,
                target_url: &backlink.target_url,
                anchor_text: backlink.anchor_text.as_deref(),
                status: backlink.status.as_str(),
            },
        };
        let body = serde_json::to_vec(&payload)?;
        let signature = match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Some(format!("sha256={}", sign(secret, &body)?)),
            None => None,
        };

        Ok(Self {
            url: url.to_string(),
            body,
            signature,
        })
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Sends webhook requests.
#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    async fn deliver(&self, request: &WebhookRequest) -> Result<(), WebhookError>;
}

/// Delivers over HTTP after the same SSRF checks used for page fetches.
#[derive(Clone)]
pub struct HttpWebhookDelivery {
    guard: UrlGuard,
}

impl HttpWebhookDelivery {
    pub fn new(guard: UrlGuard) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl WebhookDelivery for HttpWebhookDelivery {
    async fn deliver(&self, request: &WebhookRequest) -> Result<(), WebhookError> {
        let safe = self.guard.validate(&request.url).await?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(WEBHOOK_TIMEOUT)
            .redirect(Policy::none())
            .no_proxy()
            .resolve_to_addrs(&safe.host, &safe.addrs)
            .build()?;

        let mut post = client
            .post(safe.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body.clone());
        if let Some(signature) = &request.signature {
            post = post.header(SIGNATURE_HEADER, signature);
        }

        let response = post.send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
