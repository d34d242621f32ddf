//! Remote logging and transcript archival over a single webhook.
//!
//! The app posts JSON to one Apps-Script-style endpoint for both log lines
//! and content uploads. Everything here is best-effort: deliveries run on
//! detached tasks, failures are downgraded to warnings, and an unconfigured
//! endpoint turns the whole logger into a no-op.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::session::Archiver;

#[derive(Clone)]
pub struct WebhookLogger {
    endpoint: Option<String>,
    auth_token: String,
    app_name: String,
    client: reqwest::Client,
}

impl WebhookLogger {
    pub fn new(endpoint: Option<String>, auth_token: String, app_name: String) -> Self {
        let endpoint = endpoint.filter(|url| !url.trim().is_empty());
        Self {
            endpoint,
            auth_token,
            app_name,
            client: reqwest::Client::new(),
        }
    }

    /// A logger with no endpoint: every call is an immediate no-op.
    pub fn disabled() -> Self {
        Self::new(None, String::new(), String::new())
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Deliver one log line. No-op when unconfigured.
    pub async fn send_log(&self, level: &str, message: &str, details: Option<Value>) -> Result<()> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Ok(());
        };
        let mut body = json!({
            "auth_token": self.auth_token,
            "app_name": self.app_name,
            "level": level,
            "message": message,
        });
        if let Some(details) = details {
            body["details"] = details;
        }
        self.post(&endpoint, &body).await
    }

    /// Detached variant of [`send_log`](Self::send_log); failures are
    /// logged locally and never surfaced.
    pub fn spawn_log(&self, level: &'static str, message: String) {
        if !self.is_enabled() {
            return;
        }
        let logger = self.clone();
        tokio::spawn(async move {
            if let Err(e) = logger.send_log(level, &message, None).await {
                tracing::warn!("Webhook log delivery failed: {:#}", e);
            }
        });
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<()> {
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .context("Failed to reach webhook endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read body".to_string());
            anyhow::bail!("Webhook returned error {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl Archiver for WebhookLogger {
    async fn archive(&self, kind: &str, title: &str, content: &str) -> Result<()> {
        let Some(endpoint) = self.endpoint.clone() else {
            return Ok(());
        };
        let body = json!({
            "auth_token": self.auth_token,
            "app_name": self.app_name,
            "action": "content",
            "content_type": kind,
            "title": title,
            "content": content,
        });
        self.post(&endpoint, &body).await
    }
}
