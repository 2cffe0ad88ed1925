use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Outbound webhook. A non-2xx answer or a network failure is reported as an
/// error and never retried here.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, url: &str, payload: &Value) -> anyhow::Result<Value>;
}

pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let timeout_ms = std::env::var("LEDGERDASH_WEBHOOK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self::new(Duration::from_millis(timeout_ms))
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn post(&self, url: &str, payload: &Value) -> anyhow::Result<Value> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {body}");
        }

        // automation hooks often answer with an empty or plain-text body
        let body = response.text().await?;
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}
