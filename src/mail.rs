use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MailConfig;

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

/// Sends through an HTTP mail API (`POST <api_url>` with a bearer key and a
/// JSON body of `from`, `to`, `subject`, `text`).
pub struct HttpMailer {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .user_agent("internhub/0.1 (+reqwest)")
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .context("build mail client")?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let t0 = Instant::now();
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await
            .context("mail api request")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("mail api error: HTTP {status}: {body}");
        }
        info!(to = ?email.to, %status, elapsed_ms = t0.elapsed().as_millis() as u64, "mail sent");
        Ok(())
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        warn!(to = ?email.to, subject = %email.subject, body = %email.text, "mail api not configured; logging message");
        Ok(())
    }
}

pub fn from_config(cfg: &MailConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match (&cfg.api_url, &cfg.api_key) {
        (Some(url), Some(key)) => Ok(Arc::new(HttpMailer::new(url, key)?)),
        _ => Ok(Arc::new(LogMailer)),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_mail_falls_back_to_log() {
        let cfg = MailConfig {
            api_url: None,
            api_key: Some("k".into()),
            from: "noreply@test.local".into(),
        };
        assert!(from_config(&cfg).is_ok());
    }

    #[tokio::test]
    async fn log_mailer_never_fails() {
        let email = OutgoingEmail {
            from: "a@b.com".into(),
            to: vec!["c@d.com".into()],
            subject: "hi".into(),
            text: "body".into(),
        };
        assert!(LogMailer.send(email).await.is_ok());
    }
}
