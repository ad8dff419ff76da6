//! Email transports for alert notifications.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::models::{Alert, Backlink};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("sendmail not found in PATH: {0}")]
    NotInstalled(#[from] which::Error),
    #[error("Failed to run sendmail: {0}")]
    Io(#[from] std::io::Error),
    #[error("sendmail exited with {0}")]
    Exit(std::process::ExitStatus),
}

/// A rendered alert email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Render the notification for an alert.
    pub fn for_alert(to: &str, alert: &Alert, backlink: &Backlink) -> Self {
        let subject = format!("[{}] {}", alert.severity.label(), alert.title);
        let mut body = format!(
            "{}\n\nSource page: {}\nTarget URL:  {}\nStatus:      {}\n",
            alert.message, backlink.source_url, backlink.target_url, backlink.status
        );
        if let Some(anchor) = &backlink.anchor_text {
            body.push_str(&format!("Anchor text: {}\n", anchor));
        }
        if let Some(status) = backlink.http_status {
            body.push_str(&format!("HTTP status: {}\n", status));
        }
        Self {
            to: to.to_string(),
            subject,
            body,
        }
    }
}

/// Sends email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Writes emails to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "alert email");
        Ok(())
    }
}

/// Delivers through the local `sendmail` binary.
#[derive(Debug, Clone)]
pub struct SendmailMailer {
    binary: PathBuf,
    from: String,
}

impl SendmailMailer {
    /// Locate `sendmail` in PATH.
    pub fn new(from: impl Into<String>) -> Result<Self, MailError> {
        Ok(Self {
            binary: which::which("sendmail")?,
            from: from.into(),
        })
    }

    fn render(&self, message: &EmailMessage) -> String {
        format!(
            "From: {}\r\nTo: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}",
            self.from,
            message.to,
            message.subject,
            message.body.replace('\n', "\r\n")
        )
    }
}

#[async_trait]
impl Mailer for SendmailMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let mut child = tokio::process::Command::new(&self.binary)
            .arg("-t")
            .arg("-i")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(self.render(message).as_bytes()).await?;
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(MailError::Exit(status));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertSeverity, AlertType};
    use chrono::Utc;

    #[test]
    fn test_subject_carries_severity() {
        let link = Backlink::new(
            "https://blog.example.org/post".into(),
            "https://mysite.com".into(),
            Some(1),
        );
        let alert = Alert {
            id: 1,
            backlink_id: 1,
            alert_type: AlertType::BacklinkLost,
            severity: AlertSeverity::Critical,
            title: "Backlink lost".into(),
            message: "gone".into(),
            metadata: serde_json::json!({}),
            is_read: false,
            created_at: Utc::now(),
        };

        let message = EmailMessage::for_alert("owner@example.com", &alert, &link);
        assert_eq!(message.subject, "[CRITICAL] Backlink lost");
        assert!(message.body.contains("https://blog.example.org/post"));
    }
}
