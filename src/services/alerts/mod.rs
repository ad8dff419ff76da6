//! Alert creation and notification fan-out.
//!
//! Every dispatched alert is stored. Email goes out for urgent alerts when
//! the owner opted in; webhooks go out for subscribed event types. A failed
//! notification never undoes the stored alert.
//!
//! The monitor stores alerts inside its check transaction and only calls
//! `notify` after commit; `dispatch` does both for standalone use.

pub mod email;
pub mod webhook;

pub use email::{EmailMessage, LogMailer, MailError, Mailer, SendmailMailer};
pub use webhook::{
    sign, HttpWebhookDelivery, WebhookDelivery, WebhookError, WebhookRequest, SIGNATURE_HEADER,
};

use std::sync::Arc;

use tracing::{info, warn};

use crate::models::{Alert, Backlink, NotificationProfile};
use crate::repository::{AlertDraft, AlertRepository, DbError};

/// What happened to one dispatched alert.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub alert: Alert,
    pub email_sent: bool,
    pub webhook_sent: bool,
}

/// Stores alerts and notifies backlink owners.
#[derive(Clone)]
pub struct AlertDispatcher {
    alerts: AlertRepository,
    mailer: Arc<dyn Mailer>,
    webhooks: Arc<dyn WebhookDelivery>,
}

impl AlertDispatcher {
    pub fn new(
        alerts: AlertRepository,
        mailer: Arc<dyn Mailer>,
        webhooks: Arc<dyn WebhookDelivery>,
    ) -> Self {
        Self {
            alerts,
            mailer,
            webhooks,
        }
    }

    /// Create the alert row, then notify the owner if there is one.
    pub async fn dispatch(
        &self,
        backlink: &Backlink,
        owner: Option<&NotificationProfile>,
        draft: &AlertDraft,
    ) -> Result<DispatchReport, DbError> {
        let alert = self.alerts.create(backlink.id, draft).await?;
        Ok(self.notify(backlink, owner, alert).await)
    }

    /// Notify the owner about an alert that is already stored.
    ///
    /// Delivery failures are logged and reported, never returned.
    pub async fn notify(
        &self,
        backlink: &Backlink,
        owner: Option<&NotificationProfile>,
        alert: Alert,
    ) -> DispatchReport {
        info!(
            "Alert {} ({}, {}) for backlink {}",
            alert.id,
            alert.alert_type,
            alert.severity.as_str(),
            backlink.id
        );

        let mut report = DispatchReport {
            alert,
            email_sent: false,
            webhook_sent: false,
        };
        let Some(owner) = owner else {
            return report;
        };

        if owner.email_alerts_enabled && report.alert.severity.is_urgent() {
            let message = EmailMessage::for_alert(&owner.email, &report.alert, backlink);
            match self.mailer.send(&message).await {
                Ok(()) => report.email_sent = true,
                Err(e) => warn!("Alert email to {} failed: {}", owner.email, e),
            }
        }

        if let Some(hook) = owner
            .webhook
            .as_ref()
            .filter(|hook| hook.wants(report.alert.alert_type))
        {
            let delivery = match WebhookRequest::for_alert(
                &hook.url,
                hook.secret.as_deref(),
                &report.alert,
                backlink,
            ) {
                Ok(request) => self.webhooks.deliver(&request).await,
                Err(e) => Err(e),
            };
            match delivery {
                Ok(()) => report.webhook_sent = true,
                Err(e) => warn!("Webhook delivery to {} failed: {}", hook.url, e),
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertSeverity, AlertType, User, WebhookConfig};
    use crate::repository::DbContext;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingMailer(Mutex<Vec<EmailMessage>>);

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
            self.0.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingWebhooks {
        sent: Mutex<Vec<WebhookRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl WebhookDelivery for RecordingWebhooks {
        async fn deliver(&self, request: &WebhookRequest) -> Result<(), WebhookError> {
            if self.fail {
                return Err(WebhookError::Status(500));
            }
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    struct Harness {
        dispatcher: AlertDispatcher,
        mailer: Arc<RecordingMailer>,
        webhooks: Arc<RecordingWebhooks>,
        ctx: DbContext,
        backlink: Backlink,
        _dir: tempfile::TempDir,
    }

    async fn harness(webhooks: RecordingWebhooks) -> Harness {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();

        let mut backlink = Backlink::new(
            "https://blog.example.org/post".into(),
            "https://mysite.com".into(),
            None,
        );
        backlink.id = ctx.backlinks().create(&backlink).await.unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let webhooks = Arc::new(webhooks);
        Harness {
            dispatcher: AlertDispatcher::new(ctx.alerts(), mailer.clone(), webhooks.clone()),
            mailer,
            webhooks,
            ctx,
            backlink,
            _dir: dir,
        }
    }

    fn draft(alert_type: AlertType) -> AlertDraft {
        AlertDraft {
            alert_type,
            severity: alert_type.severity(),
            title: "t".into(),
            message: "m".into(),
            metadata: serde_json::json!({}),
        }
    }

    fn profile(events: &[&str]) -> NotificationProfile {
        let mut user = User::new("owner@example.com".into(), "Owner".into());
        user.id = 1;
        let mut profile = user.notification_profile();
        profile.webhook = Some(WebhookConfig {
            url: "https://hooks.example.com/in".into(),
            secret: Some("s3cret".into()),
            events: events.iter().map(|e| e.to_string()).collect(),
        });
        profile
    }

    #[tokio::test]
    async fn test_lost_alert_emails_and_posts() {
        let h = harness(RecordingWebhooks::default()).await;
        let report = h
            .dispatcher
            .dispatch(&h.backlink, Some(&profile(&[])), &draft(AlertType::BacklinkLost))
            .await
            .unwrap();

        assert!(report.email_sent);
        assert!(report.webhook_sent);
        assert_eq!(report.alert.severity, AlertSeverity::Critical);
        assert_eq!(
            h.mailer.0.lock().unwrap()[0].subject,
            "[CRITICAL] t"
        );
        assert!(h.webhooks.sent.lock().unwrap()[0].signature.is_some());
    }

    #[tokio::test]
    async fn test_recovered_alert_never_emails() {
        let h = harness(RecordingWebhooks::default()).await;
        let report = h
            .dispatcher
            .dispatch(
                &h.backlink,
                Some(&profile(&[])),
                &draft(AlertType::BacklinkRecovered),
            )
            .await
            .unwrap();

        assert!(!report.email_sent);
        assert!(report.webhook_sent);
        assert!(h.mailer.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_subscription_filter() {
        let h = harness(RecordingWebhooks::default()).await;
        let report = h
            .dispatcher
            .dispatch(
                &h.backlink,
                Some(&profile(&["backlink_lost"])),
                &draft(AlertType::BacklinkChanged),
            )
            .await
            .unwrap();
        assert!(!report.webhook_sent);
        assert!(h.webhooks.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_email_opt_out_and_ownerless() {
        let h = harness(RecordingWebhooks::default()).await;
        let mut owner = profile(&[]);
        owner.email_alerts_enabled = false;
        owner.webhook = None;

        let report = h
            .dispatcher
            .dispatch(&h.backlink, Some(&owner), &draft(AlertType::BacklinkLost))
            .await
            .unwrap();
        assert!(!report.email_sent);

        let report = h
            .dispatcher
            .dispatch(&h.backlink, None, &draft(AlertType::BacklinkLost))
            .await
            .unwrap();
        assert!(!report.email_sent && !report.webhook_sent);
        assert_eq!(h.ctx.alerts().for_backlink(h.backlink.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_webhook_keeps_alert() {
        let h = harness(RecordingWebhooks {
            fail: true,
            ..Default::default()
        })
        .await;
        let report = h
            .dispatcher
            .dispatch(&h.backlink, Some(&profile(&[])), &draft(AlertType::BacklinkLost))
            .await
            .unwrap();
        assert!(!report.webhook_sent);
        assert!(report.email_sent);
        assert_eq!(h.ctx.alerts().list(false, 10).await.unwrap().len(), 1);
    }
}
