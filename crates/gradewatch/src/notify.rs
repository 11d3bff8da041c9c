use std::future::Future;
use std::time::Duration;

use crate::types::Grade;

use reqwest::Client;
use serde::Serialize;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(6);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Failure,
}

impl Severity {
    pub fn color(&self) -> u32 {
        match self {
            Severity::Success => 0x00FF00,
            Severity::Failure => 0xFF0000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

impl Notification {
    pub fn grade_released(course_code: &str, term: &str, grade: Grade) -> Self {
        if grade.is_failing() {
            Self {
                title: format!("Grade released ({})", grade),
                body: format!("{} ({}) = {}\nTime to regroup.", course_code, term, grade),
                severity: Severity::Failure,
            }
        } else {
            Self {
                title: "Grade released".to_string(),
                body: format!("{} ({}) = {}\nCongratulations!", course_code, term, grade),
                severity: Severity::Success,
            }
        }
    }

    pub fn all_released(term: &str) -> Self {
        Self {
            title: "All grades released".to_string(),
            body: format!(
                "Every course in {} has a grade now.\nStopping the watcher.",
                term
            ),
            severity: Severity::Success,
        }
    }
}

/// Best-effort delivery of notifications. Implementations log delivery
/// failures instead of returning them.
pub trait Notifier {
    fn notify(&self, notification: &Notification) -> impl Future<Output = ()>;
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    color: u32,
}

impl<'a> From<&'a Notification> for WebhookPayload<'a> {
    fn from(notification: &'a Notification) -> Self {
        Self {
            content: &notification.title,
            embeds: [Embed {
                title: &notification.title,
                description: &notification.body,
                color: notification.severity.color(),
            }],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    client: Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, notification: &Notification) -> Result<(), reqwest::Error> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload::from(notification))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        log::debug!("Discord status: {} {}", status, text);

        if !status.is_success() {
            log::warn!("Discord rejected '{}': {} {}", notification.title, status, text);
        }
        Ok(())
    }
}

impl Notifier for DiscordWebhook {
    async fn notify(&self, notification: &Notification) {
        if let Err(e) = self.post(notification).await {
            log::error!("Failed to send Discord notification: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_grade_uses_alert_tier() {
        let notification = Notification::grade_released("EN813001", "1/2568", Grade::F);
        assert_eq!(notification.severity, Severity::Failure);
        assert_eq!(notification.severity.color(), 0xFF0000);
        assert!(notification.title.contains("(F)"));
        assert!(notification.body.starts_with("EN813001 (1/2568) = F"));
    }

    #[test]
    fn test_passing_grade_uses_success_tier() {
        let notification = Notification::grade_released("EN813001", "1/2568", Grade::BPlus);
        assert_eq!(notification.severity, Severity::Success);
        assert_eq!(notification.severity.color(), 0x00FF00);
        assert!(notification.body.starts_with("EN813001 (1/2568) = B+"));
    }

    #[test]
    fn test_webhook_payload_shape() {
        let notification = Notification::all_released("1/2568");
        let payload = serde_json::to_value(WebhookPayload::from(&notification)).unwrap();

        assert_eq!(payload["content"], "All grades released");
        assert_eq!(payload["embeds"][0]["title"], "All grades released");
        assert_eq!(payload["embeds"][0]["color"], 0x00FF00);
        assert!(
            payload["embeds"][0]["description"]
                .as_str()
                .unwrap()
                .contains("1/2568")
        );
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_not_fatal() {
        // nothing listens on the discard port
        let webhook = DiscordWebhook::new("http://127.0.0.1:9/api/webhooks/1/token")
            .expect("Failed to build client");

        webhook
            .notify(&Notification::grade_released("EN813001", "1/2568", Grade::A))
            .await;
        webhook.notify(&Notification::all_released("1/2568")).await;
    }

    #[tokio::test]
    async fn test_malformed_webhook_url_is_not_fatal() {
        let webhook = DiscordWebhook::new("not a webhook").expect("Failed to build client");
        webhook.notify(&Notification::all_released("1/2568")).await;
    }
}
