//! Outgoing mail. Delivery is best-effort: a failed or slow send is logged
//! and never fails the request that triggered it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()>;
}

/// Writes mail to the log instead of sending it. Used when no webhook is set.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        info!("Mail to {}: {} | {}", mail.to, mail.subject, mail.text);
        Ok(())
    }
}

/// POSTs each mail as JSON to a relay endpoint.
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
    from: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    #[serde(flatten)]
    mail: &'a OutgoingMail,
}

impl WebhookMailer {
    pub fn new(url: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            from,
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, mail: OutgoingMail) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                from: &self.from,
                mail: &mail,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            anyhow::bail!("mail webhook returned {}: {}", status, body);
        }
        Ok(())
    }
}

/// Send with a timeout, logging instead of failing. Returns whether the mail
/// was handed off.
pub async fn deliver(mailer: &dyn Mailer, mail: OutgoingMail) -> bool {
    let to = mail.to.clone();
    match tokio::time::timeout(SEND_TIMEOUT, mailer.send(mail)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Failed to send mail to {}: {:#}", to, e);
            false
        }
        Err(_) => {
            warn!("Sending mail to {} timed out", to);
            false
        }
    }
}

fn wrap_html(heading: &str, paragraph: &str) -> String {
    format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; margin: 0; padding: 0;">
    <div style="max-width: 600px; margin: 0 auto; padding: 24px;">
      <h1 style="color: #0066cc; font-size: 24px;">{}</h1>
      <p style="font-size: 16px; line-height: 1.5; color: #333333;">{}</p>
    </div>
  </body>
</html>"#,
        heading, paragraph
    )
}

pub fn confirm_email_mail(to: &str, otp: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Your Email Confirmation OTP (Valid for 90 seconds)".into(),
        text: format!("Your OTP: {}", otp),
        html: wrap_html("Use this OTP to confirm your email", &format!("Your OTP: {}", otp)),
    }
}

pub fn reset_password_mail(to: &str, otp: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Your Password Reset OTP (Valid for 90 seconds)".into(),
        text: format!("Your OTP: {}", otp),
        html: wrap_html("Use this OTP to reset your password", &format!("Your OTP: {}", otp)),
    }
}

pub fn digest_mail(to: &str, summary: &str) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: "Your latest notes stats".into(),
        text: summary.to_string(),
        html: wrap_html("Your notes stats for today", summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _mail: OutgoingMail) -> anyhow::Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    #[tokio::test]
    async fn deliver_swallows_failures() {
        let mail = confirm_email_mail("ann@example.com", "12345");
        assert!(!deliver(&FailingMailer, mail.clone()).await);
        assert!(deliver(&LogMailer, mail).await);
    }

    #[test]
    fn templates_carry_the_code() {
        let mail = reset_password_mail("ann@example.com", "54321");
        assert_eq!(mail.text, "Your OTP: 54321");
        assert!(mail.html.contains("54321"));
        assert!(mail.subject.contains("90 seconds"));
    }

    #[test]
    fn webhook_payload_is_flat() {
        let mail = digest_mail("ann@example.com", "You got new 1 Congrats notes.");
        let payload = serde_json::to_value(WebhookPayload { from: "Notecast", mail: &mail }).unwrap();
        assert_eq!(payload["from"], "Notecast");
        assert_eq!(payload["to"], "ann@example.com");
        assert_eq!(payload["subject"], "Your latest notes stats");
    }
}
