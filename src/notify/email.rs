// src/notify/email.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{AlertEvent, AlertSink};

pub struct EmailAlertSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailAlertSink {
    /// SMTP_HOST / SMTP_USER / SMTP_PASS / ALERT_EMAIL_FROM /
    /// ALERT_EMAIL_TO. Errors when any of them is missing or invalid,
    /// so the caller can log and run without email.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = std::env::var("ALERT_EMAIL_FROM").context("ALERT_EMAIL_FROM missing")?;
        let to_addr = std::env::var("ALERT_EMAIL_TO").context("ALERT_EMAIL_TO missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid ALERT_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid ALERT_EMAIL_TO")?;

        Ok(Self { mailer, from, to })
    }
}

#[async_trait]
impl AlertSink for EmailAlertSink {
    async fn send(&self, ev: &AlertEvent) -> Result<()> {
        let subject = format!("Black swan alert: {} ({:.2})", ev.title, ev.final_score);
        let body = format!(
            "Title: {}\nScore: {:.3}\nConfidence: {:.3}\nRisk: {:?}\nReasoning: {}\nLink: {}\nTimestamp: {}\n",
            ev.title,
            ev.final_score,
            ev.confidence,
            ev.risk_level,
            ev.reasoning,
            ev.url,
            ev.ts.to_rfc3339()
        );

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("building alert email")?;

        self.mailer.send(msg).await.context("smtp send")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}
