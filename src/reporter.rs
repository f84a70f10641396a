//! Completion reports: structured task summaries mailed to an operator
//! address over SMTP.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SmtpConfig;
use crate::error::{Error, Result};

pub struct Reporter {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
}

impl Reporter {
    /// Build the transport from config. A broken SMTP config disables the
    /// reporter rather than taking the control plane down; the per-task
    /// email failure path already tolerates a missing transport.
    pub fn new(config: &SmtpConfig) -> Self {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.host,
            ))
        };

        let transport = match builder {
            Ok(mut builder) => {
                builder = builder.port(config.port);
                if let (Some(user), Some(pass)) = (&config.user, &config.pass) {
                    builder =
                        builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                Some(builder.build())
            }
            Err(e) => {
                warn!(error = %e, host = %config.host, "SMTP transport unavailable; reports disabled");
                None
            }
        };

        Self {
            transport,
            from: config.from.clone(),
        }
    }

    /// Send a pretty-printed report. Failures surface as errors so the
    /// worker can annotate the task result; they never fail the task.
    pub async fn send_report(&self, to: &str, subject: &str, report: &Value) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Err(Error::Report("SMTP transport not configured".into()));
        };

        let body = format!(
            "WordPress Maintenance Report\n\n{}",
            serde_json::to_string_pretty(report)?
        );
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| Error::Report(format!("bad from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| Error::Report(format!("bad to address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| Error::Report(e.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|e| Error::Report(e.to_string()))?;
        debug!(%to, %subject, "report email sent");
        Ok(())
    }
}
