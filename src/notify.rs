//! Optional end-of-run mail report. The weekly cron job has no terminal
//! attached; a short HTML summary posted to a Mailgun-style messages
//! endpoint is how anyone learns what the run did.

use anyhow::{Context, Result};
use chrono::Local;
use reqwest::Client;

use crate::pipeline::RunSummary;
use crate::util::env as env_util;

/// Messages-endpoint settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Notifier {
    endpoint: String,
    api_key: String,
    from: String,
    to: String,
}

impl Notifier {
    /// None unless `MAILGUN_URL`, `MAILGUN_API_KEY`, `MAILGUN_FROM` and
    /// `MAILGUN_TO` are all configured.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            endpoint: env_util::env_opt("MAILGUN_URL")?,
            api_key: env_util::env_opt("MAILGUN_API_KEY")?,
            from: env_util::env_opt("MAILGUN_FROM")?,
            to: env_util::env_opt("MAILGUN_TO")?,
        })
    }

    /// Post the run report. Failures are the caller's to log; the run
    /// itself never fails because mail did.
    pub async fn send_report(&self, http: &Client, summary: &RunSummary) -> Result<()> {
        let body = render_report(summary);
        http.post(&self.endpoint)
            .basic_auth("api", Some(&self.api_key))
            .form(&[
                ("from", self.from.as_str()),
                ("to", self.to.as_str()),
                ("subject", "TWIC to Scid output"),
                ("html", body.as_str()),
            ])
            .send()
            .await
            .context("posting mail report")?
            .error_for_status()
            .context("mail API rejected the report")?;
        Ok(())
    }
}

fn render_report(summary: &RunSummary) -> String {
    let mut lines = Vec::new();
    lines.push(format!("selected: {:?}", summary.selected));
    if !summary.already_merged.is_empty() {
        lines.push(format!("already merged: {:?}", summary.already_merged));
    }
    lines.push(format!("merged: {:?}", summary.merged));
    for (id, reason) in &summary.failed {
        lines.push(format!("failed {id}: {reason}"));
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<body>\n<h1>TWIC games to Scid log</h1>\nRun on {} <br><br> {}\n</body>\n</html>\n",
        Local::now().format("%h-%d-%Y %I:%M%p"),
        lines.join("<br>"),
    )
}
