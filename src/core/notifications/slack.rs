use super::{JobEvent, NotificationChannel};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

fn short_id(job_id: &str) -> &str {
    // UUIDv7 ids share their leading timestamp digits, so use the tail
    &job_id[job_id.len().saturating_sub(8)..]
}

fn header(text: &str) -> serde_json::Value {
    json!({
        "type": "header",
        "text": { "type": "plain_text", "text": text, "emoji": true }
    })
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(&self, event: &JobEvent) -> serde_json::Value {
        match event {
            JobEvent::Started {
                job_id,
                job_type,
                description,
            } => json!({
                "blocks": [
                    header("Job Started"),
                    {
                        "type": "section",
                        "fields": [
                            { "type": "mrkdwn", "text": format!("*Type:*\n{}", job_type) },
                            { "type": "mrkdwn", "text": format!("*Job ID:*\n`{}`", short_id(job_id)) }
                        ]
                    },
                    {
                        "type": "section",
                        "text": { "type": "mrkdwn", "text": description }
                    }
                ]
            }),
            JobEvent::Completed {
                job_id,
                job_type,
                summary,
                duration_secs,
            } => json!({
                "blocks": [
                    header("Job Finished"),
                    {
                        "type": "section",
                        "fields": [
                            { "type": "mrkdwn", "text": format!("*Type:*\n{}", job_type) },
                            { "type": "mrkdwn", "text": format!("*Job ID:*\n`{}`", short_id(job_id)) },
                            { "type": "mrkdwn", "text": format!("*Duration:*\n{}s", duration_secs) }
                        ]
                    },
                    {
                        "type": "section",
                        "text": { "type": "mrkdwn", "text": summary }
                    }
                ]
            }),
            JobEvent::Failed {
                job_id,
                job_type,
                error,
            } => json!({
                "blocks": [
                    header("Job Failed"),
                    {
                        "type": "section",
                        "fields": [
                            { "type": "mrkdwn", "text": format!("*Type:*\n{}", job_type) },
                            { "type": "mrkdwn", "text": format!("*Job ID:*\n`{}`", short_id(job_id)) }
                        ]
                    },
                    {
                        "type": "section",
                        "text": { "type": "mrkdwn", "text": format!("*Error:*\n```{}```", error) }
                    }
                ]
            }),
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn notify(&self, event: JobEvent) -> Result<()> {
        let payload = self.format_message(&event);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
