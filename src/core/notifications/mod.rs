mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{NotificationChannelType, NotificationConfig};
use crate::core::models::{JobId, JobType};

/// Job lifecycle events that trigger notifications.
#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        job_id: JobId,
        job_type: JobType,
        description: String,
    },
    Completed {
        job_id: JobId,
        job_type: JobType,
        summary: String,
        duration_secs: u64,
    },
    Failed {
        job_id: JobId,
        job_type: JobType,
        error: String,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Started { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }
}

/// A sink for job events (Slack, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, event: JobEvent) -> Result<()>;
}

pub fn create_notifier(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(slack::SlackNotifier::new(webhook.clone())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        assert!(create_notifier(&NotificationConfig::default()).is_none());
    }

    #[test]
    fn test_slack_requires_webhook() {
        let mut config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: None,
        };
        assert!(create_notifier(&config).is_none());

        config.slack_webhook = Some("https://hooks.slack.example/T000".into());
        assert!(create_notifier(&config).is_some());
    }
}
