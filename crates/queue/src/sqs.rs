//! AWS SQS consumer and alert publisher.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::{MessageSystemAttributeName, QueueAttributeName};
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info};

use tripwire_core::config::{AwsConfig, QueueConfig};
use tripwire_core::MisconductAlert;

use crate::consumer::{QueueConsumer, QueueHealth, QueueMessage};
use crate::error::QueueError;
use crate::producer::AlertPublisher;

/// Build an SQS client from explicit config.
///
/// Does not use `aws_config::defaults()`: that reads `AWS_ENDPOINT_URL` from
/// the environment, which may point at another service.
pub fn build_client(aws: &AwsConfig) -> Client {
    let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

    let mut sqs_config = aws_sdk_sqs::Config::builder()
        .region(region)
        .behavior_version(BehaviorVersion::latest());

    if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
        let creds = Credentials::new(
            key_id,
            secret,
            aws.session_token.clone(),
            None,
            "tripwire-queue-static",
        );
        sqs_config = sqs_config.credentials_provider(creds);
    }

    if let Some(endpoint) = aws.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
        sqs_config = sqs_config.endpoint_url(normalize_endpoint(endpoint));
    }

    Client::from_conf(sqs_config.build())
}

fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

// ── Consumer ──────────────────────────────────────────────────

/// SQS-backed queue consumer for the inbound gateway-event queue.
pub struct SqsConsumer {
    client: Client,
    queue_url: String,
    visibility_timeout_secs: i32,
}

impl SqsConsumer {
    pub fn new(client: Client, queue: &QueueConfig) -> Self {
        info!(queue_url = %queue.events_queue_url, "SQS consumer initialized");

        Self {
            client,
            queue_url: queue.events_queue_url.clone(),
            visibility_timeout_secs: queue.visibility_timeout_secs as i32,
        }
    }
}

#[async_trait]
impl QueueConsumer for SqsConsumer {
    async fn poll_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>, QueueError> {
        // SQS caps at 10 messages per request.
        let capped = max_messages.clamp(1, 10) as i32;

        debug!(max_messages = capped, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(20)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "Received SQS messages");

        let mut messages = Vec::with_capacity(sqs_messages.len());
        for msg in sqs_messages {
            let id = msg.message_id().unwrap_or("unknown").to_string();
            let body = msg.body().unwrap_or("").to_string();

            let receipt_handle = msg
                .receipt_handle()
                .ok_or_else(|| QueueError::Parse("missing receipt handle".into()))?
                .to_string();

            let timestamp = msg
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::SentTimestamp))
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now);

            let attempt_count = msg
                .attributes()
                .and_then(|attrs| attrs.get(&MessageSystemAttributeName::ApproximateReceiveCount))
                .and_then(|c| c.parse::<u32>().ok())
                .unwrap_or(1);

            messages.push(QueueMessage {
                id,
                body,
                receipt_handle,
                timestamp,
                attempt_count,
            });
        }

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Ack(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }

    async fn nack(&self, receipt_handle: &str) -> Result<(), QueueError> {
        debug!(receipt_handle, "Nacking SQS message (visibility=0)");

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| QueueError::Provider(format!("SQS visibility change failed: {e:?}")))?;

        Ok(())
    }

    async fn health_check(&self) -> Result<QueueHealth, QueueError> {
        let resp = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS health check failed: {e:?}")))?;

        let count = resp
            .attributes()
            .and_then(|attrs| attrs.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok());

        Ok(QueueHealth {
            connected: true,
            approximate_message_count: count,
            provider: "sqs".to_string(),
        })
    }
}

// ── Publisher ─────────────────────────────────────────────────

/// Publishes misconduct alerts as JSON to the detection queue.
pub struct SqsAlertPublisher {
    client: Client,
    queue_url: String,
}

impl SqsAlertPublisher {
    pub fn new(client: Client, queue: &QueueConfig) -> Self {
        info!(queue_url = %queue.detection_queue_url, "SQS alert publisher initialized");

        Self {
            client,
            queue_url: queue.detection_queue_url.clone(),
        }
    }

    fn is_fifo(&self) -> bool {
        self.queue_url.ends_with(".fifo")
    }
}

#[async_trait]
impl AlertPublisher for SqsAlertPublisher {
    async fn publish_alert(&self, alert: &MisconductAlert) -> Result<(), QueueError> {
        let body = serde_json::to_string(alert)?;

        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);

        if self.is_fifo() {
            let (group_id, dedup_id) = fifo_ids(alert);
            request = request
                .message_group_id(group_id)
                .message_deduplication_id(dedup_id);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| QueueError::Publish(format!("SQS send failed: {e:?}")))?;

        debug!(
            guild_id = alert.guild.id,
            message_id = resp.message_id().unwrap_or("unknown"),
            "Alert published"
        );

        Ok(())
    }
}

/// Message group and deduplication ids for FIFO detection queues.
fn fifo_ids(alert: &MisconductAlert) -> (String, String) {
    (
        alert.guild.id.to_string(),
        format!("{}-{}", alert.guild.id, alert.score),
    )
}
