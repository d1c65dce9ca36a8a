use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{CdcResult, ErrorKind};
use crate::publisher::base::{BrokerPublisher, PublishAck};
use crate::bail;
use crate::types::CdcEvent;

/// Request timeout for a single publish.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publisher that delivers events to an HTTP endpoint.
///
/// Each event is POSTed as JSON to `{base_url}/topics/{topic}`. Response
/// statuses are mapped onto the publish error taxonomy: throttling and
/// server-side failures are transient, rejections of the message itself are
/// permanent.
pub struct WebhookPublisher {
    client: reqwest::Client,
    base_url: String,
}

impl WebhookPublisher {
    /// Creates a publisher for the given base URL.
    pub fn new(base_url: String) -> CdcResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{}", self.base_url, topic)
    }
}

#[async_trait]
impl BrokerPublisher for WebhookPublisher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn publish(&self, topic: &str, event: &CdcEvent) -> CdcResult<PublishAck> {
        let response = self
            .client
            .post(self.topic_url(topic))
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(topic = %topic, event_id = %event.event_id, "published to webhook broker");

            return Ok(PublishAck {
                topic: topic.to_string(),
                partition: None,
                offset: None,
            });
        }

        match status {
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => bail!(
                ErrorKind::BrokerBackpressure,
                "Broker asked to slow down",
                status
            ),
            StatusCode::NOT_FOUND => {
                bail!(ErrorKind::InvalidTopic, "Broker rejected the topic", topic)
            }
            StatusCode::PAYLOAD_TOO_LARGE => bail!(
                ErrorKind::MessageRejected,
                "Broker rejected the message size",
                status
            ),
            status if status.is_server_error() => bail!(
                ErrorKind::BrokerUnreachable,
                "Broker returned a server error",
                status
            ),
            status => bail!(
                ErrorKind::MessageRejected,
                "Broker rejected the message",
                status
            ),
        }
    }
}
