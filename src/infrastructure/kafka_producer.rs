use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TOPIC: &str = "k1s0.system.batch-import.events.v1";

pub const BATCH_CREATED: &str = "BATCH_CREATED";
pub const BATCH_FILE_ATTACHED: &str = "BATCH_FILE_ATTACHED";
pub const BATCH_STARTED: &str = "BATCH_STARTED";
pub const BATCH_PAUSED: &str = "BATCH_PAUSED";
pub const BATCH_RESUMED: &str = "BATCH_RESUMED";
pub const BATCH_RETRYING: &str = "BATCH_RETRYING";
pub const BATCH_CANCELLED: &str = "BATCH_CANCELLED";
pub const BATCH_COMPLETED: &str = "BATCH_COMPLETED";
pub const BATCH_FAILED: &str = "BATCH_FAILED";
pub const BATCH_DELETED: &str = "BATCH_DELETED";

/// KafkaConfig はジョブイベントの発行先。
#[derive(Debug, Clone, Deserialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// 省略時は librdkafka の既定値（plaintext）。
    #[serde(default)]
    pub security_protocol: Option<String>,
    #[serde(default)]
    pub sasl: Option<SaslCredentials>,
    /// 1 イベントの配送確認を待つ上限。
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaslCredentials {
    pub mechanism: String,
    pub username: String,
    pub password: SecretString,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_delivery_timeout_ms() -> u64 {
    5000
}

impl KafkaConfig {
    fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// 同じジョブのイベントが重複・順序逆転しないよう、冪等プロデューサーとして構成する。
    fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", self.brokers.join(","))
            .set("enable.idempotence", "true")
            .set("acks", "all")
            .set("message.timeout.ms", self.delivery_timeout_ms.to_string());
        if let Some(protocol) = &self.security_protocol {
            client.set("security.protocol", protocol);
        }
        if let Some(sasl) = &self.sasl {
            client
                .set("sasl.mechanism", &sasl.mechanism)
                .set("sasl.username", &sasl.username)
                .set("sasl.password", sasl.password.expose_secret());
        }
        client
    }
}

/// BatchEvent はトピックに書き込むイベント本体。キーはジョブ ID。
#[derive(Debug, Serialize)]
pub struct BatchEvent<'a> {
    pub job_id: Uuid,
    pub event_type: &'a str,
    pub payload: &'a serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl<'a> BatchEvent<'a> {
    pub fn new(job_id: Uuid, event_type: &'a str, payload: &'a serde_json::Value) -> Self {
        Self {
            job_id,
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// BatchEventPublisher はジョブのライフサイクルイベントを通知するトレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchEventPublisher: Send + Sync {
    async fn publish_batch_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// 通知を送る。失敗はログに残すだけでジョブの状態には影響させない。
pub async fn notify(
    publisher: Option<&Arc<dyn BatchEventPublisher>>,
    job_id: Uuid,
    event_type: &str,
    payload: serde_json::Value,
) {
    let Some(publisher) = publisher else {
        return;
    };
    if let Err(e) = publisher
        .publish_batch_event(job_id, event_type, &payload)
        .await
    {
        tracing::warn!(job_id = %job_id, event_type, error = %e, "failed to publish batch event");
    }
}

/// KafkaProducer はジョブイベントを 1 つのトピックに発行する。
pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    delivery_timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> anyhow::Result<Self> {
        if config.brokers.is_empty() {
            anyhow::bail!("kafka.brokers must list at least one broker");
        }
        Ok(Self {
            producer: config.client_config().create()?,
            topic: config.topic.clone(),
            delivery_timeout: config.delivery_timeout(),
        })
    }
}

#[async_trait]
impl BatchEventPublisher for KafkaProducer {
    async fn publish_batch_event(
        &self,
        job_id: Uuid,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&BatchEvent::new(job_id, event_type, payload))?;
        let key = job_id.to_string();
        self.producer
            .send(
                FutureRecord::to(&self.topic).key(&key).payload(&body),
                self.delivery_timeout,
            )
            .await
            .map_err(|(e, _)| anyhow::anyhow!("{event_type} for job {job_id} not delivered: {e}"))?;
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.producer.flush(self.delivery_timeout)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: KafkaConfig = serde_yaml::from_str("brokers: [\"localhost:9092\"]").unwrap();
        assert_eq!(config.topic, DEFAULT_TOPIC);
        assert_eq!(config.delivery_timeout_ms, 5000);
        assert!(config.security_protocol.is_none());
        assert!(config.sasl.is_none());

        let client = config.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(client.get("enable.idempotence"), Some("true"));
        assert_eq!(client.get("security.protocol"), None);
    }

    #[test]
    fn test_config_with_sasl() {
        let yaml = r#"
brokers:
  - "kafka-0.messaging.svc.cluster.local:9092"
  - "kafka-1.messaging.svc.cluster.local:9092"
topic: "imports.audit"
security_protocol: "SASL_SSL"
sasl:
  mechanism: "SCRAM-SHA-512"
  username: "batch-import"
  password: "s3cret"
delivery_timeout_ms: 2000
"#;
        let config: KafkaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.topic, "imports.audit");
        assert_eq!(config.delivery_timeout(), Duration::from_secs(2));

        let client = config.client_config();
        assert_eq!(
            client.get("bootstrap.servers"),
            Some("kafka-0.messaging.svc.cluster.local:9092,kafka-1.messaging.svc.cluster.local:9092")
        );
        assert_eq!(client.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(client.get("sasl.password"), Some("s3cret"));
        assert_eq!(client.get("message.timeout.ms"), Some("2000"));
        // Debug 出力にパスワードを含めない
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_producer_requires_brokers() {
        let config: KafkaConfig = serde_yaml::from_str("brokers: []").unwrap();
        assert!(KafkaProducer::new(&config).is_err());
    }

    #[test]
    fn test_event_body() {
        let job_id = Uuid::new_v4();
        let payload = serde_json::json!({ "total_rows": 3 });
        let body = serde_json::to_value(BatchEvent::new(job_id, BATCH_STARTED, &payload)).unwrap();
        assert_eq!(body["job_id"], job_id.to_string());
        assert_eq!(body["event_type"], "BATCH_STARTED");
        assert_eq!(body["payload"]["total_rows"], 3);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_notify_publishes_event() {
        let job_id = Uuid::new_v4();
        let mut mock = MockBatchEventPublisher::new();
        mock.expect_publish_batch_event()
            .withf(move |id, event_type, payload| {
                *id == job_id && event_type.to_string() == BATCH_STARTED && payload["total_rows"] == 5
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let publisher: Arc<dyn BatchEventPublisher> = Arc::new(mock);

        notify(
            Some(&publisher),
            job_id,
            BATCH_STARTED,
            serde_json::json!({"total_rows": 5}),
        )
        .await;
    }

    #[tokio::test]
    async fn test_notify_swallows_publish_error() {
        let mut mock = MockBatchEventPublisher::new();
        mock.expect_publish_batch_event()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("broker connection refused")));
        let publisher: Arc<dyn BatchEventPublisher> = Arc::new(mock);

        notify(Some(&publisher), Uuid::new_v4(), BATCH_FAILED, serde_json::json!({})).await;
    }

    #[tokio::test]
    async fn test_notify_without_publisher_is_noop() {
        notify(None, Uuid::new_v4(), BATCH_CREATED, serde_json::json!({})).await;
    }
}
