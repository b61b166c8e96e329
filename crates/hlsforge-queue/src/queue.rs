//! Job queue using Redis Streams.

use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use hlsforge_models::TranscodeJob;

use crate::error::{QueueError, QueueResult};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for transcode jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Minimum idle time before a pending entry can be claimed by another
    /// consumer (crash/failure redelivery)
    pub claim_min_idle: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "transcode:jobs".to_string(),
            consumer_group: "transcode:workers".to_string(),
            claim_min_idle: Duration::from_secs(300),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: std::env::var("QUEUE_STREAM")
                .unwrap_or_else(|_| "transcode:jobs".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "transcode:workers".to_string()),
            claim_min_idle: Duration::from_secs(
                std::env::var("QUEUE_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(
                    "Consumer group already exists: {}",
                    self.config.consumer_group
                );
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Publish a transcode job to the stream.
    ///
    /// The returned entry ID doubles as the delivery confirmation; the video
    /// name rides along as the partition key.
    pub async fn publish(&self, job: &TranscodeJob) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(job)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(job.partition_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::publish_failed(e.to_string()))?;

        info!(
            video_id = %job.video_id,
            video_name = %job.video_name,
            message_id = %message_id,
            "Published transcode job"
        );

        Ok(message_id)
    }

    /// Commit a job (mark as completed and drop it from the stream).
    ///
    /// Only called by the worker after the full pipeline succeeded.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Committed job: {}", message_id);
        Ok(())
    }

    /// Consume new jobs from the queue.
    ///
    /// An entry whose payload fails to decode is logged and acked
    /// immediately: a malformed message would fail identically on every
    /// redelivery, so it is dropped for good. Every other failure leaves the
    /// entry pending for claim-based redelivery.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, TranscodeJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some((message_id, job)) = self.decode_entry(entry).await {
                    jobs.push((message_id, job));
                }
            }
        }

        Ok(jobs)
    }

    /// Claim pending jobs that have been idle past the configured threshold.
    /// This redelivers jobs whose worker crashed or failed without committing.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        count: usize,
    ) -> QueueResult<Vec<(String, TranscodeJob)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(self.config.claim_min_idle.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let mut jobs = Vec::new();

        for entry in result.claimed {
            if let Some((message_id, job)) = self.decode_entry(entry).await {
                info!(message_id = %message_id, "Claimed pending job for redelivery");
                jobs.push((message_id, job));
            }
        }

        Ok(jobs)
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    /// Decode one stream entry; undecodable payloads are acked and dropped.
    async fn decode_entry(
        &self,
        entry: redis::streams::StreamId,
    ) -> Option<(String, TranscodeJob)> {
        let message_id = entry.id.clone();

        let payload = match entry.map.get("job") {
            Some(redis::Value::BulkString(payload)) => String::from_utf8_lossy(payload).to_string(),
            _ => {
                warn!(message_id = %message_id, "Stream entry has no job payload, dropping");
                self.ack(&message_id).await.ok();
                return None;
            }
        };

        match serde_json::from_str::<TranscodeJob>(&payload) {
            Ok(job) => {
                debug!(video_id = %job.video_id, "Consumed job from stream");
                Some((message_id, job))
            }
            Err(e) => {
                warn!(
                    message_id = %message_id,
                    "Failed to decode job payload, dropping permanently: {}", e
                );
                self.ack(&message_id).await.ok();
                None
            }
        }
    }
}
