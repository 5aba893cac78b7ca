//! Broker client: a durable FIFO request list plus a per-submission result
//! channel, both on a shared Redis instance.
//!
//! The split is deliberate. The request side needs durability and load
//! distribution across workers, so it is a list consumed with an atomic
//! blocking pop. The result side needs a low-latency rendezvous with exactly
//! one waiting caller, so it is a pub/sub channel backed by a short-TTL key:
//! the verdict is stored first and published second, letting a subscriber
//! that arrives late still fetch the last verdict.

use crate::config::QueueConfig;
use crate::data::{JudgeRequest, JudgeResult};
use crate::prelude::*;
use async_std::channel::{bounded, Receiver};
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Poll window for one blocking pop attempt; an empty window is not an
/// error, the caller loops and re-checks cancellation.
const POP_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a published verdict stays fetchable for late subscribers.
const RESULT_TTL_SECS: u64 = 300;

/// Worker-side view of the broker. The trait seam exists so the worker loop
/// can be exercised against a mock.
#[async_trait::async_trait]
pub trait Broker {
    /// Blocking dequeue; `Ok(None)` on an empty poll window.
    async fn pop(&mut self) -> Result<Option<JudgeRequest>>;
    /// Fire-and-forget verdict delivery on the submission's channel.
    async fn publish_result(&mut self, result: &JudgeResult) -> Result<()>;
    /// Liveness probe against the broker connection.
    async fn health(&mut self) -> Result<()>;
}

pub struct RedisQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    queue_name: String,
}

impl RedisQueue {
    pub async fn connect(cfg: &QueueConfig) -> Result<Self> {
        let client = redis::Client::open(cfg.url())?;
        let conn = client.get_multiplexed_async_std_connection().await?;
        Ok(Self {
            client,
            conn,
            queue_name: cfg.queue_name.clone(),
        })
    }

    /// Name of the result channel (and durable verdict key) for one
    /// submission.
    pub fn result_channel(submission_id: &str) -> String {
        format!("judge_result_{}", submission_id)
    }

    /// Enqueue a job. Used by the enqueuing side, not by the worker.
    pub async fn push(&mut self, request: &JudgeRequest) -> Result<()> {
        let payload = serde_json::to_string(request)?;
        let _: () = self.conn.lpush(&self.queue_name, payload).await?;
        Ok(())
    }

    /// One-shot subscription to a submission's verdict: delivers at most
    /// one message, then closes. The durable key is checked first so a
    /// verdict published moments earlier is not lost.
    pub async fn subscribe_results(&self, submission_id: &str) -> Receiver<JudgeResult> {
        let (tx, rx) = bounded(1);
        let client = self.client.clone();
        let channel = Self::result_channel(submission_id);

        async_std::task::spawn(async move {
            if let Ok(mut conn) = client.get_multiplexed_async_std_connection().await {
                let cached: Option<String> = conn.get(&channel).await.unwrap_or(None);
                if let Some(payload) = cached {
                    if let Ok(result) = serde_json::from_str(&payload) {
                        let _ = tx.send(result).await;
                        return;
                    }
                }
            }

            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(e) => {
                    warn!("cannot open result subscription for {}: {}", channel, e);
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(&channel).await {
                warn!("cannot subscribe to {}: {}", channel, e);
                return;
            }
            let mut messages = pubsub.on_message();
            if let Some(message) = messages.next().await {
                if let Ok(payload) = message.get_payload::<String>() {
                    if let Ok(result) = serde_json::from_str(&payload) {
                        let _ = tx.send(result).await;
                    }
                }
            }
        });

        rx
    }

    /// Release the broker connection.
    pub fn close(self) {}
}

#[async_trait::async_trait]
impl Broker for RedisQueue {
    async fn pop(&mut self) -> Result<Option<JudgeRequest>> {
        let popped: Option<(String, String)> = self
            .conn
            .brpop(&self.queue_name, POP_TIMEOUT.as_secs_f64())
            .await?;
        match popped {
            None => Ok(None),
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
        }
    }

    async fn publish_result(&mut self, result: &JudgeResult) -> Result<()> {
        let payload = serde_json::to_string(result)?;
        let channel = Self::result_channel(&result.submission_id);
        // Store, then notify.
        let _: () = self
            .conn
            .set_ex(&channel, &payload, RESULT_TTL_SECS)
            .await?;
        let _: () = self.conn.publish(&channel, &payload).await?;
        Ok(())
    }

    async fn health(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_channel_is_derived_from_the_submission_id() {
        assert_eq!(
            RedisQueue::result_channel("abc-123"),
            "judge_result_abc-123"
        );
    }

    #[test]
    fn distinct_submissions_use_distinct_channels() {
        assert_ne!(
            RedisQueue::result_channel("a"),
            RedisQueue::result_channel("b")
        );
    }
}
