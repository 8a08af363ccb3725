use redis::AsyncCommands;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::task::TaskEnvelope;

const QUEUE_KEY: &str = "vto_fitting:tasks";
const PROCESSING_KEY: &str = "vto_fitting:processing";

/// Chord and group keys expire after a day; both are ephemeral bookkeeping,
/// the durable outcome lives in fitting_result rows.
const EPHEMERAL_TTL_SECS: i64 = 86_400;

fn chord_key(chord_id: Uuid) -> String {
    format!("vto_fitting:chord:{chord_id}")
}

fn group_key(group_id: Uuid) -> String {
    format!("vto_fitting:group:{group_id}")
}

/// Redis-backed task queue with chord result collection and fan-out group
/// counters.
pub struct TaskQueue {
    client: redis::Client,
}

impl TaskQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Enqueue a task envelope.
    pub async fn enqueue(&self, envelope: &TaskEnvelope) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(envelope).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Dequeue an envelope for processing (pop with move to processing list).
    pub async fn dequeue(&self) -> Result<Option<TaskEnvelope>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let envelope: TaskEnvelope =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }

    /// Remove a finished envelope from the processing list.
    pub async fn complete(&self, envelope: &TaskEnvelope) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(envelope).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Current number of pending envelopes.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    /// Record one chord member's output at its submission index.
    pub async fn store_chord_result(
        &self,
        chord_id: Uuid,
        index: u32,
        output: &Option<String>,
    ) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let key = chord_key(chord_id);
        let value = serde_json::to_string(output).map_err(QueueError::Serialize)?;
        conn.hset::<_, _, _, ()>(&key, index, value)
            .await
            .map_err(QueueError::Redis)?;
        conn.expire::<_, ()>(&key, EPHEMERAL_TTL_SECS)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Number of chord members that have reported.
    pub async fn chord_size(&self, chord_id: Uuid) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let len: u64 = conn
            .hlen(chord_key(chord_id))
            .await
            .map_err(QueueError::Redis)?;
        Ok(len)
    }

    /// Read all reported chord outputs, keyed by submission index.
    pub async fn read_chord_results(
        &self,
        chord_id: Uuid,
    ) -> Result<HashMap<u32, Option<String>>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let raw: HashMap<u32, String> = conn
            .hgetall(chord_key(chord_id))
            .await
            .map_err(QueueError::Redis)?;

        let mut results = HashMap::with_capacity(raw.len());
        for (index, value) in raw {
            let output: Option<String> =
                serde_json::from_str(&value).map_err(QueueError::Serialize)?;
            results.insert(index, output);
        }
        Ok(results)
    }

    /// Initialize a fan-out group's remaining-chain counter.
    pub async fn init_group(&self, group_id: Uuid, chain_count: usize) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let key = group_key(group_id);
        conn.set::<_, _, ()>(&key, chain_count as i64)
            .await
            .map_err(QueueError::Redis)?;
        conn.expire::<_, ()>(&key, EPHEMERAL_TTL_SECS)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Decrement a group's remaining-chain counter; returns the new value.
    pub async fn finish_group_chain(&self, group_id: Uuid) -> Result<i64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let remaining: i64 = conn
            .decr(group_key(group_id), 1)
            .await
            .map_err(QueueError::Redis)?;
        Ok(remaining)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
