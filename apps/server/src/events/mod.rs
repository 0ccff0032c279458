//! Task status event fan-out
//!
//! Every persisted status transition of a background task is published
//! here so connected clients can render live progress. Distribution uses
//! Redis pub/sub for multi-instance deployments, with an in-memory
//! fallback for single-instance mode when Redis is unavailable.
//!
//! Delivery is fire-and-forget: a task's status is always persisted before
//! its event is published, so a subscriber that missed an event can simply
//! re-read storage and never observes a state the database has not reached.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::BackgroundTask;

/// Default channel capacity for broadcast channels
const BROADCAST_CAPACITY: usize = 256;

/// One status transition of one task.
///
/// `track_id` is set only on the `Complete` transition of a task whose
/// executor produced a new track, so clients can jump straight to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusEvent {
    pub task: BackgroundTask,
    pub track_id: Option<Uuid>,
}

impl TaskStatusEvent {
    pub fn new(task: BackgroundTask, track_id: Option<Uuid>) -> Self {
        Self { task, track_id }
    }
}

/// Task event pub/sub with Redis + in-memory fallback
#[derive(Clone)]
pub struct TaskEventBus {
    inner: Arc<TaskEventBusInner>,
}

enum TaskEventBusInner {
    /// Redis-backed pub/sub for multi-instance deployments
    Redis(RedisEventBus),
    /// In-memory pub/sub for single-instance mode
    InMemory(InMemoryEventBus),
}

impl TaskEventBus {
    /// Create a new event bus backed by Redis
    pub fn new_with_redis(client: redis::Client) -> Self {
        Self {
            inner: Arc::new(TaskEventBusInner::Redis(RedisEventBus::new(client))),
        }
    }

    /// Create a new in-memory event bus (single instance mode)
    pub fn new_in_memory() -> Self {
        Self {
            inner: Arc::new(TaskEventBusInner::InMemory(InMemoryEventBus::new(
                BROADCAST_CAPACITY,
            ))),
        }
    }

    /// Try to create with Redis, fall back to in-memory
    pub async fn try_with_redis(redis_url: &str) -> Self {
        match redis::Client::open(redis_url) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
                    if pong.is_ok() {
                        tracing::info!("Redis connected for task event distribution");
                        return Self::new_with_redis(client);
                    }
                    tracing::warn!("Redis did not answer PING for task events");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis connection failed for task events");
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Redis client creation failed for task events");
            }
        }

        tracing::warn!("Using in-memory task events (single instance mode only)");
        Self::new_in_memory()
    }

    /// Publish a status event for the task's owning user
    pub async fn publish(&self, event: TaskStatusEvent) {
        let user_id = event.task.user_id;
        match &*self.inner {
            TaskEventBusInner::Redis(redis) => redis.publish(user_id, event).await,
            TaskEventBusInner::InMemory(memory) => memory.publish(user_id, event),
        }
    }

    /// Subscribe to task events for a specific user
    pub async fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<TaskStatusEvent> {
        match &*self.inner {
            TaskEventBusInner::Redis(redis) => redis.subscribe(user_id).await,
            TaskEventBusInner::InMemory(memory) => memory.subscribe(user_id),
        }
    }

    /// Check if we're using Redis (multi-instance capable)
    pub fn is_redis_backed(&self) -> bool {
        matches!(&*self.inner, TaskEventBusInner::Redis(_))
    }
}

/// Redis-backed pub/sub implementation
struct RedisEventBus {
    client: redis::Client,
    /// Local broadcast for redistribution to local subscribers
    local_sender: broadcast::Sender<(Uuid, TaskStatusEvent)>,
}

impl RedisEventBus {
    fn new(client: redis::Client) -> Self {
        let (local_sender, _) = broadcast::channel(BROADCAST_CAPACITY);

        let bus = Self {
            client,
            local_sender,
        };
        bus.start_listener();
        bus
    }

    fn start_listener(&self) {
        let client = self.client.clone();
        let sender = self.local_sender.clone();

        tokio::spawn(async move {
            const MAX_RECONNECT_DELAY_SECS: u64 = 60;

            let mut delay_secs = 1u64;

            loop {
                match Self::run_listener(&client, &sender).await {
                    Ok(()) => {
                        tracing::warn!("Task event listener disconnected, reconnecting...");
                        delay_secs = 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            delay_secs = delay_secs,
                            "Task event listener error, reconnecting..."
                        );
                    }
                }

                tokio::time::sleep(tokio::time::Duration::from_secs(delay_secs)).await;
                delay_secs = (delay_secs * 2).min(MAX_RECONNECT_DELAY_SECS);
            }
        });
    }

    async fn run_listener(
        client: &redis::Client,
        sender: &broadcast::Sender<(Uuid, TaskStatusEvent)>,
    ) -> Result<(), redis::RedisError> {
        use futures_util::StreamExt;

        let conn = client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();

        pubsub.psubscribe("tasks:user:*").await?;

        let mut stream = pubsub.on_message();

        while let Some(msg) = stream.next().await {
            let channel: String = msg.get_channel_name().to_string();
            let payload: Vec<u8> = msg.get_payload_bytes().to_vec();

            // Channel format: tasks:user:{user_id}
            if let Some(user_id_str) = channel.strip_prefix("tasks:user:") {
                if let Ok(user_id) = Uuid::parse_str(user_id_str) {
                    if let Ok(event) = serde_json::from_slice::<TaskStatusEvent>(&payload) {
                        let _ = sender.send((user_id, event));
                    }
                }
            }
        }

        Ok(())
    }

    async fn publish(&self, user_id: Uuid, event: TaskStatusEvent) {
        let channel = format!("tasks:user:{}", user_id);

        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize task event");
                return;
            }
        };

        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let result: Result<(), _> = redis::cmd("PUBLISH")
                    .arg(&channel)
                    .arg(&payload)
                    .query_async(&mut conn)
                    .await;

                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to publish task event to Redis");
                    let _ = self.local_sender.send((user_id, event));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to get Redis connection for task event");
                let _ = self.local_sender.send((user_id, event));
            }
        }
    }

    async fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<TaskStatusEvent> {
        // Filtered receiver that only sees events for this user
        let (tx, rx) = broadcast::channel(BROADCAST_CAPACITY);
        let mut global_rx = self.local_sender.subscribe();

        tokio::spawn(async move {
            while let Ok((event_user_id, event)) = global_rx.recv().await {
                if event_user_id == user_id && tx.send(event).is_err() {
                    // No more receivers, stop filtering
                    break;
                }
            }
        });

        rx
    }
}

/// In-memory pub/sub implementation for single-instance mode
struct InMemoryEventBus {
    /// Per-user broadcast channels
    channels: dashmap::DashMap<Uuid, broadcast::Sender<TaskStatusEvent>>,
    capacity: usize,
}

impl InMemoryEventBus {
    fn new(capacity: usize) -> Self {
        Self {
            channels: dashmap::DashMap::new(),
            capacity,
        }
    }

    fn publish(&self, user_id: Uuid, event: TaskStatusEvent) {
        if let Some(sender) = self.channels.get(&user_id) {
            // Ignore send errors (no receivers)
            let _ = sender.send(event);
        }
    }

    fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<TaskStatusEvent> {
        self.channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}
