//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨实例同步消息，以及基于 Redis 发布订阅的同步中继。

use crate::client::CacheCoordinator;
use crate::error::Result;
use crate::events::CacheEventKind;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 同步动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncAction {
    Invalidate { key: String },
    InvalidatePattern { pattern: String },
    InvalidateTags { tags: Vec<String> },
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Option<u64>,
    },
}

/// 跨实例同步消息
///
/// `origin` 是发出消息的协调器实例 id，实例会忽略自己发出的消息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSyncMessage {
    pub origin: Uuid,
    #[serde(flatten)]
    pub action: SyncAction,
}

impl CacheSyncMessage {
    pub fn new(origin: Uuid, action: SyncAction) -> Self {
        Self { origin, action }
    }

    /// 来自外部系统、没有实例来源的消息
    pub fn external(action: SyncAction) -> Self {
        Self::new(Uuid::nil(), action)
    }

    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// 同步中继
///
/// 把本实例的 `cache:broadcast` 事件发布到 Redis 频道，
/// 并把频道上收到的消息交给 `handle_cache_sync` 处理。
pub struct SyncRelay {
    client: redis::Client,
    channel: String,
}

impl SyncRelay {
    /// 创建新的同步中继
    ///
    /// # 参数
    ///
    /// * `client` - Redis客户端
    /// * `channel` - 频道名称
    pub fn new(client: redis::Client, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }

    /// 启动中继
    ///
    /// 发布和订阅两个循环都派生在协调器的后台任务上，随 `shutdown()` 退出。
    #[instrument(skip(self, coordinator), fields(channel = %self.channel), level = "info")]
    pub async fn start(self, coordinator: &CacheCoordinator) -> Result<()> {
        let publisher = self.client.get_connection_manager().await?;
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        let supervisor = coordinator.supervisor();
        let cancel = supervisor.cancellation_token();

        let mut events = coordinator.subscribe();
        let channel = self.channel.clone();
        let publish_cancel = cancel.clone();
        supervisor.spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = publish_cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if let CacheEventKind::Broadcast { message } = event.kind {
                            publish(&publisher, &channel, &message).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SyncRelay: publisher lagged, {} event(s) dropped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("SyncRelay: publisher stopped");
        });

        let subscriber = coordinator.clone();
        supervisor.spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = stream.next() => msg,
                };
                let Some(msg) = msg else {
                    warn!("SyncRelay: subscription stream ended");
                    break;
                };
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        debug!("SyncRelay: unreadable payload: {}", e);
                        continue;
                    }
                };
                let message = match CacheSyncMessage::from_payload(&payload) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("SyncRelay: malformed sync message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = subscriber.handle_cache_sync(message).await {
                    warn!("SyncRelay: failed to apply sync message: {}", e);
                }
            }
            debug!("SyncRelay: subscriber stopped");
        });

        info!("SyncRelay started");
        Ok(())
    }
}

async fn publish(
    manager: &redis::aio::ConnectionManager,
    channel: &str,
    message: &CacheSyncMessage,
) {
    let payload = match message.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!("SyncRelay: cannot encode sync message: {}", e);
            return;
        }
    };
    let mut conn = manager.clone();
    let published: redis::RedisResult<i64> = redis::cmd("PUBLISH")
        .arg(channel)
        .arg(payload)
        .query_async(&mut conn)
        .await;
    match published {
        Ok(receivers) => debug!("SyncRelay: published to {} receiver(s)", receivers),
        Err(e) => warn!("SyncRelay: publish failed: {}", e),
    }
}
