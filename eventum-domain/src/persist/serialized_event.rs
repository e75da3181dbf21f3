//! 事件持久化模型（SerializedEvent）
//!
//! 定义事件在持久化层的标准形态与在 `EventEnvelope` 间的转换。
//! 上下文头（关联/因果/命令/主体）展开为独立列，便于存储层按头查询。
//!
use crate::{
    domain_event::{DomainEvent, EventContext, EventEnvelope, Metadata},
    error::DomainResult,
    value_object::Version,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// 事件唯一标识符
    event_id: String,
    /// 事件类型标签，用于区分不同的事件
    event_type: String,
    /// 事件载荷版本，用于版本兼容
    event_version: u32,
    /// 聚合 ID，标识事件所属的聚合实例
    aggregate_id: String,
    /// 聚合类型，用于区分不同的聚合
    aggregate_type: String,
    /// 聚合版本（流位置），用于乐观锁和并发控制
    aggregate_version: Version,
    /// 关联 ID，用于将多个事件关联到同一个业务操作
    correlation_id: Option<String>,
    /// 因果 ID，用于表示事件的触发来源
    causation_id: Option<String>,
    /// 触发事件的命令 ID
    command_id: Option<String>,
    /// 触发事件的主体类型（如用户、系统等）
    actor_type: Option<String>,
    /// 触发事件的主体 ID
    actor_id: Option<String>,
    /// 事件发生时间
    occurred_at: DateTime<Utc>,
    /// 事件负载，存储事件的具体数据
    payload: Value,
}

impl SerializedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_version(&self) -> Version {
        self.aggregate_version
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn command_id(&self) -> Option<&str> {
        self.command_id.as_deref()
    }

    pub fn actor_type(&self) -> Option<&str> {
        self.actor_type.as_deref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 以新的流位置重建事件（冲突合并与 `Ignore` 重排时使用）
    pub fn with_aggregate_version(mut self, version: Version) -> Self {
        self.aggregate_version = version;
        self
    }
}

impl<E> TryFrom<&EventEnvelope<E>> for SerializedEvent
where
    E: DomainEvent,
{
    type Error = serde_json::Error;

    fn try_from(envelope: &EventEnvelope<E>) -> Result<Self, Self::Error> {
        Ok(SerializedEvent {
            event_id: envelope.metadata.event_id().to_string(),
            event_type: envelope.payload.event_type().to_string(),
            event_version: envelope.payload.event_version(),
            aggregate_id: envelope.metadata.aggregate_id().to_string(),
            aggregate_type: envelope.metadata.aggregate_type().to_string(),
            aggregate_version: envelope.metadata.aggregate_version(),
            correlation_id: envelope.context.correlation_id().map(|s| s.to_string()),
            causation_id: envelope.context.causation_id().map(|s| s.to_string()),
            command_id: envelope.context.command_id().map(|s| s.to_string()),
            actor_type: envelope.context.actor_type().map(|s| s.to_string()),
            actor_id: envelope.context.actor_id().map(|s| s.to_string()),
            occurred_at: *envelope.metadata.occurred_at(),
            payload: serde_json::to_value(&envelope.payload)?,
        })
    }
}

impl<E> TryFrom<&SerializedEvent> for EventEnvelope<E>
where
    E: DomainEvent,
{
    type Error = serde_json::Error;

    fn try_from(value: &SerializedEvent) -> Result<Self, Self::Error> {
        let metadata = Metadata::builder()
            .event_id(value.event_id.clone())
            .aggregate_id(value.aggregate_id.clone())
            .aggregate_type(value.aggregate_type.clone())
            .aggregate_version(value.aggregate_version)
            .occurred_at(value.occurred_at)
            .build();

        let payload: E = serde_json::from_value(value.payload.clone())?;

        let context = EventContext::builder()
            .maybe_correlation_id(value.correlation_id.clone())
            .maybe_causation_id(value.causation_id.clone())
            .maybe_command_id(value.command_id.clone())
            .maybe_actor_type(value.actor_type.clone())
            .maybe_actor_id(value.actor_id.clone())
            .build();

        Ok(EventEnvelope {
            metadata,
            payload,
            context,
        })
    }
}

pub fn serialize_events<E>(events: &[EventEnvelope<E>]) -> DomainResult<Vec<SerializedEvent>>
where
    E: DomainEvent,
{
    let events = events
        .iter()
        .map(SerializedEvent::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}
