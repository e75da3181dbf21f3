use crate::value_object::{Identifier, Version};
use chrono::Utc;
use uuid::Uuid;

use super::domain_event_trait::DomainEvent;
use super::event_context::EventContext;
use super::metadata::Metadata;

/// 事件信封，包含事件载荷、元数据与业务上下文
#[derive(Debug, Clone)]
pub struct EventEnvelope<E>
where
    E: DomainEvent,
{
    pub metadata: Metadata,
    pub payload: E,
    pub context: EventContext,
}

impl<E> EventEnvelope<E>
where
    E: DomainEvent,
{
    pub fn new(
        aggregate_id: &Identifier,
        aggregate_type: &str,
        aggregate_version: Version,
        payload: E,
        context: EventContext,
    ) -> Self {
        let metadata = Metadata::builder()
            .event_id(Uuid::new_v4().to_string())
            .aggregate_id(aggregate_id.to_string())
            .aggregate_type(aggregate_type.to_string())
            .aggregate_version(aggregate_version)
            .occurred_at(Utc::now())
            .build();

        Self {
            metadata,
            payload,
            context,
        }
    }
}
