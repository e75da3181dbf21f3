//! 事件存储协议与内存实现
//!
//! 定义按流追加/读取的事件日志抽象：追加是带期望版本检查的单次条件调用，
//! 流内位置严格递增且无间隙。内存实现用于测试与本地开发。
//!
use crate::{
    error::{DomainError, DomainResult as Result},
    persist::SerializedEvent,
    value_object::{Identifier, Version},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 流名派生：聚合类型 + 标识
pub fn stream_id(aggregate_type: &str, id: &Identifier) -> String {
    format!("{aggregate_type}:{id}")
}

/// 追加时的期望版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// 期望流头正好位于该版本（`Version::new()` 表示流不存在）
    Exact(Version),
    /// 绕过版本检查，接到当前流头之后（`Ignore` 策略的显式选择）
    Any,
}

/// 事件日志协作方：按流条件追加与读取
#[async_trait]
pub trait EventStore: Send + Sync {
    /// 条件追加。期望版本不匹配返回 `VersionConflict`；
    /// 追加在存储层必须是原子的单次调用，成功返回新的流版本。
    async fn append(
        &self,
        stream_id: &str,
        expected: Expected,
        events: Vec<SerializedEvent>,
    ) -> Result<Version>;

    /// 读取流中位置大于 `after` 的事件（按位置升序）
    async fn read(&self, stream_id: &str, after: Version) -> Result<Vec<SerializedEvent>>;
}

#[async_trait]
impl<T> EventStore for Arc<T>
where
    T: EventStore + ?Sized,
{
    async fn append(
        &self,
        stream_id: &str,
        expected: Expected,
        events: Vec<SerializedEvent>,
    ) -> Result<Version> {
        (**self).append(stream_id, expected, events).await
    }

    async fn read(&self, stream_id: &str, after: Version) -> Result<Vec<SerializedEvent>> {
        (**self).read(stream_id, after).await
    }
}

/// 简单的内存事件存储实现
#[derive(Default)]
pub struct MemoryEventStore {
    streams: Mutex<HashMap<String, Vec<SerializedEvent>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append(
        &self,
        stream_id: &str,
        expected: Expected,
        events: Vec<SerializedEvent>,
    ) -> Result<Version> {
        let mut guard = self.streams.lock().expect("event store lock poisoned");
        let stream = guard.entry(stream_id.to_string()).or_default();

        let current = stream
            .last()
            .map(|e| e.aggregate_version())
            .unwrap_or_default();

        if let Expected::Exact(version) = expected {
            if version != current {
                return Err(DomainError::VersionConflict {
                    stream_id: stream_id.to_string(),
                    expected: version,
                    actual: current,
                });
            }
        }

        // 追加是原子的：先整体校验，再整体落盘
        let mut next = current;
        match expected {
            // 精确模式要求调用方已把事件编号到连续位置
            Expected::Exact(_) => {
                for event in &events {
                    next = next.next();
                    if event.aggregate_version() != next {
                        return Err(DomainError::EventStore {
                            reason: format!(
                                "gap in stream {stream_id}: expected {next}, got {}",
                                event.aggregate_version()
                            ),
                        });
                    }
                }
                stream.extend(events);
            }
            // 绕过检查时重排到当前流头之后，保持位置无间隙
            Expected::Any => {
                for event in events {
                    next = next.next();
                    stream.push(event.with_aggregate_version(next));
                }
            }
        }

        Ok(next)
    }

    async fn read(&self, stream_id: &str, after: Version) -> Result<Vec<SerializedEvent>> {
        let guard = self.streams.lock().expect("event store lock poisoned");
        Ok(guard
            .get(stream_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.aggregate_version() > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
