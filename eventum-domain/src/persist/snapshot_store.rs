//! 快照存储协议与策略
//!
//! 定义聚合快照读写接口与落盘策略（按版本间隔）。
//! 每个聚合实例只保留最新一份快照；更旧版本的保留由外部存储管理。
//!
use crate::{error::DomainResult as Result, persist::SerializedSnapshot, value_object::Version};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 快照存储协作方
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<SerializedSnapshot>>;

    async fn save(&self, snapshot: SerializedSnapshot) -> Result<()>;
}

#[async_trait]
impl<T> SnapshotStore for Arc<T>
where
    T: SnapshotStore + ?Sized,
{
    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<SerializedSnapshot>> {
        (**self).load(aggregate_type, aggregate_id).await
    }

    async fn save(&self, snapshot: SerializedSnapshot) -> Result<()> {
        (**self).save(snapshot).await
    }
}

/// 快照策略：`(上次快照版本, 当前版本)` 的纯函数，每次成功提交后评估一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotPolicy {
    #[default]
    Never,
    /// 自上次快照起累积至少 n 个版本后落盘
    Every(u64),
}

impl SnapshotPolicy {
    pub fn should_snapshot(&self, last_snapshot: Version, current: Version) -> bool {
        match self {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::Every(interval) => {
                let interval = (*interval).max(1);
                current.value().saturating_sub(last_snapshot.value()) >= interval
            }
        }
    }
}

/// 简单的内存快照存储实现（最新一份覆盖旧快照）
#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<(String, String), SerializedSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
    ) -> Result<Option<SerializedSnapshot>> {
        let guard = self.snapshots.lock().expect("snapshot store lock poisoned");
        Ok(guard
            .get(&(aggregate_type.to_string(), aggregate_id.to_string()))
            .cloned())
    }

    async fn save(&self, snapshot: SerializedSnapshot) -> Result<()> {
        let mut guard = self.snapshots.lock().expect("snapshot store lock poisoned");
        guard.insert(
            (
                snapshot.aggregate_type().to_string(),
                snapshot.aggregate_id().to_string(),
            ),
            snapshot,
        );
        Ok(())
    }
}
