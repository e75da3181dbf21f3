//! Saga 存储：持久化 saga 记录与步骤游标
//!
//! 游标更新必须带版本检查（CAS）：投递通道可能重复投递，并发的两次
//! 推进只有一次能通过版本检查，这是防止双重派发的防线。
//!
use crate::{
    error::{SagaError, SagaResult},
    saga::CommandSaga,
};
use async_trait::async_trait;
use dashmap::DashMap;
use eventum_domain::value_object::{Identifier, Version};
use std::sync::Arc;

/// Saga 记录存储协作方
#[async_trait]
pub trait SagaStore: Send + Sync {
    async fn load(&self, saga_id: &Identifier) -> SagaResult<Option<(CommandSaga, Version)>>;

    /// 带期望版本保存；`Version::new()` 表示新建记录。
    /// 期望版本不匹配返回 `CursorConflict`，成功返回新的记录版本。
    async fn save(&self, saga: &CommandSaga, expected: Version) -> SagaResult<Version>;
}

#[async_trait]
impl<T> SagaStore for Arc<T>
where
    T: SagaStore + ?Sized,
{
    async fn load(&self, saga_id: &Identifier) -> SagaResult<Option<(CommandSaga, Version)>> {
        (**self).load(saga_id).await
    }

    async fn save(&self, saga: &CommandSaga, expected: Version) -> SagaResult<Version> {
        (**self).save(saga, expected).await
    }
}

/// 简单的内存 saga 存储实现（版本检查的 CAS 语义）
#[derive(Default)]
pub struct MemorySagaStore {
    entries: DashMap<String, (CommandSaga, u64)>,
}

impl MemorySagaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SagaStore for MemorySagaStore {
    async fn load(&self, saga_id: &Identifier) -> SagaResult<Option<(CommandSaga, Version)>> {
        Ok(self
            .entries
            .get(&saga_id.normalized())
            .map(|entry| (entry.0.clone(), Version::from_value(entry.1))))
    }

    async fn save(&self, saga: &CommandSaga, expected: Version) -> SagaResult<Version> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(saga.saga_id().normalized()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get().1;
                if current != expected.value() {
                    return Err(SagaError::CursorConflict {
                        saga_id: saga.saga_id().clone(),
                    });
                }
                let next = current + 1;
                occupied.insert((saga.clone(), next));
                Ok(Version::from_value(next))
            }
            Entry::Vacant(vacant) => {
                if !expected.is_new() {
                    return Err(SagaError::CursorConflict {
                        saga_id: saga.saga_id().clone(),
                    });
                }
                vacant.insert((saga.clone(), 1));
                Ok(Version::from_value(1))
            }
        }
    }
}
