//! 带外通道协作方
//!
//! `raise` 产生的事件写入独立的追加日志：即发即忘，无版本检查，
//! 本核心不回读。典型用途：审计、分析等外部消费。
//!
use crate::persist::SerializedEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 带外通道：按通道名追加事件
#[async_trait]
pub trait OutOfBandChannel: Send + Sync {
    async fn append(&self, channel: &str, events: Vec<SerializedEvent>) -> anyhow::Result<()>;
}

#[async_trait]
impl<T> OutOfBandChannel for Arc<T>
where
    T: OutOfBandChannel + ?Sized,
{
    async fn append(&self, channel: &str, events: Vec<SerializedEvent>) -> anyhow::Result<()> {
        (**self).append(channel, events).await
    }
}

/// 简单的内存带外通道实现
#[derive(Default)]
pub struct MemoryOutOfBandChannel {
    channels: Mutex<HashMap<String, Vec<SerializedEvent>>>,
}

impl MemoryOutOfBandChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取某通道的全部事件（测试与本地开发用）
    pub fn events(&self, channel: &str) -> Vec<SerializedEvent> {
        self.channels
            .lock()
            .expect("out-of-band lock poisoned")
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl OutOfBandChannel for MemoryOutOfBandChannel {
    async fn append(&self, channel: &str, events: Vec<SerializedEvent>) -> anyhow::Result<()> {
        let mut guard = self.channels.lock().expect("out-of-band lock poisoned");
        guard.entry(channel.to_string()).or_default().extend(events);
        Ok(())
    }
}
