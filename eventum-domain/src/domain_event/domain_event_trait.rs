use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 领域事件载荷需要满足的通用能力边界
///
/// `event_type` 是显式的类型标签：状态重建时按标签分发到对应的处理分支，
/// 未注册的标签被静默跳过（向前兼容）。
pub trait DomainEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync
{
    /// 事件类型标签（形如 `GreetingEvent.Created` 或自定义类型名）
    fn event_type(&self) -> &'static str;

    /// 事件载荷版本（用于版本兼容）
    fn event_version(&self) -> u32 {
        1
    }
}
