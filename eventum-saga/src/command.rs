use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 发往远端目的地的命令消息
///
/// - 不返回业务数据，仅表达执行请求；执行结果经完成信号回到协调器。
/// - 建议保持语义化的“动宾结构”命名，如 `ReserveSeat`、`ReleaseSeat`。
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct CommandMessage {
    /// 命令的稳定名称（不随重构变化，用于日志、追踪与路由）
    name: String,
    /// 命令载荷
    payload: Value,
}

impl CommandMessage {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}
