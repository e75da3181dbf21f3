//! 命令投递协作方
//!
//! 定义把命令送往命名目的地的统一抽象。协调器代表 saga 派发时，
//! 头信息中总是带有 saga 标识与步骤下标。
//!
use crate::command::CommandMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// 代表 saga 派发时附带的关联头
pub const SAGA_ID_HEADER: &str = "saga-id";
pub const SAGA_STEP_HEADER: &str = "saga-step";

/// 投递回执：投递通道受理派发后返回的不透明凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    receipt_id: String,
}

impl DeliveryReceipt {
    pub fn new(receipt_id: impl Into<String>) -> Self {
        Self {
            receipt_id: receipt_id.into(),
        }
    }

    pub fn receipt_id(&self) -> &str {
        &self.receipt_id
    }
}

/// 投递通道：发送命令到命名目的地
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// 返回即表示投递通道已受理该派发（不等待远端执行完成）
    async fn send(
        &self,
        destination: &str,
        command: &CommandMessage,
        headers: &HashMap<String, String>,
    ) -> anyhow::Result<DeliveryReceipt>;
}

#[async_trait]
impl<T> CommandDispatcher for Arc<T>
where
    T: CommandDispatcher + ?Sized,
{
    async fn send(
        &self,
        destination: &str,
        command: &CommandMessage,
        headers: &HashMap<String, String>,
    ) -> anyhow::Result<DeliveryReceipt> {
        (**self).send(destination, command, headers).await
    }
}
