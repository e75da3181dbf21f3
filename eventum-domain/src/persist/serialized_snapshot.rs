use crate::{
    aggregate::AggregateState,
    error::{DomainError, DomainResult as Result},
    value_object::{Identifier, Version},
};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 快照持久化模型：聚合状态在某一流版本处的序列化捕获
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct SerializedSnapshot {
    aggregate_id: String,
    aggregate_type: String,
    aggregate_version: Version,
    payload: Value,
}

impl SerializedSnapshot {
    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_version(&self) -> Version {
        self.aggregate_version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// 将快照反序列化为聚合状态
    pub fn to_state<S>(&self) -> Result<S>
    where
        S: AggregateState,
    {
        if S::TYPE != self.aggregate_type {
            return Err(DomainError::TypeMismatch {
                expected: S::TYPE.to_string(),
                found: self.aggregate_type.clone(),
            });
        }

        let state = serde_json::from_value(self.payload.clone())?;
        Ok(state)
    }

    /// 从聚合状态创建快照（纯函数，不触碰在线状态）
    pub fn from_state<S>(id: &Identifier, version: Version, state: &S) -> Result<Self>
    where
        S: AggregateState,
    {
        Ok(Self {
            aggregate_id: id.to_string(),
            aggregate_type: S::TYPE.to_string(),
            aggregate_version: version,
            payload: serde_json::to_value(state)?,
        })
    }
}
