use crate::value_object::Version;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 事件元数据：事件标识、所属流与流位置
#[derive(Builder, Default, Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// 事件唯一标识符
    event_id: String,
    /// 聚合 ID，标识事件所属的聚合实例
    aggregate_id: String,
    /// 聚合类型，用于区分不同的聚合
    aggregate_type: String,
    /// 聚合版本（流位置，严格递增且无间隙）
    aggregate_version: Version,
    /// 事件发生时间
    occurred_at: DateTime<Utc>,
}

impl Metadata {
    pub fn event_id(&self) -> &str {
        &self.event_id
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

    pub fn occurred_at(&self) -> &DateTime<Utc> {
        &self.occurred_at
    }
}
