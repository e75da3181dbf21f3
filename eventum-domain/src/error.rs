//! 领域层统一错误定义
//!
//! 聚焦序列化、事件存储、快照、乐观并发与业务规则校验等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use crate::value_object::Version;
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },

    // --- 事件存储/快照 ---
    #[error("event store error: {reason}")]
    EventStore { reason: String },
    #[error("snapshot store error: {reason}")]
    SnapshotStore { reason: String },

    // --- 乐观并发 ---
    #[error("version conflict: stream={stream_id}, expected={expected}, actual={actual}")]
    VersionConflict {
        stream_id: String,
        expected: Version,
        actual: Version,
    },
    #[error("concurrency conflict: stream={stream_id}, attempts={attempts}")]
    ConcurrencyConflict { stream_id: String, attempts: u32 },

    // --- 聚合生命周期 ---
    #[error("stream not found: {stream_id}")]
    NotFound { stream_id: String },
    #[error("stream already exists: {stream_id}")]
    Conflict { stream_id: String },

    // --- 领域规则 ---
    #[error("business rule violated: rule={rule}, {message}")]
    BusinessRuleViolation { rule: String, message: String },

    // --- 通用 ---
    #[error("invalid aggregate id: {0}")]
    InvalidAggregateId(String),
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;
