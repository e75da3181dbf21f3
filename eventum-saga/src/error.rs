use crate::command::CommandMessage;
use crate::saga::SagaStatus;
use eventum_domain::value_object::Identifier;
use thiserror::Error;

/// Saga 层统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SagaError {
    /// 预期中的补偿结局：下游失败、补偿已派发完毕。
    /// 上抛给原始调用语境，便于上层做出反应（如通知用户）。
    #[error("saga was aborted: saga={saga_id}")]
    WasAborted {
        saga_id: Identifier,
        originating: Option<CommandMessage>,
    },

    /// 补偿派发本身失败：永久性错误，可能存在未补偿的副作用，
    /// 需要人工介入，绝不允许静默吞掉。
    #[error("saga abortion failed: saga={saga_id}, reason={reason}")]
    AbortionFailure {
        saga_id: Identifier,
        originating: Option<CommandMessage>,
        reason: String,
    },

    #[error("unknown saga: {0}")]
    UnknownSaga(Identifier),

    #[error("invalid saga state: saga={saga_id}, status={status:?}, operation={operation}")]
    InvalidState {
        saga_id: Identifier,
        status: SagaStatus,
        operation: &'static str,
    },

    #[error("out-of-order step result: saga={saga_id}, cursor={cursor}, step={step_index}")]
    OutOfOrder {
        saga_id: Identifier,
        cursor: usize,
        step_index: usize,
    },

    /// 游标的版本检查失败（并发投递已推进了同一 saga）
    #[error("saga cursor conflict: saga={saga_id}")]
    CursorConflict { saga_id: Identifier },

    #[error("dispatch failed: saga={saga_id}, step={step_index}, reason={reason}")]
    Dispatch {
        saga_id: Identifier,
        step_index: usize,
        reason: String,
    },

    #[error("saga store error: {reason}")]
    Store { reason: String },
}

/// 统一 Result 类型别名
pub type SagaResult<T> = Result<T, SagaError>;
