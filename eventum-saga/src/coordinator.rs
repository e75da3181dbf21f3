//! Saga 协调器
//!
//! 编排“持久化游标 → 派发命令 → 等待完成信号”的推进循环：
//! - `start`：落盘记录后派发第一个命令（即发即走，不阻塞等待全部完成）；
//! - `advance`：外部完成信号订阅方驱动的稳定推进入口；
//! - `on_step_result`：投递通道回执的回调入口，重复信号是无操作；
//! - 下游失败时反序派发已完成步骤的补偿命令。
//!
//! 游标总是先于派发落盘：并发重复投递下只有一次推进能通过存储的
//! 版本检查，另一次观察到 `CursorConflict` 并退化为无操作。
//!
use crate::{
    command::CommandMessage,
    dispatcher::{CommandDispatcher, DeliveryReceipt, SAGA_ID_HEADER, SAGA_STEP_HEADER},
    error::{SagaError, SagaResult},
    saga::{CommandSaga, SagaStatus},
    store::SagaStore,
};
use eventum_domain::value_object::{Identifier, Version};
use std::collections::HashMap;
use std::sync::Arc;

/// 一次推进的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaProgress {
    /// 已派发给定下标的步骤
    Dispatched { step_index: usize },
    /// 全部步骤完成
    Completed,
    /// 重复投递，未产生任何动作
    Duplicate,
}

/// 面向应用层的 saga 协调器
///
/// - `D`：命令投递协作方
/// - `S`：saga 记录存储协作方
pub struct SagaCoordinator<D, S>
where
    D: CommandDispatcher,
    S: SagaStore,
{
    dispatcher: Arc<D>,
    store: Arc<S>,
}

impl<D, S> SagaCoordinator<D, S>
where
    D: CommandDispatcher,
    S: SagaStore,
{
    pub fn new(dispatcher: Arc<D>, store: Arc<S>) -> Self {
        Self { dispatcher, store }
    }

    /// 启动 saga：落盘记录（游标 0）后派发第一个命令。
    ///
    /// 返回即表示首个派发已被投递通道受理；其余命令随完成信号逐个派发。
    /// 空命令列表直接落盘为 `Completed`，不派发任何命令。
    pub async fn start(&self, mut saga: CommandSaga) -> SagaResult<SagaProgress> {
        if saga.status() != SagaStatus::Building {
            return Err(SagaError::InvalidState {
                saga_id: saga.saga_id().clone(),
                status: saga.status(),
                operation: "start",
            });
        }

        if saga.steps().is_empty() {
            saga.set_status(SagaStatus::Completed);
            self.store.save(&saga, Version::new()).await?;
            return Ok(SagaProgress::Completed);
        }

        saga.set_status(SagaStatus::Started);
        // 游标先于派发落盘
        self.store.save(&saga, Version::new()).await?;
        self.dispatch(&saga, 0).await?;

        Ok(SagaProgress::Dispatched { step_index: 0 })
    }

    /// 查询 saga 当前状态
    pub async fn status(&self, saga_id: &Identifier) -> SagaResult<SagaStatus> {
        let (saga, _) = self.load_required(saga_id).await?;
        Ok(saga.status())
    }

    /// 外部完成信号订阅方调用的稳定推进入口：
    /// 记录当前步骤完成，落盘推进后的游标，再派发下一步（或完成）。
    pub async fn advance(&self, saga_id: &Identifier) -> SagaResult<SagaProgress> {
        let (mut saga, version) = self.load_required(saga_id).await?;

        match saga.status() {
            SagaStatus::Started | SagaStatus::Advancing => {}
            SagaStatus::Building => {
                return Err(SagaError::InvalidState {
                    saga_id: saga_id.clone(),
                    status: saga.status(),
                    operation: "advance",
                });
            }
            // 已定格的 saga 收到推进信号，只能来自重复投递
            _ => {
                tracing::debug!(
                    saga_id = %saga_id,
                    status = ?saga.status(),
                    "advance on settled saga ignored"
                );
                return Ok(SagaProgress::Duplicate);
            }
        }

        saga.advance_cursor();

        if saga.cursor() >= saga.steps().len() {
            saga.set_status(SagaStatus::Completed);
            match self.store.save(&saga, version).await {
                Ok(_) => Ok(SagaProgress::Completed),
                Err(SagaError::CursorConflict { .. }) => {
                    tracing::debug!(saga_id = %saga_id, "concurrent completion already recorded");
                    Ok(SagaProgress::Duplicate)
                }
                Err(err) => Err(err),
            }
        } else {
            saga.set_status(SagaStatus::Advancing);
            match self.store.save(&saga, version).await {
                Ok(_) => {
                    let step_index = saga.cursor();
                    self.dispatch(&saga, step_index).await?;
                    Ok(SagaProgress::Dispatched { step_index })
                }
                Err(SagaError::CursorConflict { .. }) => {
                    tracing::debug!(saga_id = %saga_id, "concurrent advance already dispatched");
                    Ok(SagaProgress::Duplicate)
                }
                Err(err) => Err(err),
            }
        }
    }

    /// 投递通道（或远端回执处理器）驱动状态机的回调入口。
    ///
    /// 低于游标的步骤下标是重复投递（无操作）；高于游标是乱序信号
    /// （`OutOfOrder`）。成功信号委托 `advance`；失败信号进入中止流程。
    pub async fn on_step_result(
        &self,
        saga_id: &Identifier,
        step_index: usize,
        success: bool,
        failure_reason: Option<&str>,
    ) -> SagaResult<SagaProgress> {
        let (saga, version) = self.load_required(saga_id).await?;

        if matches!(
            saga.status(),
            SagaStatus::Completed | SagaStatus::Aborted | SagaStatus::AbortFailed
        ) {
            tracing::debug!(saga_id = %saga_id, step_index, "step result for settled saga ignored");
            return Ok(SagaProgress::Duplicate);
        }

        if step_index < saga.cursor() {
            tracing::debug!(
                saga_id = %saga_id,
                step_index,
                cursor = saga.cursor(),
                "duplicate step result ignored"
            );
            return Ok(SagaProgress::Duplicate);
        }
        if step_index > saga.cursor() {
            return Err(SagaError::OutOfOrder {
                saga_id: saga_id.clone(),
                cursor: saga.cursor(),
                step_index,
            });
        }

        if success {
            self.advance(saga_id).await
        } else {
            self.abort(saga, version, failure_reason).await
        }
    }

    /// 中止：反序派发已完成步骤声明的补偿命令。
    ///
    /// 补偿派发不自动重试：一次失败即定格为 `AbortFailed`，并上抛
    /// `AbortionFailure`（可能存在未补偿的副作用，需要人工介入）。
    /// 补偿全部派发成功后定格为 `Aborted`，上抛 `WasAborted` 给
    /// 原始调用语境。
    async fn abort(
        &self,
        mut saga: CommandSaga,
        version: Version,
        failure_reason: Option<&str>,
    ) -> SagaResult<SagaProgress> {
        tracing::warn!(
            saga_id = %saga.saga_id(),
            cursor = saga.cursor(),
            reason = failure_reason.unwrap_or("unspecified"),
            "saga step failed; compensating completed steps"
        );

        saga.set_status(SagaStatus::Aborting);
        let version = match self.store.save(&saga, version).await {
            Ok(version) => version,
            Err(SagaError::CursorConflict { .. }) => {
                tracing::debug!(saga_id = %saga.saga_id(), "concurrent abort already in progress");
                return Ok(SagaProgress::Duplicate);
            }
            Err(err) => return Err(err),
        };

        for index in (0..saga.cursor()).rev() {
            let Some(compensation) = saga.steps()[index].compensation() else {
                continue;
            };
            if let Err(err) = self.send(&saga, index, compensation).await {
                saga.set_status(SagaStatus::AbortFailed);
                if let Err(save_err) = self.store.save(&saga, version).await {
                    tracing::error!(
                        saga_id = %saga.saga_id(),
                        error = %save_err,
                        "failed to persist AbortFailed status"
                    );
                }
                return Err(SagaError::AbortionFailure {
                    saga_id: saga.saga_id().clone(),
                    originating: saga.originating().cloned(),
                    reason: err.to_string(),
                });
            }
        }

        saga.set_status(SagaStatus::Aborted);
        self.store.save(&saga, version).await?;

        Err(SagaError::WasAborted {
            saga_id: saga.saga_id().clone(),
            originating: saga.originating().cloned(),
        })
    }

    async fn dispatch(&self, saga: &CommandSaga, step_index: usize) -> SagaResult<DeliveryReceipt> {
        self.send(saga, step_index, saga.steps()[step_index].command())
            .await
            .map_err(|err| SagaError::Dispatch {
                saga_id: saga.saga_id().clone(),
                step_index,
                reason: err.to_string(),
            })
    }

    async fn send(
        &self,
        saga: &CommandSaga,
        step_index: usize,
        command: &CommandMessage,
    ) -> anyhow::Result<DeliveryReceipt> {
        let mut headers = HashMap::new();
        headers.insert(SAGA_ID_HEADER.to_string(), saga.saga_id().to_string());
        headers.insert(SAGA_STEP_HEADER.to_string(), step_index.to_string());

        self.dispatcher
            .send(saga.destination(), command, &headers)
            .await
    }

    async fn load_required(&self, saga_id: &Identifier) -> SagaResult<(CommandSaga, Version)> {
        self.store
            .load(saga_id)
            .await?
            .ok_or_else(|| SagaError::UnknownSaga(saga_id.clone()))
    }
}
