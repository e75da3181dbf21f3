//! Saga 记录与状态机
//!
//! `CommandSaga` 是描述一次多步命令序列的值：关联标识（saga id）、
//! 有序的待派发命令（含可选补偿）、引发它的原始消息与目的地名称。
//! 它不是聚合；其保证来自投递通道的消息语义加上持久化的步骤游标。
//!
use crate::command::CommandMessage;
use eventum_domain::value_object::Identifier;
use serde::{Deserialize, Serialize};

/// Saga 状态机
///
/// `Building → Started → Advancing → Completed`；
/// 下游失败后 `Aborting → Aborted`，补偿派发失败则 `AbortFailed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaStatus {
    Building,
    Started,
    Advancing,
    Completed,
    Aborting,
    Aborted,
    AbortFailed,
}

/// 单个步骤：命令及其可选的补偿命令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaStep {
    command: CommandMessage,
    compensation: Option<CommandMessage>,
}

impl SagaStep {
    pub fn new(command: CommandMessage, compensation: Option<CommandMessage>) -> Self {
        Self {
            command,
            compensation,
        }
    }

    pub fn command(&self) -> &CommandMessage {
        &self.command
    }

    pub fn compensation(&self) -> Option<&CommandMessage> {
        self.compensation.as_ref()
    }
}

/// 多步命令序列的描述值
///
/// 链式 `command`/`compensated_command` 仅在 `Building` 阶段合法；
/// `start` 之后记录归协调器与存储所有，调用方不再持有可追加的实例。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSaga {
    saga_id: Identifier,
    destination: String,
    steps: Vec<SagaStep>,
    originating: Option<CommandMessage>,
    status: SagaStatus,
    /// 下一个待派发/待回执的步骤下标（随存储持久化）
    cursor: usize,
}

impl CommandSaga {
    /// 开始构建一个发往 `destination` 的 saga
    pub fn new(saga_id: Identifier, destination: impl Into<String>) -> Self {
        Self {
            saga_id,
            destination: destination.into(),
            steps: Vec::new(),
            originating: None,
            status: SagaStatus::Building,
            cursor: 0,
        }
    }

    /// 记录引发本 saga 的原始消息（补偿结局的上下文）
    pub fn originating_message(mut self, message: CommandMessage) -> Self {
        self.originating = Some(message);
        self
    }

    /// 追加一个无补偿的步骤；返回自身以便链式调用
    pub fn command(self, command: CommandMessage) -> Self {
        self.push_step(SagaStep::new(command, None))
    }

    /// 追加一个带补偿命令的步骤
    pub fn compensated_command(
        self,
        command: CommandMessage,
        compensation: CommandMessage,
    ) -> Self {
        self.push_step(SagaStep::new(command, Some(compensation)))
    }

    fn push_step(mut self, step: SagaStep) -> Self {
        debug_assert_eq!(self.status, SagaStatus::Building);
        self.steps.push(step);
        self
    }

    pub fn saga_id(&self) -> &Identifier {
        &self.saga_id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn steps(&self) -> &[SagaStep] {
        &self.steps
    }

    pub fn originating(&self) -> Option<&CommandMessage> {
        self.originating.as_ref()
    }

    pub fn status(&self) -> SagaStatus {
        self.status
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn set_status(&mut self, status: SagaStatus) {
        self.status = status;
    }

    pub(crate) fn advance_cursor(&mut self) {
        self.cursor += 1;
    }
}
