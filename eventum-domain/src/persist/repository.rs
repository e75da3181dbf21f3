//! 聚合仓储
//!
//! 基于事件溯源与快照的通用聚合仓储：
//! - 水合：快照快路径 + 增量事件折叠，重放成本受限于快照后的事件数；
//! - 提交：带期望版本的单次条件追加，版本不匹配时执行配置的冲突解决策略；
//! - `execute`：加载（或新建）→ 执行意图 → 提交的标准编排，
//!   `ResolveStrongly` 的重试循环也在这里。
//!
use crate::{
    aggregate::AggregateState,
    domain_event::EventContext,
    entity::{Entity, PendingCommit},
    error::{DomainError, DomainResult},
    persist::{
        EventStore, Expected, OutOfBandChannel, SerializedEvent, SerializedSnapshot,
        SnapshotPolicy, SnapshotStore, stream_id,
    },
    value_object::{Identifier, Version},
};
use async_trait::async_trait;
use bon::Builder;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 用户自定义冲突归并器（`ConflictResolution::Custom`）
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// 将本地待提交事件（ours）与对方已提交事件（theirs）归并为
    /// 最终要追加的事件序列。返回的事件会被重新编号到当前流头之后。
    async fn merge(
        &self,
        ours: Vec<SerializedEvent>,
        theirs: &[SerializedEvent],
    ) -> DomainResult<Vec<SerializedEvent>>;
}

/// 每聚合类型的冲突解决策略
#[derive(Clone)]
pub enum ConflictResolution {
    /// 重新水合并重跑同一领域意图后再提交；最多额外重试 `retries` 次，
    /// `None` 表示不设上限。重试耗尽返回 `ConcurrencyConflict`。
    ResolveStrongly { retries: Option<u32> },
    /// 静默丢弃本地冲突事件
    Discard,
    /// 绕过版本检查直接提交（不安全，需显式选择）
    Ignore,
    /// 委托用户归并器；归并结果只尝试追加一次，再次冲突原样上抛
    Custom(Arc<dyn ConflictResolver>),
}

impl Default for ConflictResolution {
    fn default() -> Self {
        Self::ResolveStrongly { retries: None }
    }
}

impl fmt::Debug for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveStrongly { retries } => {
                f.debug_struct("ResolveStrongly").field("retries", retries).finish()
            }
            Self::Discard => f.write_str("Discard"),
            Self::Ignore => f.write_str("Ignore"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// 聚合类型注册期配置：启动时随仓储构造解析一次，不在运行时扫描
#[derive(Debug, Clone, Default)]
pub struct AggregateConfig {
    pub conflict_resolution: ConflictResolution,
    pub snapshot_policy: SnapshotPolicy,
}

/// 提交结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// 事件已提交，流推进到给定版本
    Committed { version: Version },
    /// 本地冲突事件按 `Discard` 策略被丢弃
    Discarded,
    /// 无事可提交
    Nothing,
}

/// 内部追加结果
enum Appended {
    /// 首次条件追加即成功
    Committed(Version),
    /// 经 `Ignore`/`Custom` 策略解决后提交（在线实体状态可能已与流脱节）
    Resolved(Version),
    Discarded,
    /// `ResolveStrongly` 下的版本冲突，交由 `execute` 重试或裸 `commit` 上抛
    Conflict(DomainError),
}

/// 面向单一聚合类型的仓储
///
/// - `S`：聚合状态类型
/// - `E`：事件存储协作方
/// - `SS`：快照存储协作方
/// - `C`：带外通道协作方
#[derive(Builder)]
pub struct Repository<S, E, SS, C>
where
    S: AggregateState,
    E: EventStore,
    SS: SnapshotStore,
    C: OutOfBandChannel,
{
    event_store: Arc<E>,
    snapshot_store: Arc<SS>,
    out_of_band: Arc<C>,
    #[builder(default)]
    config: AggregateConfig,
    #[builder(skip)]
    _marker: PhantomData<fn() -> S>,
}

impl<S, E, SS, C> Repository<S, E, SS, C>
where
    S: AggregateState,
    E: EventStore,
    SS: SnapshotStore,
    C: OutOfBandChannel,
{
    pub fn config(&self) -> &AggregateConfig {
        &self.config
    }

    fn stream(&self, id: &Identifier) -> String {
        stream_id(S::TYPE, id)
    }

    /// 水合：存在快照时从快照播种，仅折叠快照版本之后的增量事件；
    /// 否则从头折叠。完全不存在（无快照且无事件）返回 `None`。
    async fn hydrate(&self, id: &Identifier) -> DomainResult<Option<Entity<S>>> {
        let stream = self.stream(id);
        let mut entity = Entity::new(id.clone());
        let mut after = Version::new();

        if let Some(snapshot) = self.snapshot_store.load(S::TYPE, &id.to_string()).await? {
            entity.hydrate_snapshot(&snapshot)?;
            after = snapshot.aggregate_version();
        }

        let events = self.event_store.read(&stream, after).await?;
        if events.is_empty() && entity.version().is_new() {
            return Ok(None);
        }

        entity.fold(&events);
        Ok(Some(entity))
    }

    /// 按标识加载聚合；流不存在返回 `NotFound`
    pub async fn get(&self, id: &Identifier) -> DomainResult<Entity<S>> {
        self.hydrate(id).await?.ok_or_else(|| DomainError::NotFound {
            stream_id: self.stream(id),
        })
    }

    /// 按标识加载聚合；流不存在返回 `None`
    pub async fn try_get(&self, id: &Identifier) -> DomainResult<Option<Entity<S>>> {
        self.hydrate(id).await
    }

    /// 新建聚合；流已存在事件时返回 `Conflict`
    pub async fn new_aggregate(&self, id: &Identifier) -> DomainResult<Entity<S>> {
        let stream = self.stream(id);
        let existing = self.event_store.read(&stream, Version::new()).await?;
        if !existing.is_empty() {
            return Err(DomainError::Conflict { stream_id: stream });
        }

        Ok(Entity::new(id.clone()))
    }

    /// 按查询构造子实体：加载子实体自身的流，并记录父聚合标识的回引
    pub async fn get_child(
        &self,
        parent_id: &Identifier,
        id: &Identifier,
    ) -> DomainResult<Entity<S>> {
        let mut child = self.get(id).await?;
        child.set_parent(parent_id.clone());
        Ok(child)
    }

    /// 新建子实体（流已存在时返回 `Conflict`）
    pub async fn new_child(
        &self,
        parent_id: &Identifier,
        id: &Identifier,
    ) -> DomainResult<Entity<S>> {
        let mut child = self.new_aggregate(id).await?;
        child.set_parent(parent_id.clone());
        Ok(child)
    }

    /// 提交实体的待提交事件
    pub async fn commit(&self, entity: &mut Entity<S>) -> DomainResult<CommitOutcome> {
        self.commit_with_children(entity, Vec::new()).await
    }

    /// 提交父聚合与子实体（同一逻辑提交）。
    ///
    /// 子实体在父之后按流逐一条件追加，各自使用自己的期望版本；
    /// 子实体冲突会中止其余追加并原样上抛。
    /// 经策略解决（`Ignore`/`Custom`）的提交不落快照：在线状态可能
    /// 已与流脱节，下一次干净提交会补上。
    pub async fn commit_with_children(
        &self,
        entity: &mut Entity<S>,
        children: Vec<PendingCommit>,
    ) -> DomainResult<CommitOutcome> {
        let pending = entity.take_pending()?;
        if pending.is_empty() && children.is_empty() {
            return Ok(CommitOutcome::Nothing);
        }

        let outcome = match self.append_pending(&pending).await? {
            Appended::Committed(version) => {
                entity.mark_committed(version);
                self.maybe_snapshot(entity).await;
                CommitOutcome::Committed { version }
            }
            Appended::Resolved(version) => {
                entity.mark_committed(version);
                CommitOutcome::Committed { version }
            }
            Appended::Discarded => CommitOutcome::Discarded,
            Appended::Conflict(err) => return Err(err),
        };

        for child in children {
            if child.is_empty() {
                continue;
            }
            if !child.events.is_empty() {
                self.event_store
                    .append(
                        &child.stream_id,
                        Expected::Exact(child.expected),
                        child.events.clone(),
                    )
                    .await?;
            }
            self.flush_out_of_band(&child.stream_id, child.out_of_band)
                .await;
        }

        Ok(outcome)
    }

    /// 执行聚合命令：加载（不存在则新建）→ 执行意图 → 提交。
    ///
    /// `ResolveStrongly` 策略在版本冲突时重新水合并重跑同一意图闭包。
    /// 闭包必须是纯变更（对相同输入幂等、无外部副作用），这是调用方
    /// 要守住的契约；重试上限耗尽后返回 `ConcurrencyConflict`。
    pub async fn execute<F>(
        &self,
        id: &Identifier,
        context: EventContext,
        intent: F,
    ) -> DomainResult<CommitOutcome>
    where
        F: Fn(&mut Entity<S>) -> DomainResult<()> + Send + Sync,
    {
        let mut attempts: u32 = 0;

        loop {
            let mut entity = match self.try_get(id).await? {
                Some(entity) => entity,
                None => Entity::new(id.clone()),
            };
            entity.set_context(context.clone());

            intent(&mut entity)?;

            let pending = entity.take_pending()?;
            if pending.is_empty() {
                return Ok(CommitOutcome::Nothing);
            }

            match self.append_pending(&pending).await? {
                Appended::Committed(version) => {
                    entity.mark_committed(version);
                    self.maybe_snapshot(&mut entity).await;
                    return Ok(CommitOutcome::Committed { version });
                }
                Appended::Resolved(version) => {
                    return Ok(CommitOutcome::Committed { version });
                }
                Appended::Discarded => return Ok(CommitOutcome::Discarded),
                Appended::Conflict(_) => {
                    attempts += 1;
                    if let ConflictResolution::ResolveStrongly { retries: Some(max) } =
                        &self.config.conflict_resolution
                    {
                        if attempts > *max {
                            return Err(DomainError::ConcurrencyConflict {
                                stream_id: pending.stream_id().to_string(),
                                attempts,
                            });
                        }
                    }
                    tracing::debug!(
                        stream_id = pending.stream_id(),
                        attempts,
                        "version conflict; rehydrating and re-running intent"
                    );
                }
            }
        }
    }

    async fn append_pending(&self, pending: &PendingCommit) -> DomainResult<Appended> {
        if pending.events.is_empty() {
            // 仅带外事件：不触碰主流
            self.flush_out_of_band(&pending.stream_id, pending.out_of_band.clone())
                .await;
            return Ok(Appended::Committed(pending.expected));
        }

        match self
            .event_store
            .append(
                &pending.stream_id,
                Expected::Exact(pending.expected),
                pending.events.clone(),
            )
            .await
        {
            Ok(version) => {
                self.flush_out_of_band(&pending.stream_id, pending.out_of_band.clone())
                    .await;
                Ok(Appended::Committed(version))
            }
            Err(conflict @ DomainError::VersionConflict { .. }) => {
                self.resolve_conflict(pending, conflict).await
            }
            Err(err) => Err(err),
        }
    }

    async fn resolve_conflict(
        &self,
        pending: &PendingCommit,
        conflict: DomainError,
    ) -> DomainResult<Appended> {
        match &self.config.conflict_resolution {
            // 重试需要重跑领域意图，由 execute 驱动；裸 commit 原样上抛
            ConflictResolution::ResolveStrongly { .. } => Ok(Appended::Conflict(conflict)),
            ConflictResolution::Discard => {
                tracing::debug!(
                    stream_id = %pending.stream_id,
                    count = pending.events.len(),
                    "discarding conflicting local events"
                );
                Ok(Appended::Discarded)
            }
            ConflictResolution::Ignore => {
                let version = self
                    .event_store
                    .append(&pending.stream_id, Expected::Any, pending.events.clone())
                    .await?;
                self.flush_out_of_band(&pending.stream_id, pending.out_of_band.clone())
                    .await;
                Ok(Appended::Resolved(version))
            }
            ConflictResolution::Custom(resolver) => {
                let theirs = self
                    .event_store
                    .read(&pending.stream_id, pending.expected)
                    .await?;
                let head = theirs
                    .last()
                    .map(|e| e.aggregate_version())
                    .unwrap_or(pending.expected);

                let merged = resolver.merge(pending.events.clone(), &theirs).await?;
                let mut next = head;
                let merged: Vec<SerializedEvent> = merged
                    .into_iter()
                    .map(|event| {
                        next = next.next();
                        event.with_aggregate_version(next)
                    })
                    .collect();

                // 归并结果只尝试一次；仅 ResolveStrongly 自动重试
                let version = self
                    .event_store
                    .append(&pending.stream_id, Expected::Exact(head), merged)
                    .await?;
                self.flush_out_of_band(&pending.stream_id, pending.out_of_band.clone())
                    .await;
                Ok(Appended::Resolved(version))
            }
        }
    }

    /// 成功提交后评估快照策略；快照写失败不影响提交，仅记录日志，
    /// 下一次满足条件的提交会再次尝试。
    async fn maybe_snapshot(&self, entity: &mut Entity<S>) {
        let policy = self.config.snapshot_policy;
        if !policy.should_snapshot(entity.snapshot_version(), entity.version()) {
            return;
        }

        let version = entity.version();
        match SerializedSnapshot::from_state(entity.id(), version, entity.state()) {
            Ok(snapshot) => match self.snapshot_store.save(snapshot).await {
                Ok(()) => entity.mark_snapshotted(version),
                Err(err) => tracing::warn!(
                    stream_id = %entity.stream_id(),
                    error = %err,
                    "snapshot write failed; commit unaffected"
                ),
            },
            Err(err) => tracing::warn!(
                stream_id = %entity.stream_id(),
                error = %err,
                "snapshot serialization failed; commit unaffected"
            ),
        }
    }

    /// 带外事件按通道分组后即发即忘；追加失败记录日志后丢弃
    async fn flush_out_of_band(&self, stream: &str, events: Vec<(String, SerializedEvent)>) {
        if events.is_empty() {
            return;
        }

        let mut by_channel: HashMap<String, Vec<SerializedEvent>> = HashMap::new();
        for (channel, event) in events {
            by_channel.entry(channel).or_default().push(event);
        }

        for (channel, batch) in by_channel {
            if let Err(err) = self.out_of_band.append(&channel, batch).await {
                tracing::warn!(
                    stream_id = %stream,
                    channel = %channel,
                    error = %err,
                    "out-of-band append failed; events dropped"
                );
            }
        }
    }
}
