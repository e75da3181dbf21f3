//! 实体机（Entity）
//!
//! 封装一个聚合状态实例的完整生命周期：
//! - 构造为空 → 重放水合 → 领域方法变更 → 提交或丢弃；
//! - `apply` 产生持久化事件并立即折叠到在线状态；
//! - `raise` 产生带外事件（仅供外部消费，不参与重放与并发检查）；
//! - `rule` 注册业务规则，后续每次 `apply` 前重新评估；
//! - 子实体仅持有父聚合标识的非拥有回引，随父提交同一逻辑事务，
//!   但各自维护独立的流与版本。
//!
use crate::{
    aggregate::AggregateState,
    domain_event::{EventContext, EventEnvelope},
    error::{DomainError, DomainResult},
    persist::{SerializedEvent, SerializedSnapshot, serialize_events, stream_id},
    value_object::{Identifier, Version},
};

/// 业务规则：命名的不变量谓词
struct BusinessRule<S> {
    name: String,
    message: String,
    predicate: Box<dyn Fn(&S) -> bool + Send + Sync>,
}

impl<S> BusinessRule<S> {
    fn check(&self, state: &S) -> DomainResult<()> {
        if (self.predicate)(state) {
            return Ok(());
        }

        Err(DomainError::BusinessRuleViolation {
            rule: self.name.clone(),
            message: self.message.clone(),
        })
    }
}

/// 一次仓储操作内独占持有的实体
///
/// 每次仓储操作都创建新的实例，提交后丢弃；处理失败时未提交事件
/// 随实例一起丢弃，不会被持久化。
pub struct Entity<S>
where
    S: AggregateState,
{
    id: Identifier,
    parent_id: Option<Identifier>,
    context: EventContext,
    state: S,
    /// 水合时观察到的流版本（提交时的期望版本）
    committed_version: Version,
    /// 含未提交事件的当前版本
    version: Version,
    /// 播种快照的版本（无快照时为 0）
    snapshot_version: Version,
    rules: Vec<BusinessRule<S>>,
    uncommitted: Vec<EventEnvelope<S::Event>>,
    out_of_band: Vec<(String, EventEnvelope<S::Event>)>,
}

impl<S> Entity<S>
where
    S: AggregateState,
{
    /// 构造空实体（版本 0，流尚不存在）
    pub fn new(id: Identifier) -> Self {
        Self {
            id,
            parent_id: None,
            context: EventContext::default(),
            state: S::default(),
            committed_version: Version::new(),
            version: Version::new(),
            snapshot_version: Version::new(),
            rules: Vec::new(),
            uncommitted: Vec::new(),
            out_of_band: Vec::new(),
        }
    }

    /// 构造子实体：仅记录父聚合标识，不持有父实例
    pub fn new_child(id: Identifier, parent_id: Identifier) -> Self {
        let mut entity = Self::new(id);
        entity.parent_id = Some(parent_id);
        entity
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&Identifier> {
        self.parent_id.as_ref()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn committed_version(&self) -> Version {
        self.committed_version
    }

    pub fn snapshot_version(&self) -> Version {
        self.snapshot_version
    }

    pub fn stream_id(&self) -> String {
        stream_id(S::TYPE, &self.id)
    }

    pub fn has_pending(&self) -> bool {
        !self.uncommitted.is_empty() || !self.out_of_band.is_empty()
    }

    /// 设置本次操作的业务上下文（所有新事件共享）
    pub fn set_context(&mut self, context: EventContext) {
        self.context = context;
    }

    pub fn context(&self) -> &EventContext {
        &self.context
    }

    pub(crate) fn set_parent(&mut self, parent_id: Identifier) {
        self.parent_id = Some(parent_id);
    }

    /// 注册业务规则并立即评估；此后每次 `apply` 前都会重新评估。
    ///
    /// 谓词为假时返回 `BusinessRuleViolation`，本次操作的任何事件都不会提交。
    pub fn rule<P>(
        &mut self,
        name: impl Into<String>,
        predicate: P,
        message: impl Into<String>,
    ) -> DomainResult<()>
    where
        P: Fn(&S) -> bool + Send + Sync + 'static,
    {
        let rule = BusinessRule {
            name: name.into(),
            message: message.into(),
            predicate: Box::new(predicate),
        };
        rule.check(&self.state)?;
        self.rules.push(rule);
        Ok(())
    }

    fn check_rules(&self) -> DomainResult<()> {
        for rule in &self.rules {
            rule.check(&self.state)?;
        }
        Ok(())
    }

    /// 产生一个持久化事件：
    /// 1. 评估全部已注册规则；
    /// 2. 由构造回调基于当前状态生成载荷；
    /// 3. 分配下一个流位置并立即折叠到在线状态，
    ///    同一操作内后续领域逻辑能观察到更新后的状态。
    pub fn apply<F>(&mut self, build: F) -> DomainResult<()>
    where
        F: FnOnce(&S) -> S::Event,
    {
        self.check_rules()?;

        let payload = build(&self.state);
        let next = self.version.next();
        let envelope = EventEnvelope::new(&self.id, S::TYPE, next, payload, self.context.clone());

        self.state.apply(&envelope.payload);
        self.version = next;
        self.uncommitted.push(envelope);

        Ok(())
    }

    /// 产生一个带外事件，进入命名通道的队列。
    ///
    /// 带外事件不参与重放，不推进版本，也不影响并发检查；
    /// 其元数据记录产生时刻的流位置。
    pub fn raise<F>(&mut self, channel: impl Into<String>, build: F)
    where
        F: FnOnce(&S) -> S::Event,
    {
        let payload = build(&self.state);
        let envelope =
            EventEnvelope::new(&self.id, S::TYPE, self.version, payload, self.context.clone());
        self.out_of_band.push((channel.into(), envelope));
    }

    /// 从快照播种状态与版本游标
    pub(crate) fn hydrate_snapshot(&mut self, snapshot: &SerializedSnapshot) -> DomainResult<()> {
        self.state = snapshot.to_state::<S>()?;

        let version = snapshot.aggregate_version();
        self.version = version;
        self.committed_version = version;
        self.snapshot_version = version;

        Ok(())
    }

    /// 按序折叠已持久化事件。
    ///
    /// 未注册的事件类型被静默跳过（向前兼容），但其流位置仍推进版本游标。
    /// 仓储总是折叠到新建的实体中并在失败时整体丢弃，调用方不会观察到
    /// 部分折叠的状态。
    pub(crate) fn fold(&mut self, events: &[SerializedEvent]) {
        for event in events {
            match serde_json::from_value::<S::Event>(event.payload().clone()) {
                Ok(payload) => self.state.apply(&payload),
                Err(err) => tracing::debug!(
                    event_type = event.event_type(),
                    error = %err,
                    "skipping unregistered event type during replay"
                ),
            }
            self.version = event.aggregate_version();
        }
        self.committed_version = self.version;
    }

    /// 抽干待提交队列为类型擦除的提交单元，供子实体加入父聚合的提交。
    pub fn take_pending(&mut self) -> DomainResult<PendingCommit> {
        let events = serialize_events(&self.uncommitted)?;
        let out_of_band = self
            .out_of_band
            .iter()
            .map(|(channel, envelope)| Ok((channel.clone(), SerializedEvent::try_from(envelope)?)))
            .collect::<DomainResult<Vec<_>>>()?;

        self.uncommitted.clear();
        self.out_of_band.clear();

        Ok(PendingCommit {
            stream_id: self.stream_id(),
            expected: self.committed_version,
            events,
            out_of_band,
        })
    }

    pub(crate) fn mark_committed(&mut self, version: Version) {
        self.committed_version = version;
        self.version = version;
    }

    pub(crate) fn mark_snapshotted(&mut self, version: Version) {
        self.snapshot_version = version;
    }
}

impl<S> std::fmt::Debug for Entity<S>
where
    S: AggregateState,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("context", &self.context)
            .field("committed_version", &self.committed_version)
            .field("version", &self.version)
            .field("snapshot_version", &self.snapshot_version)
            .field("rules", &self.rules.len())
            .field("uncommitted", &self.uncommitted.len())
            .field("out_of_band", &self.out_of_band.len())
            .finish()
    }
}

/// 类型擦除的提交单元：一个流的待追加事件与带外事件
pub struct PendingCommit {
    pub(crate) stream_id: String,
    pub(crate) expected: Version,
    pub(crate) events: Vec<SerializedEvent>,
    pub(crate) out_of_band: Vec<(String, SerializedEvent)>,
}

impl PendingCommit {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn expected(&self) -> Version {
        self.expected
    }

    pub fn events(&self) -> &[SerializedEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.out_of_band.is_empty()
    }
}
