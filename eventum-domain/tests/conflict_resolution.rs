use async_trait::async_trait;
use eventum_domain::aggregate::AggregateState;
use eventum_domain::domain_event::{DomainEvent, EventContext};
use eventum_domain::error::{DomainError, DomainResult};
use eventum_domain::persist::{
    AggregateConfig, CommitOutcome, ConflictResolution, ConflictResolver, EventStore, Expected,
    MemoryEventStore, MemoryOutOfBandChannel, MemorySnapshotStore, Repository, SerializedEvent,
    SnapshotPolicy,
};
use eventum_domain::value_object::{Identifier, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tally {
    total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TallyEvent {
    Counted { by: i64 },
}

impl DomainEvent for TallyEvent {
    fn event_type(&self) -> &'static str {
        "TallyEvent.Counted"
    }
}

impl AggregateState for Tally {
    const TYPE: &'static str = "tally";
    type Event = TallyEvent;

    fn apply(&mut self, event: &Self::Event) {
        let TallyEvent::Counted { by } = event;
        self.total += by;
    }
}

fn repo_with<E>(
    store: Arc<E>,
    conflict_resolution: ConflictResolution,
) -> Repository<Tally, E, MemorySnapshotStore, MemoryOutOfBandChannel>
where
    E: EventStore,
{
    Repository::builder()
        .event_store(store)
        .snapshot_store(Arc::new(MemorySnapshotStore::new()))
        .out_of_band(Arc::new(MemoryOutOfBandChannel::new()))
        .config(AggregateConfig {
            conflict_resolution,
            snapshot_policy: SnapshotPolicy::Never,
        })
        .build()
}

fn count(by: i64) -> impl Fn(&mut eventum_domain::entity::Entity<Tally>) -> DomainResult<()> {
    move |entity| entity.apply(|_| TallyEvent::Counted { by })
}

// 并发门：同一期望版本的两次提交，恰有一次成功
#[tokio::test]
async fn concurrency_gate_rejects_second_writer() -> anyhow::Result<()> {
    let store = Arc::new(MemoryEventStore::new());
    let repo = repo_with(
        store.clone(),
        ConflictResolution::ResolveStrongly { retries: Some(3) },
    );
    let id = Identifier::from("t-1");

    let mut seed = repo.new_aggregate(&id).await?;
    seed.apply(|_| TallyEvent::Counted { by: 1 })?;
    repo.commit(&mut seed).await?;

    // 两个写者都在版本 1 处水合
    let mut first = repo.get(&id).await?;
    let mut second = repo.get(&id).await?;
    first.apply(|_| TallyEvent::Counted { by: 10 })?;
    second.apply(|_| TallyEvent::Counted { by: 20 })?;

    let outcome = repo.commit(&mut first).await?;
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            version: Version::from_value(2)
        }
    );

    // 裸 commit 没有可重跑的意图，ResolveStrongly 下冲突原样上抛
    let err = repo.commit(&mut second).await.unwrap_err();
    match err {
        DomainError::VersionConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected.value(), 1);
            assert_eq!(actual.value(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }

    Ok(())
}

/// 永远冲突的事件存储：统计追加次数，读委托给内层
struct AlwaysConflictStore {
    inner: Arc<MemoryEventStore>,
    appends: AtomicUsize,
}

#[async_trait]
impl EventStore for AlwaysConflictStore {
    async fn append(
        &self,
        stream_id: &str,
        expected: Expected,
        _events: Vec<SerializedEvent>,
    ) -> DomainResult<Version> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        let expected = match expected {
            Expected::Exact(version) => version,
            Expected::Any => Version::new(),
        };
        Err(DomainError::VersionConflict {
            stream_id: stream_id.to_string(),
            expected,
            actual: expected.next(),
        })
    }

    async fn read(&self, stream_id: &str, after: Version) -> DomainResult<Vec<SerializedEvent>> {
        self.inner.read(stream_id, after).await
    }
}

// ResolveStrongly 收敛：retries=N 时最多再做 N 次提交尝试
#[tokio::test]
async fn resolve_strongly_is_bounded_by_retries() {
    let store = Arc::new(AlwaysConflictStore {
        inner: Arc::new(MemoryEventStore::new()),
        appends: AtomicUsize::new(0),
    });
    let repo = repo_with(
        store.clone(),
        ConflictResolution::ResolveStrongly { retries: Some(3) },
    );

    let err = repo
        .execute(&Identifier::from("t-stuck"), EventContext::default(), count(1))
        .await
        .unwrap_err();

    match err {
        DomainError::ConcurrencyConflict { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("unexpected {other:?}"),
    }
    // 1 次原始提交 + 3 次重试
    assert_eq!(store.appends.load(Ordering::SeqCst), 4);
}

/// 在调用方首次追加前插入一个竞争写者的事件存储
struct RacingStore {
    inner: Arc<MemoryEventStore>,
    raced: AtomicBool,
}

#[async_trait]
impl EventStore for RacingStore {
    async fn append(
        &self,
        stream_id: &str,
        expected: Expected,
        events: Vec<SerializedEvent>,
    ) -> DomainResult<Version> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            // 竞争写者抢先提交一份同样的事件，使调用方的期望版本过期
            let racer = events[0].clone();
            self.inner.append(stream_id, Expected::Any, vec![racer]).await?;
        }
        self.inner.append(stream_id, expected, events).await
    }

    async fn read(&self, stream_id: &str, after: Version) -> DomainResult<Vec<SerializedEvent>> {
        self.inner.read(stream_id, after).await
    }
}

// execute 路径下冲突方重新水合并重跑同一意图闭包后成功
#[tokio::test]
async fn resolve_strongly_rehydrates_and_reruns_intent() -> anyhow::Result<()> {
    let store = Arc::new(RacingStore {
        inner: Arc::new(MemoryEventStore::new()),
        raced: AtomicBool::new(false),
    });
    let repo = repo_with(
        store.clone(),
        ConflictResolution::ResolveStrongly { retries: Some(3) },
    );
    let id = Identifier::from("t-race");

    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    repo.execute(&id, EventContext::default(), move |entity| {
        counter.fetch_add(1, Ordering::SeqCst);
        entity.apply(|_| TallyEvent::Counted { by: 5 })
    })
    .await?;

    // 首次提交冲突，意图闭包被重跑了一次
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let loaded = repo.get(&id).await?;
    assert_eq!(loaded.version().value(), 2);
    // 竞争写者的事件 + 重跑后的本地事件都在
    assert_eq!(loaded.state().total, 10);
    Ok(())
}

// Discard：本地冲突事件被静默丢弃
#[tokio::test]
async fn discard_drops_conflicting_events() -> anyhow::Result<()> {
    let store = Arc::new(MemoryEventStore::new());
    let repo = repo_with(store.clone(), ConflictResolution::Discard);
    let id = Identifier::from("t-discard");

    let mut seed = repo.new_aggregate(&id).await?;
    seed.apply(|_| TallyEvent::Counted { by: 1 })?;
    repo.commit(&mut seed).await?;

    let mut stale = repo.get(&id).await?;
    repo.execute(&id, EventContext::default(), count(5)).await?;

    stale.apply(|_| TallyEvent::Counted { by: 100 })?;
    let outcome = repo.commit(&mut stale).await?;
    assert_eq!(outcome, CommitOutcome::Discarded);

    let loaded = repo.get(&id).await?;
    assert_eq!(loaded.version().value(), 2);
    assert_eq!(loaded.state().total, 6);
    Ok(())
}

// Ignore：绕过版本检查，事件被接到流头之后
#[tokio::test]
async fn ignore_commits_past_the_version_check() -> anyhow::Result<()> {
    let store = Arc::new(MemoryEventStore::new());
    let repo = repo_with(store.clone(), ConflictResolution::Ignore);
    let id = Identifier::from("t-ignore");

    let mut seed = repo.new_aggregate(&id).await?;
    seed.apply(|_| TallyEvent::Counted { by: 1 })?;
    repo.commit(&mut seed).await?;

    let mut stale = repo.get(&id).await?;
    repo.execute(&id, EventContext::default(), count(5)).await?;

    stale.apply(|_| TallyEvent::Counted { by: 100 })?;
    let outcome = repo.commit(&mut stale).await?;
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            version: Version::from_value(3)
        }
    );

    let events = store.read("tally:t-ignore", Version::new()).await?;
    assert_eq!(events.len(), 3);
    assert_eq!(events[2].aggregate_version().value(), 3);

    let loaded = repo.get(&id).await?;
    assert_eq!(loaded.state().total, 106);
    Ok(())
}

/// 保留双方事件的归并器：本地事件排在对方之后
struct KeepBoth {
    calls: AtomicUsize,
}

#[async_trait]
impl ConflictResolver for KeepBoth {
    async fn merge(
        &self,
        ours: Vec<SerializedEvent>,
        _theirs: &[SerializedEvent],
    ) -> DomainResult<Vec<SerializedEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ours)
    }
}

// Custom：归并器决定最终追加的事件序列
#[tokio::test]
async fn custom_resolver_merges_conflicting_events() -> anyhow::Result<()> {
    let store = Arc::new(MemoryEventStore::new());
    let resolver = Arc::new(KeepBoth {
        calls: AtomicUsize::new(0),
    });
    let repo = repo_with(store.clone(), ConflictResolution::Custom(resolver.clone()));
    let id = Identifier::from("t-custom");

    let mut seed = repo.new_aggregate(&id).await?;
    seed.apply(|_| TallyEvent::Counted { by: 1 })?;
    repo.commit(&mut seed).await?;

    let mut stale = repo.get(&id).await?;
    repo.execute(&id, EventContext::default(), count(5)).await?;

    stale.apply(|_| TallyEvent::Counted { by: 100 })?;
    let outcome = repo.commit(&mut stale).await?;
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            version: Version::from_value(3)
        }
    );
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

    let loaded = repo.get(&id).await?;
    assert_eq!(loaded.version().value(), 3);
    assert_eq!(loaded.state().total, 106);
    Ok(())
}
