use eventum_domain::aggregate::AggregateState;
use eventum_domain::domain_event::{DomainEvent, EventContext};
use eventum_domain::entity::Entity;
use eventum_domain::error::{DomainError, DomainResult};
use eventum_domain::persist::{
    AggregateConfig, CommitOutcome, ConflictResolution, EventStore, MemoryEventStore,
    MemoryOutOfBandChannel, MemorySnapshotStore, Repository, SnapshotPolicy,
};
use eventum_domain::value_object::{Identifier, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Greeting {
    created: bool,
    greeted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum GreetingEvent {
    Created,
    HelloSaid { person: String },
}

impl DomainEvent for GreetingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            GreetingEvent::Created => "GreetingEvent.Created",
            GreetingEvent::HelloSaid { .. } => "GreetingEvent.HelloSaid",
        }
    }
}

impl AggregateState for Greeting {
    const TYPE: &'static str = "greeting";
    type Event = GreetingEvent;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            GreetingEvent::Created => self.created = true,
            GreetingEvent::HelloSaid { person } => self.greeted.push(person.clone()),
        }
    }
}

type GreetingRepo =
    Repository<Greeting, MemoryEventStore, MemorySnapshotStore, MemoryOutOfBandChannel>;

struct Fixture {
    store: Arc<MemoryEventStore>,
    channel: Arc<MemoryOutOfBandChannel>,
    repo: GreetingRepo,
}

fn fixture(conflict_resolution: ConflictResolution) -> Fixture {
    let store = Arc::new(MemoryEventStore::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let channel = Arc::new(MemoryOutOfBandChannel::new());

    let repo = Repository::builder()
        .event_store(store.clone())
        .snapshot_store(snapshots.clone())
        .out_of_band(channel.clone())
        .config(AggregateConfig {
            conflict_resolution,
            snapshot_policy: SnapshotPolicy::Never,
        })
        .build();

    Fixture {
        store,
        channel,
        repo,
    }
}

fn say_hello(person: &'static str) -> impl Fn(&mut Entity<Greeting>) -> DomainResult<()> {
    move |entity| {
        entity.rule("created", |s: &Greeting| s.created, "greeting must exist")?;
        entity.apply(|_| GreetingEvent::HelloSaid {
            person: person.to_string(),
        })
    }
}

// 端到端：创建聚合、并发 SayHello，两个事件都落盘且无丢失
#[tokio::test(flavor = "multi_thread")]
async fn end_to_end_concurrent_say_hello() -> anyhow::Result<()> {
    let fx = fixture(ConflictResolution::ResolveStrongly { retries: Some(3) });
    let id = Identifier::from("World");

    let mut aggregate = fx.repo.new_aggregate(&id).await?;
    aggregate.apply(|_| GreetingEvent::Created)?;
    let outcome = fx.repo.commit(&mut aggregate).await?;
    assert_eq!(
        outcome,
        CommitOutcome::Committed {
            version: Version::from_value(1)
        }
    );

    // 两个处理器并发执行，事件都落盘且无丢失
    let (a, b) = tokio::join!(
        fx.repo.execute(&id, EventContext::default(), say_hello("a")),
        fx.repo.execute(&id, EventContext::default(), say_hello("b")),
    );
    a?;
    b?;

    let events = fx.store.read("greeting:World", Version::new()).await?;
    assert_eq!(events.len(), 3);
    let versions: Vec<u64> = events.iter().map(|e| e.aggregate_version().value()).collect();
    assert_eq!(versions, vec![1, 2, 3]);

    let loaded = fx.repo.get(&id).await?;
    assert_eq!(loaded.version().value(), 3);
    let mut greeted = loaded.state().greeted.clone();
    greeted.sort();
    assert_eq!(greeted, vec!["a".to_string(), "b".to_string()]);

    Ok(())
}

#[tokio::test]
async fn get_missing_stream_is_not_found() {
    let fx = fixture(ConflictResolution::default());
    let err = fx.repo.get(&Identifier::from("nobody")).await.unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    let none = fx.repo.try_get(&Identifier::from("nobody")).await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn new_aggregate_on_existing_stream_is_conflict() -> anyhow::Result<()> {
    let fx = fixture(ConflictResolution::default());
    let id = Identifier::from("dup");

    let mut aggregate = fx.repo.new_aggregate(&id).await?;
    aggregate.apply(|_| GreetingEvent::Created)?;
    fx.repo.commit(&mut aggregate).await?;

    let err = fx.repo.new_aggregate(&id).await.unwrap_err();
    assert!(matches!(err, DomainError::Conflict { .. }));
    Ok(())
}

// 规则失败的操作不留下任何事件（拒绝的原子性）
#[tokio::test]
async fn failing_rule_rejects_whole_operation() -> anyhow::Result<()> {
    let fx = fixture(ConflictResolution::default());
    let id = Identifier::from("strict");

    let err = fx
        .repo
        .execute(&id, EventContext::default(), |entity| {
            entity.rule("created", |s: &Greeting| s.created, "greeting must exist")?;
            entity.apply(|_| GreetingEvent::HelloSaid {
                person: "x".to_string(),
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::BusinessRuleViolation { .. }));

    let events = fx.store.read("greeting:strict", Version::new()).await?;
    assert!(events.is_empty());
    Ok(())
}

// 带外事件：进入命名通道，不参与重放，不推进版本
#[tokio::test]
async fn raised_events_are_isolated_from_the_main_stream() -> anyhow::Result<()> {
    let fx = fixture(ConflictResolution::default());
    let id = Identifier::from("audited");

    let mut aggregate = fx.repo.new_aggregate(&id).await?;
    aggregate.apply(|_| GreetingEvent::Created)?;
    aggregate.raise("audit", |_| GreetingEvent::HelloSaid {
        person: "observer".to_string(),
    });
    fx.repo.commit(&mut aggregate).await?;

    let main = fx.store.read("greeting:audited", Version::new()).await?;
    assert_eq!(main.len(), 1);
    assert_eq!(main[0].event_type(), "GreetingEvent.Created");

    let audit = fx.channel.events("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event_type(), "GreetingEvent.HelloSaid");

    let loaded = fx.repo.get(&id).await?;
    assert_eq!(loaded.version().value(), 1);
    assert!(loaded.state().greeted.is_empty());
    Ok(())
}

// 子实体随父提交，但维护自己的流与版本
#[tokio::test]
async fn children_commit_with_parent_on_their_own_streams() -> anyhow::Result<()> {
    let fx = fixture(ConflictResolution::default());
    let parent_id = Identifier::from("parent");
    let child_id = Identifier::from("parent/child-1");

    let mut parent = fx.repo.new_aggregate(&parent_id).await?;
    parent.apply(|_| GreetingEvent::Created)?;

    let mut child = fx.repo.new_child(&parent_id, &child_id).await?;
    assert_eq!(child.parent_id(), Some(&parent_id));
    child.apply(|_| GreetingEvent::Created)?;
    child.apply(|_| GreetingEvent::HelloSaid {
        person: "parent".to_string(),
    })?;

    let pending_child = child.take_pending()?;
    fx.repo
        .commit_with_children(&mut parent, vec![pending_child])
        .await?;

    let parent_stream = fx.store.read("greeting:parent", Version::new()).await?;
    assert_eq!(parent_stream.len(), 1);

    let child_stream = fx
        .store
        .read("greeting:parent/child-1", Version::new())
        .await?;
    assert_eq!(child_stream.len(), 2);
    assert_eq!(child_stream[1].aggregate_version().value(), 2);

    let reloaded = fx.repo.get_child(&parent_id, &child_id).await?;
    assert_eq!(reloaded.version().value(), 2);
    Ok(())
}
