//! 聚合状态（AggregateState）抽象
//!
//! 约束一个可重放的聚合状态：
//! - `apply` 将事件投影到状态（改变状态）；
//! - 按事件类型标签的显式分支分发即是注册表（无运行时反射）；
//! - 重放必须确定：同一事件序列从同一快照出发，折叠结果逐位一致。
//!
use crate::domain_event::DomainEvent;
use serde::{Serialize, de::DeserializeOwned};

/// 可重放的聚合状态
///
/// `apply` 不做 I/O、不取时钟、不取随机数；所有外部输入都必须已经在
/// 事件载荷中。这是冲突解决重放与快照等价性的前提。
pub trait AggregateState: Default + Serialize + DeserializeOwned + Send + Sync {
    /// 聚合类型的稳定名称（参与流名派生，不随重构变化）
    const TYPE: &'static str;

    /// 该聚合产生的领域事件类型
    type Event: DomainEvent;

    /// 应用事件，更新聚合状态
    fn apply(&mut self, event: &Self::Event);
}

#[cfg(test)]
mod tests {
    use super::AggregateState;
    use crate::domain_event::DomainEvent;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Counter {
        value: i64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum CounterEvent {
        Added { amount: i64 },
        Subtracted { amount: i64 },
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Added { .. } => "CounterEvent.Added",
                CounterEvent::Subtracted { .. } => "CounterEvent.Subtracted",
            }
        }
    }

    impl AggregateState for Counter {
        const TYPE: &'static str = "counter";
        type Event = CounterEvent;

        fn apply(&mut self, event: &Self::Event) {
            match event {
                CounterEvent::Added { amount } => self.value += amount,
                CounterEvent::Subtracted { amount } => self.value -= amount,
            }
        }
    }

    // 同一事件序列折叠两次，结果一致（确定性重放）
    #[test]
    fn replay_is_deterministic() {
        let events = vec![
            CounterEvent::Added { amount: 3 },
            CounterEvent::Added { amount: 2 },
            CounterEvent::Subtracted { amount: 1 },
        ];

        let mut a = Counter::default();
        let mut b = Counter::default();
        for e in &events {
            a.apply(e);
        }
        for e in &events {
            b.apply(e);
        }

        assert_eq!(a.value, 4);
        assert_eq!(a.value, b.value);
    }

    #[test]
    fn event_type_tags_are_stable() {
        let e = CounterEvent::Added { amount: 1 };
        assert_eq!(e.event_type(), "CounterEvent.Added");
        assert_eq!(e.event_version(), 1);
    }
}
