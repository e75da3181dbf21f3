//! 持久化与事件溯源（persist）
//!
//! 定义事件存储、快照存储与带外通道的协作方协议及其内存实现，支持：
//! - 带期望版本检查的条件追加与按流读取（`EventStore`）；
//! - 快照读写与落盘策略（`SnapshotStore`/`SnapshotPolicy`）；
//! - 带外事件的即发即忘追加（`OutOfBandChannel`）；
//! - 水合、提交与冲突解决的聚合仓储（`Repository`）。
//!
//! 该模块聚焦协议与装配逻辑，具体存储后端由上层提供实现并注入。
//!
mod event_store;
mod out_of_band;
mod repository;
mod serialized_event;
mod serialized_snapshot;
mod snapshot_store;

pub use event_store::{EventStore, Expected, MemoryEventStore, stream_id};
pub use out_of_band::{MemoryOutOfBandChannel, OutOfBandChannel};
pub use repository::{
    AggregateConfig, CommitOutcome, ConflictResolution, ConflictResolver, Repository,
};
pub use serialized_event::{SerializedEvent, serialize_events};
pub use serialized_snapshot::SerializedSnapshot;
pub use snapshot_store::{MemorySnapshotStore, SnapshotPolicy, SnapshotStore};
