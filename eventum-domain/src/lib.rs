//! 事件溯源领域运行时基础库（eventum-domain）
//!
//! 提供以事件溯源为中心的通用抽象与构件，用于在应用中实现：
//! - 聚合状态（`aggregate`）与实体机（`entity`）建模
//! - 领域事件（`domain_event`）：载荷、信封、元数据与上下文头
//! - 基于事件溯源与快照的仓储（`persist`）：乐观并发与冲突解决
//! - 统一标识与版本号（`value_object`）
//!
//! 本 crate 尽量保持与存储与传输实现解耦，仅定义领域层接口、内存实现
//! 与最小必要的错误类型，以便在不同基础设施上进行适配实现。
//!
//! 典型用法：
//! 1. 定义聚合状态与事件，实现 `AggregateState` 的 `apply`；
//! 2. 以事件存储/快照存储/带外通道协作方构造 `Repository` 并附上
//!    该聚合类型的 `AggregateConfig`（冲突策略与快照策略）；
//! 3. 通过 `Repository::execute` 编排一条完整的命令到事件持久化的流程，
//!    领域方法内使用 `Entity::{apply, raise, rule}` 表达变更与不变量。
//!
pub mod aggregate;
pub mod domain_event;
pub mod entity;
pub mod error;
pub mod persist;
pub mod value_object;
