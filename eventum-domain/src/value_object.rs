//! 值对象（Value Object）
//!
//! 无标识、以值相等为准的对象：
//! - `Identifier`：聚合/流/Saga 的统一标识（数值、字符串或复合键）；
//! - `Version`：流版本号（用于乐观锁和并发控制）。
//!

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// 统一标识：数值键、字符串键或由子标识组成的复合键。
///
/// 两个标识相等当且仅当其规范化字符串形式相等，
/// 因此 `Identifier::from(42)` 与 `Identifier::from("42")` 被视为同一标识。
///
/// # 示例
///
/// ```
/// use eventum_domain::value_object::Identifier;
///
/// let a = Identifier::from(42);
/// let b = Identifier::from("42");
/// assert_eq!(a, b);
///
/// let c = Identifier::composite([Identifier::from("order"), Identifier::from(7)]);
/// assert_eq!(c.normalized(), "order/7");
/// ```
#[derive(Debug, Clone)]
pub enum Identifier {
    Number(i64),
    Text(String),
    Composite(Vec<Identifier>),
}

impl Identifier {
    /// 由子标识构造复合键，各段以 `/` 连接
    pub fn composite(parts: impl IntoIterator<Item = Identifier>) -> Self {
        Self::Composite(parts.into_iter().collect())
    }

    /// 规范化字符串形式（相等性与哈希均基于该形式）
    pub fn normalized(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::Composite(parts) => parts
                .iter()
                .map(Identifier::normalized)
                .collect::<Vec<_>>()
                .join("/"),
        }
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.normalized().cmp(&other.normalized())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normalized())
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl FromStr for Identifier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::Text(s.to_string()))
    }
}

// 序列化为规范化字符串；反序列化回 Text 变体。
// 往返可能改变变体，但不改变规范化形式，相等性因此保持。
impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized())
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::Text(s))
    }
}

/// 版本号（用于乐观锁和并发控制）
///
/// 提供类型安全的版本号操作，避免直接使用 u64 导致的语义不明确问题。
/// 版本 0（`is_new()`）即“流不存在”的哨兵值，首个已提交事件的版本为 1。
///
/// # 示例
///
/// ```
/// use eventum_domain::value_object::Version;
///
/// let v1 = Version::new();
/// assert_eq!(v1.value(), 0);
/// assert!(v1.is_new());
///
/// let v2 = v1.next();
/// assert_eq!(v2.value(), 1);
/// assert!(v2 > v1);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// 创建初始版本（版本号为 0，表示流尚不存在）
    pub const fn new() -> Self {
        Self(0)
    }

    /// 从值创建版本号
    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    /// 获取下一个版本号
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// 获取版本号的值
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// 检查是否为初始版本（流不存在）
    pub fn is_new(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self::from_value(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.value()
    }
}
