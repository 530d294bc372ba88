//! 稳定整数类型标识符与不透明的运行时类型句柄。
//!
//! Rust 没有反射式的类型层级可供逐值遍历，因此线上格式依赖的
//! "超类/接口"查找链改为在注册时显式捕获（见 [`crate::registry`]），
//! 而不是每次编码时重新发现一遍。

use std::any::{Any, TypeId as StdTypeId};
use std::fmt;

/// 保留 id 区间的下界；区间 `[RESERVED_LOW, RESERVED_HIGH]` 内的注册一律失败。
pub const RESERVED_LOW: u32 = 128;
/// 保留 id 区间的上界（含）。
pub const RESERVED_HIGH: u32 = 255;

/// 判断 `id` 是否落在保留区间 `[128, 255]` 内。
#[inline]
pub fn is_reserved(id: u32) -> bool {
    (RESERVED_LOW..=RESERVED_HIGH).contains(&id)
}

/// 一个已注册类型稳定的、可在线上寻址的整数标识符。
///
/// 负数 id 在注册时即被拒绝（见 Design Notes 的开放问题）；公开接口只处理
/// 非负值，这使得 8/16/24 位的窄化阈值始终精确。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u32);

impl TypeId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 具体运行时类型的不透明身份标识，可作为 map key 使用，并可通过
/// [`TypeHandle::of`] / [`TypeHandle::of_val`] 从一个值反推得到。
///
/// 句柄本身不携带可打印的名字——注册表才是 CLASS 标签命名的权威来源，
/// 在注册时一次性捕获。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeHandle(StdTypeId);

impl TypeHandle {
    /// 为静态已知类型 `T` 构造句柄。
    pub fn of<T: 'static>() -> Self {
        Self(StdTypeId::of::<T>())
    }

    /// 从一个 `dyn Any` 背后的具体运行时类型反推句柄。
    pub fn of_val(value: &dyn Any) -> Self {
        Self(value.type_id())
    }
}
